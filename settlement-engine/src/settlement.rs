use crate::addresses::{find_settlement_address, find_settlement_staker_authority};
use crate::bitmap::{check_max_records, ClaimBitmap};
use crate::bond::Bond;
use crate::config::EngineConfig;
use crate::error::{CapacityKind, ErrorCode, Result};
use crate::stake::{
    check_splittable, check_usable_for_bond_funding, minimal_size_stake_account,
    StakeAccountParsed,
};
use log::{debug, info};
use merkle_tree::serde_serialize::{
    bytes32_hex_conversion, option_pubkey_string_conversion, pubkey_string_conversion,
};
use merkle_tree::{hash_indexed_leaf, verify_proof, TreeNode};
use serde::{Deserialize, Serialize};
use solana_sdk::clock::Clock;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use std::sync::{Arc, Mutex, MutexGuard};

/// Batch payout of a bond, backed by a merkle root and a claim capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    #[serde(with = "pubkey_string_conversion")]
    pub bond: Pubkey,
    /// settlement authority used as the 'staker' stake account authority
    /// of stake accounts funded to the settlement
    #[serde(with = "pubkey_string_conversion")]
    pub staker_authority: Pubkey,
    #[serde(with = "bytes32_hex_conversion")]
    pub merkle_root: [u8; 32],
    /// maximum number of lamports that can be claimed from the settlement
    pub max_total_claim: u64,
    /// maximum number of merkle tree nodes that can be claimed
    pub max_merkle_nodes: u64,
    /// total lamports funded to the settlement
    pub lamports_funded: u64,
    /// total lamports claimed from the settlement
    pub lamports_claimed: u64,
    /// number of nodes claimed
    pub merkle_nodes_claimed: u64,
    /// the settlement was created for this epoch
    pub epoch_created_for: u64,
    /// the settlement was created at this slot
    pub slot_created_at: u64,
    pub epochs_to_claim_settlement: u64,
    pub slots_to_start_claiming: u64,
    /// address that collects the rent exempt of the settlement accounts on close
    #[serde(with = "pubkey_string_conversion")]
    pub rent_collector: Pubkey,
    /// address that collects the rent of the split stake account created on funding
    #[serde(default, with = "option_pubkey_string_conversion")]
    pub split_rent_collector: Option<Pubkey>,
    pub split_rent_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSettlementArgs {
    #[serde(with = "pubkey_string_conversion")]
    pub bond: Pubkey,
    #[serde(with = "bytes32_hex_conversion")]
    pub merkle_root: [u8; 32],
    pub max_total_claim: u64,
    pub max_merkle_nodes: u64,
    pub epoch: u64,
    pub slot: u64,
    #[serde(with = "pubkey_string_conversion")]
    pub rent_collector: Pubkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementStatus {
    NotYetClaimable,
    Open,
    Expired,
    Closed,
}

impl Settlement {
    /// Fails when the claims bitmap for `max_merkle_nodes` cannot be held by an account.
    pub fn new(args: CreateSettlementArgs, config: &EngineConfig) -> Result<Self> {
        check_max_records(args.max_merkle_nodes)?;
        let (address, _) =
            find_settlement_address(config, &args.bond, &args.merkle_root, args.epoch);
        let (staker_authority, _) = find_settlement_staker_authority(config, &address);
        debug!(
            "New settlement {} for bond {}, epoch {}, merkle root {}, max total claim {}, max merkle nodes {}",
            address,
            args.bond,
            args.epoch,
            hex::encode(args.merkle_root),
            args.max_total_claim,
            args.max_merkle_nodes
        );
        Ok(Self {
            bond: args.bond,
            staker_authority,
            merkle_root: args.merkle_root,
            max_total_claim: args.max_total_claim,
            max_merkle_nodes: args.max_merkle_nodes,
            lamports_funded: 0,
            lamports_claimed: 0,
            merkle_nodes_claimed: 0,
            epoch_created_for: args.epoch,
            slot_created_at: args.slot,
            epochs_to_claim_settlement: config.epochs_to_claim_settlement,
            slots_to_start_claiming: config.slots_to_start_settlement_claiming,
            rent_collector: args.rent_collector,
            split_rent_collector: None,
            split_rent_amount: 0,
        })
    }

    pub fn address(&self, config: &EngineConfig) -> Pubkey {
        find_settlement_address(
            config,
            &self.bond,
            &self.merkle_root,
            self.epoch_created_for,
        )
        .0
    }

    pub fn merkle_root_hash(&self) -> Hash {
        Hash::new_from_array(self.merkle_root)
    }

    /// The last epoch a claim is permitted in.
    pub fn claimable_until_epoch(&self) -> u64 {
        self.epoch_created_for
            .saturating_add(self.epochs_to_claim_settlement)
    }

    pub fn claimable_from_slot(&self) -> u64 {
        self.slot_created_at
            .saturating_add(self.slots_to_start_claiming)
    }

    /// Claim window of the settlement, closing is tracked by [SettlementClaims].
    pub fn status(&self, clock: &Clock) -> SettlementStatus {
        if clock.epoch > self.claimable_until_epoch() {
            SettlementStatus::Expired
        } else if clock.slot < self.claimable_from_slot() {
            SettlementStatus::NotYetClaimable
        } else {
            SettlementStatus::Open
        }
    }

    pub fn check_claimable(&self, clock: &Clock) -> Result<()> {
        match self.status(clock) {
            SettlementStatus::Expired => Err(ErrorCode::SettlementExpired {
                expired_after_epoch: self.claimable_until_epoch(),
                current_epoch: clock.epoch,
            }),
            SettlementStatus::NotYetClaimable => Err(ErrorCode::NotYetClaimable {
                claimable_from_slot: self.claimable_from_slot(),
                current_slot: clock.slot,
            }),
            SettlementStatus::Closed => Err(ErrorCode::SettlementClosed),
            SettlementStatus::Open => Ok(()),
        }
    }

    pub fn is_fully_funded(&self) -> bool {
        self.lamports_funded >= self.max_total_claim
    }

    /// Lamports that are funded and not claimed yet.
    pub fn unclaimed_lamports(&self) -> u64 {
        self.lamports_funded.saturating_sub(self.lamports_claimed)
    }

    /// Applies the funding plan made by [plan_funding].
    pub fn record_funding(&mut self, plan: &FundingPlan) -> Result<()> {
        let lamports_to_fund = plan.lamports_to_fund();
        self.lamports_funded = self
            .lamports_funded
            .checked_add(lamports_to_fund)
            .ok_or(ErrorCode::ArithmeticOverflow("lamports_funded"))?;
        if let FundingPlan::Split {
            split_rent_collector,
            split_rent_amount,
            ..
        } = plan
        {
            self.split_rent_collector = Some(*split_rent_collector);
            self.split_rent_amount = *split_rent_amount;
        }
        debug!(
            "Settlement of bond {} funded with {} lamports, funded {}/{}",
            self.bond, lamports_to_fund, self.lamports_funded, self.max_total_claim
        );
        Ok(())
    }
}

/// How a stake account is used to fund a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingPlan {
    /// nothing to fund, the stake account stays untouched
    AlreadyFunded,
    /// whole stake account is assigned to the settlement staker authority
    WholeAccount {
        #[serde(with = "pubkey_string_conversion")]
        stake_account: Pubkey,
        #[serde(with = "pubkey_string_conversion")]
        staker_authority: Pubkey,
        lamports_to_fund: u64,
    },
    /// `split_lamports` are split off and stay in the bond,
    /// the rest of the stake account is assigned to the settlement staker authority
    Split {
        #[serde(with = "pubkey_string_conversion")]
        stake_account: Pubkey,
        #[serde(with = "pubkey_string_conversion")]
        staker_authority: Pubkey,
        lamports_to_fund: u64,
        split_lamports: u64,
        #[serde(with = "pubkey_string_conversion")]
        split_rent_collector: Pubkey,
        split_rent_amount: u64,
    },
}

impl FundingPlan {
    pub fn lamports_to_fund(&self) -> u64 {
        match self {
            FundingPlan::AlreadyFunded => 0,
            FundingPlan::WholeAccount {
                lamports_to_fund, ..
            }
            | FundingPlan::Split {
                lamports_to_fund, ..
            } => *lamports_to_fund,
        }
    }
}

/// Computes how the stake account funds the remaining settlement capacity.
///
/// The whole stake account is funded when the excess over the needed amount cannot exist
/// as a standalone stake account, the settlement may then get over-funded.
/// The funded stake account keeps its minimal size, only lamports above it count as funded.
pub fn plan_funding(
    settlement: &Settlement,
    stake_account: &StakeAccountParsed,
    bond: &Bond,
    bonds_authority: &Pubkey,
    split_rent_collector: &Pubkey,
    config: &EngineConfig,
) -> Result<FundingPlan> {
    if settlement.is_fully_funded() {
        info!(
            "Settlement of bond {} is already fully funded ({}/{})",
            settlement.bond, settlement.lamports_funded, settlement.max_total_claim
        );
        return Ok(FundingPlan::AlreadyFunded);
    }
    let min_stake = config.minimum_stake_lamports();
    check_usable_for_bond_funding(
        stake_account,
        &bond.vote_account,
        bonds_authority,
        min_stake,
    )?;

    let stake_account_min_size =
        minimal_size_stake_account(stake_account.rent_exempt_reserve, min_stake);
    let amount_available = stake_account.balance_lamports;
    let remaining_to_fund = settlement
        .max_total_claim
        .saturating_sub(settlement.lamports_funded);
    // amount needed: "amount + minimal stake account size" -> ensuring stake account may exist
    let amount_needed = remaining_to_fund
        .checked_add(stake_account_min_size)
        .ok_or(ErrorCode::ArithmeticOverflow("amount_needed"))?;
    let left_over_splittable = amount_available > amount_needed
        && check_splittable(
            stake_account,
            amount_available - amount_needed,
            min_stake,
        )
        .is_ok();

    let plan = if left_over_splittable {
        FundingPlan::Split {
            stake_account: stake_account.address,
            staker_authority: settlement.staker_authority,
            lamports_to_fund: remaining_to_fund,
            split_lamports: amount_available - amount_needed,
            split_rent_collector: *split_rent_collector,
            split_rent_amount: stake_account.rent_exempt_reserve,
        }
    } else {
        FundingPlan::WholeAccount {
            stake_account: stake_account.address,
            staker_authority: settlement.staker_authority,
            lamports_to_fund: amount_available - stake_account_min_size,
        }
    };
    debug!(
        "Funding plan for stake account {} (available {}, needed {}): {:?}",
        stake_account.address, amount_available, amount_needed, plan
    );
    Ok(plan)
}

/// One claim of the settlement merkle tree. The leaf hash commits to `index`,
/// the proof verifies only for the bitmap index the claim was placed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub index: u64,
    #[serde(with = "pubkey_string_conversion")]
    pub stake_authority: Pubkey,
    #[serde(with = "pubkey_string_conversion")]
    pub withdraw_authority: Pubkey,
    pub claim: u64,
    pub proof: Vec<[u8; 32]>,
}

impl ClaimRequest {
    pub fn from_tree_node(tree_node: &TreeNode) -> Self {
        Self {
            index: tree_node.index,
            stake_authority: tree_node.stake_authority,
            withdraw_authority: tree_node.withdraw_authority,
            claim: tree_node.claim,
            proof: tree_node.proof.clone().unwrap_or_default(),
        }
    }

    pub fn leaf_hash(&self) -> Hash {
        hash_indexed_leaf(
            &self.stake_authority,
            &self.withdraw_authority,
            self.claim,
            self.index,
        )
    }
}

/// Admitted claim with the settlement counters after the claim is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAdmission {
    #[serde(with = "pubkey_string_conversion")]
    pub settlement: Pubkey,
    pub index: u64,
    #[serde(with = "pubkey_string_conversion")]
    pub stake_authority: Pubkey,
    #[serde(with = "pubkey_string_conversion")]
    pub withdraw_authority: Pubkey,
    pub amount: u64,
    pub lamports_claimed: u64,
    pub merkle_nodes_claimed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementCloseReport {
    #[serde(with = "pubkey_string_conversion")]
    pub settlement: Pubkey,
    pub lamports_funded: u64,
    pub lamports_claimed: u64,
    pub merkle_nodes_claimed: u64,
    /// funded and not claimed lamports, returned to the bond
    pub lamports_unclaimed: u64,
    #[serde(with = "pubkey_string_conversion")]
    pub rent_collector: Pubkey,
    #[serde(default, with = "option_pubkey_string_conversion")]
    pub split_rent_collector: Option<Pubkey>,
    pub split_rent_amount: u64,
}

/// Settlement counters with its deduplication bitmap, the only mutable claim state.
/// The bitmap is dropped when the settlement is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementClaims {
    address: Pubkey,
    settlement: Settlement,
    bitmap: Option<ClaimBitmap>,
}

impl SettlementClaims {
    pub fn new(settlement: Settlement, config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            address: settlement.address(config),
            bitmap: Some(ClaimBitmap::new(settlement.max_merkle_nodes)?),
            settlement,
        })
    }

    /// Loads the bitmap from the settlement claims account data.
    pub fn from_account_data(
        settlement: Settlement,
        config: &EngineConfig,
        data: &[u8],
    ) -> Result<Self> {
        let address = settlement.address(config);
        let (header, bitmap) = ClaimBitmap::from_account_data(data)?;
        if header.settlement != address {
            return Err(ErrorCode::SettlementMismatch {
                expected: address,
                actual: header.settlement,
            });
        }
        if header.max_records != settlement.max_merkle_nodes {
            return Err(ErrorCode::InvalidSettlementClaimsData(format!(
                "max records {} does not match settlement max merkle nodes {}",
                header.max_records, settlement.max_merkle_nodes
            )));
        }
        Ok(Self {
            address,
            settlement,
            bitmap: Some(bitmap),
        })
    }

    pub fn to_account_data(&self) -> Result<Vec<u8>> {
        self.bitmap()?.to_account_data(&self.address)
    }

    pub fn address(&self) -> &Pubkey {
        &self.address
    }

    pub fn settlement(&self) -> &Settlement {
        &self.settlement
    }

    /// Funding happens next to claiming, claims are limited by the funded lamports.
    pub fn record_funding(&mut self, plan: &FundingPlan) -> Result<()> {
        self.bitmap()?;
        self.settlement.record_funding(plan)
    }

    pub fn is_closed(&self) -> bool {
        self.bitmap.is_none()
    }

    pub fn status(&self, clock: &Clock) -> SettlementStatus {
        if self.is_closed() {
            SettlementStatus::Closed
        } else {
            self.settlement.status(clock)
        }
    }

    pub fn is_claimed(&self, index: u64) -> Result<bool> {
        self.bitmap()?.get(index)
    }

    fn bitmap(&self) -> Result<&ClaimBitmap> {
        self.bitmap.as_ref().ok_or(ErrorCode::SettlementClosed)
    }

    /// Verifies the claim against the settlement without changing anything.
    ///
    /// Checks in order: claim window, merkle proof, deduplication bitmap,
    /// max total claim, max merkle nodes and funded lamports.
    pub fn plan_claim_admission(
        &self,
        claim: &ClaimRequest,
        clock: &Clock,
    ) -> Result<ClaimAdmission> {
        let bitmap = self.bitmap()?;
        let settlement = &self.settlement;
        settlement.check_claimable(clock)?;

        if !verify_proof(
            &claim.leaf_hash(),
            &claim.proof,
            &settlement.merkle_root_hash(),
        ) {
            debug!(
                "Settlement {} claim index {} of {} lamports failed proof verification",
                self.address, claim.index, claim.claim
            );
            return Err(ErrorCode::VerificationFailure);
        }

        if bitmap.get(claim.index)? {
            return Err(ErrorCode::AlreadyClaimed { index: claim.index });
        }

        let lamports_claimed = settlement
            .lamports_claimed
            .checked_add(claim.claim)
            .ok_or(ErrorCode::ArithmeticOverflow("lamports_claimed"))?;
        if lamports_claimed > settlement.max_total_claim {
            return Err(ErrorCode::CapacityExceeded {
                kind: CapacityKind::ClaimAmount,
                requested: lamports_claimed,
                limit: settlement.max_total_claim,
            });
        }
        let merkle_nodes_claimed = settlement
            .merkle_nodes_claimed
            .checked_add(1)
            .ok_or(ErrorCode::ArithmeticOverflow("merkle_nodes_claimed"))?;
        if merkle_nodes_claimed > settlement.max_merkle_nodes {
            return Err(ErrorCode::CapacityExceeded {
                kind: CapacityKind::ClaimCount,
                requested: merkle_nodes_claimed,
                limit: settlement.max_merkle_nodes,
            });
        }
        if lamports_claimed > settlement.lamports_funded {
            return Err(ErrorCode::CapacityExceeded {
                kind: CapacityKind::Funded,
                requested: lamports_claimed,
                limit: settlement.lamports_funded,
            });
        }

        Ok(ClaimAdmission {
            settlement: self.address,
            index: claim.index,
            stake_authority: claim.stake_authority,
            withdraw_authority: claim.withdraw_authority,
            amount: claim.claim,
            lamports_claimed,
            merkle_nodes_claimed,
        })
    }

    /// Admits the claim, the bitmap bit and the counters change together or not at all.
    pub fn admit_claim(&mut self, claim: &ClaimRequest, clock: &Clock) -> Result<ClaimAdmission> {
        let admission = self.plan_claim_admission(claim, clock)?;
        let bitmap = self.bitmap.as_mut().ok_or(ErrorCode::SettlementClosed)?;
        bitmap.try_set(admission.index)?;
        self.settlement.lamports_claimed = admission.lamports_claimed;
        self.settlement.merkle_nodes_claimed = admission.merkle_nodes_claimed;
        info!(
            "Settlement {} claimed index {}: {} lamports to withdrawer {}, claimed {}/{} lamports, {}/{} merkle nodes",
            self.address,
            admission.index,
            admission.amount,
            admission.withdraw_authority,
            admission.lamports_claimed,
            self.settlement.max_total_claim,
            admission.merkle_nodes_claimed,
            self.settlement.max_merkle_nodes
        );
        Ok(admission)
    }

    /// Closes the expired settlement, claims are rejected afterwards.
    pub fn close(&mut self, clock: &Clock) -> Result<SettlementCloseReport> {
        self.bitmap()?;
        if self.settlement.status(clock) != SettlementStatus::Expired {
            return Err(ErrorCode::SettlementNotExpired {
                claimable_until_epoch: self.settlement.claimable_until_epoch(),
                current_epoch: clock.epoch,
            });
        }
        self.bitmap = None;
        let settlement = &self.settlement;
        let report = SettlementCloseReport {
            settlement: self.address,
            lamports_funded: settlement.lamports_funded,
            lamports_claimed: settlement.lamports_claimed,
            merkle_nodes_claimed: settlement.merkle_nodes_claimed,
            lamports_unclaimed: settlement.unclaimed_lamports(),
            rent_collector: settlement.rent_collector,
            split_rent_collector: settlement.split_rent_collector,
            split_rent_amount: settlement.split_rent_amount,
        };
        info!(
            "Settlement {} closed at epoch {}, unclaimed lamports {}",
            self.address, clock.epoch, report.lamports_unclaimed
        );
        Ok(report)
    }
}

/// Handle to one settlement claims state shared between threads,
/// admissions of the settlement are serialized by the lock.
#[derive(Debug, Clone)]
pub struct SharedSettlementClaims(Arc<Mutex<SettlementClaims>>);

impl SharedSettlementClaims {
    pub fn new(settlement_claims: SettlementClaims) -> Self {
        Self(Arc::new(Mutex::new(settlement_claims)))
    }

    fn lock(&self) -> MutexGuard<'_, SettlementClaims> {
        // state is only changed after all checks pass, a poisoned lock holds consistent data
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn plan_claim_admission(
        &self,
        claim: &ClaimRequest,
        clock: &Clock,
    ) -> Result<ClaimAdmission> {
        self.lock().plan_claim_admission(claim, clock)
    }

    pub fn admit_claim(&self, claim: &ClaimRequest, clock: &Clock) -> Result<ClaimAdmission> {
        self.lock().admit_claim(claim, clock)
    }

    pub fn record_funding(&self, plan: &FundingPlan) -> Result<()> {
        self.lock().record_funding(plan)
    }

    pub fn close(&self, clock: &Clock) -> Result<SettlementCloseReport> {
        self.lock().close(clock)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SettlementClaims {
        self.lock().clone()
    }
}
