use crate::addresses::find_withdraw_request_address;
use crate::bond::Bond;
use crate::config::EngineConfig;
use crate::error::{ErrorCode, Result};
use crate::stake::{
    check_mergeable_into, check_owned_by_bond, check_splittable, is_transient,
    StakeAccountParsed, StakeLifecycleState,
};
use log::{debug, info, warn};
use merkle_tree::serde_serialize::pubkey_string_conversion;
use serde::{Deserialize, Serialize};
use solana_sdk::clock::Clock;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;

/// Time-locked ticket of the bond owner to get back part of the bond collateral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    #[serde(with = "pubkey_string_conversion")]
    pub vote_account: Pubkey,
    #[serde(with = "pubkey_string_conversion")]
    pub bond: Pubkey,
    /// epoch the request was created at
    pub epoch: u64,
    /// slot the request was created at, tells apart requests recreated for the same bond
    pub created_at_slot: u64,
    pub requested_amount: u64,
    /// only ever increases, never over the requested amount
    pub withdrawn_amount: u64,
    pub bump: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequestCancelReport {
    #[serde(with = "pubkey_string_conversion")]
    pub withdraw_request: Pubkey,
    pub requested_amount: u64,
    pub withdrawn_amount: u64,
    /// amount that stays in the bond
    pub cancelled_amount: u64,
}

impl WithdrawRequest {
    /// Creates the withdraw request when the `authority` may manage the bond.
    pub fn new(
        bond: &Bond,
        config: &EngineConfig,
        authority: &Pubkey,
        vote_account_withdrawer: Option<&Pubkey>,
        requested_amount: u64,
        clock: &Clock,
    ) -> Result<Self> {
        bond.check_change_permitted(config, authority, vote_account_withdrawer)?;
        if requested_amount == 0 {
            return Err(ErrorCode::InvalidWithdrawRequest(
                "requested amount has to be positive".to_string(),
            ));
        }
        let bond_address = bond.address(config);
        let (address, bump) = find_withdraw_request_address(config, &bond_address);
        info!(
            "Withdraw request {} of bond {} for {} lamports created at epoch {}",
            address, bond_address, requested_amount, clock.epoch
        );
        Ok(Self {
            vote_account: bond.vote_account,
            bond: bond_address,
            epoch: clock.epoch,
            created_at_slot: clock.slot,
            requested_amount,
            withdrawn_amount: 0,
            bump,
        })
    }

    pub fn address(&self, config: &EngineConfig) -> Pubkey {
        find_withdraw_request_address(config, &self.bond).0
    }

    pub fn remaining_amount(&self) -> u64 {
        self.requested_amount.saturating_sub(self.withdrawn_amount)
    }

    pub fn is_fulfilled(&self) -> bool {
        self.remaining_amount() == 0
    }

    pub fn withdrawable_from_epoch(&self, config: &EngineConfig) -> u64 {
        self.epoch.saturating_add(config.withdraw_lockup_epochs)
    }

    /// The plan was made for this request, not for a cancelled one of the same bond.
    pub fn is_planned_by(&self, plan: &WithdrawPlan) -> bool {
        plan.bond == self.bond
            && plan.request_epoch == self.epoch
            && plan.request_created_at_slot == self.created_at_slot
            && plan.requested_amount == self.requested_amount
    }

    pub fn check_lockup_elapsed(&self, config: &EngineConfig, clock: &Clock) -> Result<()> {
        let withdrawable_from_epoch = self.withdrawable_from_epoch(config);
        if clock.epoch < withdrawable_from_epoch {
            return Err(ErrorCode::NotYetElapsed {
                withdrawable_from_epoch,
                current_epoch: clock.epoch,
            });
        }
        Ok(())
    }

    /// Cancels the request, the not withdrawn amount stays in the bond.
    pub fn cancel(
        self,
        bond: &Bond,
        config: &EngineConfig,
        authority: &Pubkey,
        vote_account_withdrawer: Option<&Pubkey>,
    ) -> Result<WithdrawRequestCancelReport> {
        bond.check_change_permitted(config, authority, vote_account_withdrawer)?;
        if bond.address(config) != self.bond {
            return Err(ErrorCode::InvalidWithdrawRequest(format!(
                "withdraw request belongs to bond {}",
                self.bond
            )));
        }
        let report = WithdrawRequestCancelReport {
            withdraw_request: self.address(config),
            requested_amount: self.requested_amount,
            withdrawn_amount: self.withdrawn_amount,
            cancelled_amount: self.remaining_amount(),
        };
        info!(
            "Withdraw request {} cancelled, withdrawn {} of requested {} lamports",
            report.withdraw_request, report.withdrawn_amount, report.requested_amount
        );
        Ok(report)
    }
}

/// Inputs of the withdraw planning besides the request and the stake accounts.
#[derive(Debug, Clone)]
pub struct WithdrawContext<'a> {
    pub config: &'a EngineConfig,
    pub clock: &'a Clock,
    /// current staker and withdrawer authority of the bond stake accounts
    pub bonds_authority: Pubkey,
    /// new staker authority of the withdrawn stake accounts
    pub new_staker: Pubkey,
    /// new withdrawer authority of the withdrawn stake accounts
    pub new_withdrawer: Pubkey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawStep {
    /// whole stake account is reassigned
    Whole {
        #[serde(with = "pubkey_string_conversion")]
        stake_account: Pubkey,
        lamports: u64,
    },
    /// `split_lamports` are split into a new stake account that is reassigned,
    /// the rest stays in the bond
    Split {
        #[serde(with = "pubkey_string_conversion")]
        stake_account: Pubkey,
        split_lamports: u64,
        remaining_lamports: u64,
    },
}

impl WithdrawStep {
    pub fn stake_account(&self) -> &Pubkey {
        match self {
            WithdrawStep::Whole { stake_account, .. }
            | WithdrawStep::Split { stake_account, .. } => stake_account,
        }
    }

    /// Lamports moved out of the bond.
    pub fn lamports(&self) -> u64 {
        match self {
            WithdrawStep::Whole { lamports, .. } => *lamports,
            WithdrawStep::Split { split_lamports, .. } => *split_lamports,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawPlan {
    #[serde(with = "pubkey_string_conversion")]
    pub withdraw_request: Pubkey,
    #[serde(with = "pubkey_string_conversion")]
    pub bond: Pubkey,
    /// creation epoch, creation slot and requested amount of the request the plan was made for
    pub request_epoch: u64,
    pub request_created_at_slot: u64,
    pub requested_amount: u64,
    /// withdrawn amount of the request the plan was made for
    pub withdrawn_amount_before: u64,
    pub steps: Vec<WithdrawStep>,
    pub total_amount: u64,
    #[serde(with = "pubkey_string_conversion")]
    pub new_staker: Pubkey,
    #[serde(with = "pubkey_string_conversion")]
    pub new_withdrawer: Pubkey,
}

impl WithdrawPlan {
    pub fn withdrawn_amount_after(&self) -> u64 {
        self.withdrawn_amount_before.saturating_add(self.total_amount)
    }
}

/// Selects the bond stake accounts to satisfy the remaining amount of the withdraw request.
///
/// Stake accounts are taken whole in ascending order of their balance while they fit
/// into the remaining amount. The rest is split off the smallest stake account that can
/// be split. When the stake accounts are exhausted the plan fulfills the request partially.
pub fn plan_withdraw_fulfillment(
    request: &WithdrawRequest,
    stake_accounts: &[StakeAccountParsed],
    context: &WithdrawContext,
) -> Result<WithdrawPlan> {
    request.check_lockup_elapsed(context.config, context.clock)?;
    let remaining = request.remaining_amount();
    if remaining == 0 {
        return Err(ErrorCode::AlreadyFulfilled {
            requested_amount: request.requested_amount,
            withdrawn_amount: request.withdrawn_amount,
        });
    }

    let mut eligible = Vec::with_capacity(stake_accounts.len());
    let mut first_rejection = None;
    for stake_account in stake_accounts {
        match check_owned_by_bond(
            stake_account,
            &request.vote_account,
            &context.bonds_authority,
        ) {
            Ok(()) => eligible.push(stake_account),
            Err(err) => {
                debug!("Skipping stake account for withdraw: {}", err);
                first_rejection.get_or_insert(err);
            }
        }
    }
    if eligible.is_empty() {
        return Err(first_rejection.unwrap_or_else(|| {
            ErrorCode::InvalidWithdrawRequest(format!(
                "no stake accounts of bond {} to withdraw from",
                request.bond
            ))
        }));
    }
    eligible.sort_by_key(|stake_account| (stake_account.balance_lamports, stake_account.address));

    let min_stake = context.config.minimum_stake_lamports();
    let mut steps = vec![];
    let mut total_amount = 0_u64;
    let mut split_candidates = vec![];
    for stake_account in eligible {
        let still_needed = remaining - total_amount;
        if still_needed == 0 {
            break;
        }
        if stake_account.balance_lamports <= still_needed {
            total_amount += stake_account.balance_lamports;
            steps.push(WithdrawStep::Whole {
                stake_account: stake_account.address,
                lamports: stake_account.balance_lamports,
            });
        } else {
            split_candidates.push(stake_account);
        }
    }

    let still_needed = remaining - total_amount;
    if still_needed > 0 && !split_candidates.is_empty() {
        let mut split_error = None;
        let splittable = split_candidates.into_iter().find(|stake_account| {
            match check_splittable(stake_account, still_needed, min_stake) {
                Ok(()) => true,
                Err(err) => {
                    split_error.get_or_insert(err);
                    false
                }
            }
        });
        match (splittable, split_error) {
            (Some(stake_account), _) => {
                total_amount += still_needed;
                steps.push(WithdrawStep::Split {
                    stake_account: stake_account.address,
                    split_lamports: still_needed,
                    remaining_lamports: stake_account.balance_lamports - still_needed,
                });
            }
            (None, Some(err)) => return Err(err),
            (None, None) => {}
        }
    }

    let plan = WithdrawPlan {
        withdraw_request: request.address(context.config),
        bond: request.bond,
        request_epoch: request.epoch,
        request_created_at_slot: request.created_at_slot,
        requested_amount: request.requested_amount,
        withdrawn_amount_before: request.withdrawn_amount,
        steps,
        total_amount,
        new_staker: context.new_staker,
        new_withdrawer: context.new_withdrawer,
    };
    if plan.total_amount < remaining {
        warn!(
            "Withdraw request {} fulfilled partially: {} of remaining {} lamports, stake accounts exhausted",
            plan.withdraw_request, plan.total_amount, remaining
        );
    } else {
        debug!(
            "Withdraw request {} plan: {} lamports in {} steps",
            plan.withdraw_request,
            plan.total_amount,
            plan.steps.len()
        );
    }
    Ok(plan)
}

/// Records the lamports moved by the applied plan, returns the new withdrawn amount.
/// A plan is applicable only to the request and the state it was made for, a replay is rejected.
pub fn apply_withdraw_plan(request: &mut WithdrawRequest, plan: &WithdrawPlan) -> Result<u64> {
    if plan.bond != request.bond {
        return Err(ErrorCode::InvalidWithdrawRequest(format!(
            "plan for bond {} applied to withdraw request of bond {}",
            plan.bond, request.bond
        )));
    }
    if !request.is_planned_by(plan) {
        warn!(
            "Withdraw plan of request created at epoch {} slot {} for {} lamports replayed on request created at epoch {} slot {} for {} lamports",
            plan.request_epoch,
            plan.request_created_at_slot,
            plan.requested_amount,
            request.epoch,
            request.created_at_slot,
            request.requested_amount
        );
        return Err(ErrorCode::AlreadyFulfilled {
            requested_amount: request.requested_amount,
            withdrawn_amount: request.withdrawn_amount,
        });
    }
    if request.is_fulfilled() || plan.withdrawn_amount_before != request.withdrawn_amount {
        return Err(ErrorCode::AlreadyFulfilled {
            requested_amount: request.requested_amount,
            withdrawn_amount: request.withdrawn_amount,
        });
    }
    let withdrawn_amount = request
        .withdrawn_amount
        .checked_add(plan.total_amount)
        .ok_or(ErrorCode::ArithmeticOverflow("withdrawn_amount"))?;
    if withdrawn_amount > request.requested_amount {
        return Err(ErrorCode::InvalidWithdrawRequest(format!(
            "plan of {} lamports exceeds the remaining amount {}",
            plan.total_amount,
            request.remaining_amount()
        )));
    }
    request.withdrawn_amount = withdrawn_amount;
    info!(
        "Withdraw request {} withdrawn {}/{} lamports",
        plan.withdraw_request, request.withdrawn_amount, request.requested_amount
    );
    Ok(withdrawn_amount)
}

/// Stake accounts to be merged into the destination stake account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePlan {
    #[serde(with = "pubkey_string_conversion")]
    pub destination_stake: Pubkey,
    pub source_stakes: Vec<Pubkey>,
}

/// Consolidates the bond stake accounts, every group of the same vote account and state
/// is merged into its largest stake account. Transient stake accounts are left as they are.
pub fn plan_stake_merges(
    stake_accounts: &[StakeAccountParsed],
    bonds_authority: &Pubkey,
) -> Vec<MergePlan> {
    let mut groups: HashMap<(Pubkey, StakeLifecycleState), Vec<&StakeAccountParsed>> =
        HashMap::new();
    for stake_account in stake_accounts {
        let voter = match stake_account.voter {
            Some(voter) => voter,
            None => continue,
        };
        if !stake_account.is_owned_by(bonds_authority)
            || stake_account.is_locked_up
            || is_transient(stake_account)
            || !matches!(
                stake_account.state,
                StakeLifecycleState::Active | StakeLifecycleState::Deactivated
            )
        {
            debug!(
                "Stake account {} ({:?}) is not a merge candidate",
                stake_account.address, stake_account.state
            );
            continue;
        }
        groups
            .entry((voter, stake_account.state))
            .or_default()
            .push(stake_account);
    }

    let mut merge_plans = groups
        .into_values()
        .filter_map(|mut group| {
            group.sort_by_key(|stake_account| {
                (std::cmp::Reverse(stake_account.balance_lamports), stake_account.address)
            });
            let (destination, sources) = group.split_first()?;
            let source_stakes = sources
                .iter()
                .filter(|source| match check_mergeable_into(destination, source) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(
                            "Cannot merge stake accounts {} and {}: {}",
                            source.address, destination.address, err
                        );
                        false
                    }
                })
                .map(|source| source.address)
                .collect::<Vec<_>>();
            if source_stakes.is_empty() {
                None
            } else {
                Some(MergePlan {
                    destination_stake: destination.address,
                    source_stakes,
                })
            }
        })
        .collect::<Vec<_>>();
    merge_plans.sort_by_key(|plan| plan.destination_stake);
    merge_plans
}
