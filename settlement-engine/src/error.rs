use solana_sdk::pubkey::Pubkey;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ErrorCode>;

/// Which of the settlement limits a claim would break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    /// `lamports_claimed + claim > max_total_claim`
    ClaimAmount,
    /// `merkle_nodes_claimed + 1 > max_merkle_nodes`
    ClaimCount,
    /// `lamports_claimed + claim > lamports_funded`
    Funded,
}

impl fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityKind::ClaimAmount => write!(f, "max total claim"),
            CapacityKind::ClaimCount => write!(f, "max merkle nodes"),
            CapacityKind::Funded => write!(f, "lamports funded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorCode {
    #[error("Merkle proof verification failed for settlement claim")]
    VerificationFailure,

    #[error("Claim index {index} has been already claimed")]
    AlreadyClaimed { index: u64 },

    #[error("Bitmap index {index} out of range, max records {max_records}")]
    IndexOutOfRange { index: u64, max_records: u64 },

    #[error("Bitmap data of {actual} bytes is smaller than required {required} bytes")]
    BitmapSizeMismatch { required: usize, actual: usize },

    #[error("Settlement claims cannot hold {max_records} records, maximum is {limit}")]
    SettlementClaimsTooManyRecords { max_records: u64, limit: u64 },

    #[error("Settlement claims account data cannot be parsed: {0}")]
    InvalidSettlementClaimsData(String),

    #[error("Settlement claims belongs to settlement {actual}, expected {expected}")]
    SettlementMismatch { expected: Pubkey, actual: Pubkey },

    #[error("Settlement has expired at epoch {expired_after_epoch}, current epoch {current_epoch}")]
    SettlementExpired {
        expired_after_epoch: u64,
        current_epoch: u64,
    },

    #[error("Settlement is claimable from slot {claimable_from_slot}, current slot {current_slot}")]
    NotYetClaimable {
        claimable_from_slot: u64,
        current_slot: u64,
    },

    #[error("Settlement has not expired yet, claimable until epoch {claimable_until_epoch}, current epoch {current_epoch}")]
    SettlementNotExpired {
        claimable_until_epoch: u64,
        current_epoch: u64,
    },

    #[error("Settlement has been closed")]
    SettlementClosed,

    #[error("Claim would exceed settlement {kind}: requested {requested}, limit {limit}")]
    CapacityExceeded {
        kind: CapacityKind,
        requested: u64,
        limit: u64,
    },

    #[error("Stake account {stake_account} is not eligible: {reason}")]
    StakeNotEligible { stake_account: Pubkey, reason: String },

    #[error("Stake account {stake_account} with {balance} lamports is not big enough to split off {amount} lamports, minimal size {minimal_size}")]
    NotBigEnoughToSplit {
        stake_account: Pubkey,
        balance: u64,
        amount: u64,
        minimal_size: u64,
    },

    #[error("Stake accounts {source_stake} and {destination_stake} cannot be merged: {reason}")]
    MergeMismatch {
        destination_stake: Pubkey,
        source_stake: Pubkey,
        reason: String,
    },

    #[error("Withdraw request has been already fulfilled: withdrawn {withdrawn_amount} of requested {requested_amount}")]
    AlreadyFulfilled {
        requested_amount: u64,
        withdrawn_amount: u64,
    },

    #[error("Withdraw request lockup has not elapsed, withdrawable from epoch {withdrawable_from_epoch}, current epoch {current_epoch}")]
    NotYetElapsed {
        withdrawable_from_epoch: u64,
        current_epoch: u64,
    },

    #[error("Invalid withdraw request: {0}")]
    InvalidWithdrawRequest(String),

    #[error("Stake account data cannot be deserialized: {0}")]
    InvalidStakeAccountData(String),

    #[error("Authority {authority} is not permitted to change bond {bond}")]
    BondChangeNotPermitted { bond: Pubkey, authority: Pubkey },

    #[error("Cannot resolve address: {0}")]
    AddressResolution(String),

    #[error("Signer for {0} is not available, public key only")]
    SignerNotAvailable(Pubkey),

    #[error("Arithmetic overflow on {0}")]
    ArithmeticOverflow(&'static str),
}

impl ErrorCode {
    pub fn stake_not_eligible(stake_account: &Pubkey, reason: impl Into<String>) -> Self {
        ErrorCode::StakeNotEligible {
            stake_account: *stake_account,
            reason: reason.into(),
        }
    }

    pub fn merge_mismatch(
        destination_stake: &Pubkey,
        source_stake: &Pubkey,
        reason: impl Into<String>,
    ) -> Self {
        ErrorCode::MergeMismatch {
            destination_stake: *destination_stake,
            source_stake: *source_stake,
            reason: reason.into(),
        }
    }
}
