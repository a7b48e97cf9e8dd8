//! Off-chain accounting of the validator bonds settlements.
//!
//! Verifies settlement claims against the merkle root and deduplicates them with the claim
//! bitmap, classifies native stake accounts of the bonds and plans how they fund
//! settlements, get merged or get withdrawn. Planning functions are pure; applying a plan
//! (building and sending the transactions) is up to the caller.

pub mod addresses;
pub mod bitmap;
pub mod bond;
pub mod config;
pub mod constants;
pub mod error;
pub mod settlement;
pub mod signer;
pub mod stake;
pub mod withdraw;

#[cfg(test)]
mod testing;

pub use bitmap::{BitmapProjection, ClaimBitmap, HEADER_SIZE};
pub use bond::Bond;
pub use config::{load_config, EngineConfig};
pub use error::{CapacityKind, ErrorCode, Result};
pub use settlement::{
    plan_funding, ClaimAdmission, ClaimRequest, CreateSettlementArgs, FundingPlan, Settlement,
    SettlementClaims, SettlementCloseReport, SettlementStatus, SharedSettlementClaims,
};
pub use signer::AccountSigner;
pub use stake::{classify_stake_account, StakeAccountParsed, StakeLifecycleState};
pub use withdraw::{
    apply_withdraw_plan, plan_stake_merges, plan_withdraw_fulfillment, MergePlan,
    WithdrawContext, WithdrawPlan, WithdrawRequest, WithdrawStep,
};
