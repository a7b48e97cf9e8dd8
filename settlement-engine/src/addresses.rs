use crate::config::EngineConfig;
use crate::constants::{
    BONDS_WITHDRAWER_AUTHORITY_SEED, BOND_SEED, SETTLEMENT_CLAIMS_SEED, SETTLEMENT_SEED,
    SETTLEMENT_STAKER_AUTHORITY_SEED, WITHDRAW_REQUEST_SEED,
};
use crate::error::{ErrorCode, Result};
use log::debug;
use solana_sdk::pubkey::Pubkey;

pub fn find_bond_address(config: &EngineConfig, vote_account: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            BOND_SEED,
            config.config_address.as_ref(),
            vote_account.as_ref(),
        ],
        &config.program_id,
    )
}

pub fn find_settlement_address(
    config: &EngineConfig,
    bond: &Pubkey,
    merkle_root: &[u8; 32],
    epoch: u64,
) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            SETTLEMENT_SEED,
            bond.as_ref(),
            merkle_root.as_ref(),
            epoch.to_le_bytes().as_ref(),
        ],
        &config.program_id,
    )
}

pub fn find_settlement_claims_address(config: &EngineConfig, settlement: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[SETTLEMENT_CLAIMS_SEED, settlement.as_ref()],
        &config.program_id,
    )
}

pub fn find_withdraw_request_address(config: &EngineConfig, bond: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[WITHDRAW_REQUEST_SEED, bond.as_ref()], &config.program_id)
}

/// Authority that manages (owns) all stake accounts deposited to the bonds program.
pub fn find_bonds_withdrawer_authority(config: &EngineConfig) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            BONDS_WITHDRAWER_AUTHORITY_SEED,
            config.config_address.as_ref(),
        ],
        &config.program_id,
    )
}

/// Staker authority of stake accounts funded to the settlement.
pub fn find_settlement_staker_authority(
    config: &EngineConfig,
    settlement: &Pubkey,
) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[SETTLEMENT_STAKER_AUTHORITY_SEED, settlement.as_ref()],
        &config.program_id,
    )
}

/// Resolves the bond address.
///
/// Precedence:
/// 1. the explicitly provided bond address
/// 2. derived from the validator vote account under the configured config account
pub fn resolve_bond_address(
    bond: Option<&Pubkey>,
    vote_account: Option<&Pubkey>,
    config: &EngineConfig,
) -> Result<Pubkey> {
    match (bond, vote_account) {
        (Some(bond), _) => Ok(*bond),
        (None, Some(vote_account)) => {
            let (bond, _) = find_bond_address(config, vote_account);
            debug!(
                "Bond address {} derived from vote account {} (config {})",
                bond, vote_account, config.config_address
            );
            Ok(bond)
        }
        (None, None) => Err(ErrorCode::AddressResolution(
            "bond address requires either the bond or the vote account".to_string(),
        )),
    }
}

/// Resolves the withdraw request address.
///
/// Precedence:
/// 1. the explicitly provided withdraw request address
/// 2. derived from the bond resolved by [resolve_bond_address]
pub fn resolve_withdraw_request_address(
    withdraw_request: Option<&Pubkey>,
    bond: Option<&Pubkey>,
    vote_account: Option<&Pubkey>,
    config: &EngineConfig,
) -> Result<Pubkey> {
    if let Some(withdraw_request) = withdraw_request {
        return Ok(*withdraw_request);
    }
    let bond = resolve_bond_address(bond, vote_account, config).map_err(|_| {
        ErrorCode::AddressResolution(
            "withdraw request address requires the withdraw request, the bond or the vote account"
                .to_string(),
        )
    })?;
    Ok(find_withdraw_request_address(config, &bond).0)
}
