use crate::addresses::find_bond_address;
use crate::config::EngineConfig;
use crate::error::{ErrorCode, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Validator collateral, exactly one per config and validator vote account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    /// config account the bond belongs to
    pub config: Pubkey,
    /// validator vote account this bond is created for
    pub vote_account: Pubkey,
    /// authority that may manage the bond, next to the vote account withdrawer
    pub authority: Pubkey,
    /// cost per mille per epoch
    pub cpmpe: u64,
    /// PDA bond address bump seed
    pub bump: u8,
}

impl Bond {
    pub fn new(
        config: &EngineConfig,
        vote_account: &Pubkey,
        authority: &Pubkey,
        cpmpe: u64,
    ) -> Self {
        let (_, bump) = find_bond_address(config, vote_account);
        Self {
            config: config.config_address,
            vote_account: *vote_account,
            authority: *authority,
            cpmpe,
            bump,
        }
    }

    pub fn address(&self, config: &EngineConfig) -> Pubkey {
        find_bond_address(config, &self.vote_account).0
    }

    /// Bond account change is permitted to bond authority or validator vote account owner
    pub fn is_change_permitted(
        &self,
        authority: &Pubkey,
        vote_account_withdrawer: Option<&Pubkey>,
    ) -> bool {
        authority == &self.authority || vote_account_withdrawer == Some(authority)
    }

    pub fn check_change_permitted(
        &self,
        config: &EngineConfig,
        authority: &Pubkey,
        vote_account_withdrawer: Option<&Pubkey>,
    ) -> Result<()> {
        if self.is_change_permitted(authority, vote_account_withdrawer) {
            Ok(())
        } else {
            Err(ErrorCode::BondChangeNotPermitted {
                bond: self.address(config),
                authority: *authority,
            })
        }
    }
}
