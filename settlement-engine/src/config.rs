use crate::constants::{DEFAULT_CONFIG_ADDRESS, DEFAULT_PROGRAM_ID, MIN_STAKE_LAMPORTS};
use anyhow::{anyhow, Context};
use log::debug;
use merkle_tree::serde_serialize::pubkey_string_conversion;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::str::FromStr;

/// Protocol parameters the engine works with.
/// Passed explicitly to every operation that depends on them, never read from a global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(with = "pubkey_string_conversion")]
    pub program_id: Pubkey,
    /// validator bonds config account the bonds are created under
    #[serde(with = "pubkey_string_conversion")]
    pub config_address: Pubkey,
    /// number of epochs after settlement creation when it is possible to claim
    pub epochs_to_claim_settlement: u64,
    /// number of slots after settlement creation before claiming is permitted
    pub slots_to_start_settlement_claiming: u64,
    /// number of epochs after the withdraw request creation when it can be fulfilled
    pub withdraw_lockup_epochs: u64,
    /// minimal delegated lamports of a stake account, cannot go below [MIN_STAKE_LAMPORTS]
    pub minimum_stake_lamports: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program_id: Pubkey::from_str(DEFAULT_PROGRAM_ID).unwrap_or_default(),
            config_address: Pubkey::from_str(DEFAULT_CONFIG_ADDRESS).unwrap_or_default(),
            epochs_to_claim_settlement: 3,
            slots_to_start_settlement_claiming: 0,
            withdraw_lockup_epochs: 3,
            minimum_stake_lamports: MIN_STAKE_LAMPORTS,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)
            .map_err(|e| anyhow!("Cannot parse engine config: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.program_id == Pubkey::default() {
            return Err(anyhow!("Engine config program_id must be set"));
        }
        if self.config_address == Pubkey::default() {
            return Err(anyhow!("Engine config config_address must be set"));
        }
        Ok(())
    }

    /// Minimal delegated lamports a stake account has to keep, never lower than the hard floor.
    pub fn minimum_stake_lamports(&self) -> u64 {
        self.minimum_stake_lamports.max(MIN_STAKE_LAMPORTS)
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read engine config file {}", path.display()))?;
    let config = EngineConfig::from_yaml_str(&yaml)
        .with_context(|| format!("Invalid engine config file {}", path.display()))?;
    debug!("Loaded engine config from {}: {:?}", path.display(), config);
    Ok(config)
}
