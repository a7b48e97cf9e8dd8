// PROGRAM ID: vBoNdEvzMrSai7is21XgVYik65mqtaKXuSdMBJ1xkW4
pub const DEFAULT_PROGRAM_ID: &str = "vBoNdEvzMrSai7is21XgVYik65mqtaKXuSdMBJ1xkW4";

// stake withdrawer PDA: 7cgg6KhPd1G8oaoB48RyPDWu7uZs51jUpDYB3eq4VebH
pub const DEFAULT_CONFIG_ADDRESS: &str = "vbMaRfmTCg92HWGzmd53APkMNpPnGVGZTUHwUJQkXAU";

pub const BOND_SEED: &[u8] = b"bond_account";
pub const SETTLEMENT_SEED: &[u8] = b"settlement_account";
pub const SETTLEMENT_CLAIMS_SEED: &[u8] = b"claims_account";
pub const WITHDRAW_REQUEST_SEED: &[u8] = b"withdraw_account";
pub const BONDS_WITHDRAWER_AUTHORITY_SEED: &[u8] = b"bonds_authority";
pub const SETTLEMENT_STAKER_AUTHORITY_SEED: &[u8] = b"settlement_authority";

/// Hard floor of delegated lamports a stake account has to keep on top of its rent exempt reserve.
/// The configured minimum may only raise it.
pub const MIN_STAKE_LAMPORTS: u64 = 1_000_000_000;

// 8 + mem::size_of::<SettlementClaims>(): 8 + 32 + 1 + 8 = 49 bytes
// Anchor aligns to 8 bytes, so data part that Anchor uses for saving data is 56 bytes
pub const SETTLEMENT_CLAIMS_ANCHOR_HEADER_SIZE: usize = 56;

/// Anchor account discriminator preimage of the settlement claims account.
pub const SETTLEMENT_CLAIMS_DISCRIMINATOR_PREIMAGE: &[u8] = b"account:SettlementClaims";

pub const SETTLEMENT_CLAIMS_VERSION: u8 = 0;
