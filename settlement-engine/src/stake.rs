use crate::constants::MIN_STAKE_LAMPORTS;
use crate::error::{ErrorCode, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use solana_sdk::clock::{Clock, Epoch};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::stake::state::{Lockup, StakeStateV2};
use solana_sdk::stake_history::{StakeHistory, StakeHistoryEntry};

/// Lifecycle of a native stake account as observed at a given epoch.
/// `Uninitialized -> Initialized -> Delegating -> Active -> Deactivating -> Deactivated (-> Delegating)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StakeLifecycleState {
    Uninitialized,
    /// authorities set, not delegated
    Initialized,
    /// delegated and activating
    Delegating,
    Active,
    Deactivating,
    Deactivated,
    RewardsPool,
}

/// Stake account data derived from its native encoding, never cached across epochs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeAccountParsed {
    pub address: Pubkey,
    pub withdrawer: Option<Pubkey>,
    pub staker: Option<Pubkey>,
    pub voter: Option<Pubkey>,
    pub activation_epoch: Option<Epoch>,
    pub deactivation_epoch: Option<Epoch>,
    pub is_cooling_down: bool,
    pub is_locked_up: bool,
    pub balance_lamports: u64,
    /// effective + activating + deactivating stake at the observed epoch
    pub staked_lamports: u64,
    pub rent_exempt_reserve: u64,
    pub lockup: Option<Lockup>,
    pub state: StakeLifecycleState,
}

impl StakeAccountParsed {
    pub fn is_owned_by(&self, authority: &Pubkey) -> bool {
        self.staker.as_ref() == Some(authority) && self.withdrawer.as_ref() == Some(authority)
    }
}

/// Decodes the native stake account bytes and derives its lifecycle at the clock epoch.
/// Malformed data fails with [ErrorCode::InvalidStakeAccountData].
pub fn classify_stake_account(
    address: &Pubkey,
    lamports: u64,
    data: &[u8],
    clock: &Clock,
    stake_history: &StakeHistory,
) -> Result<StakeAccountParsed> {
    let stake_state = bincode::deserialize::<StakeStateV2>(data).map_err(|e| {
        ErrorCode::InvalidStakeAccountData(format!("stake account {}: {}", address, e))
    })?;
    Ok(classify_stake_state(
        address,
        lamports,
        &stake_state,
        clock,
        stake_history,
    ))
}

pub fn classify_stake_state(
    address: &Pubkey,
    lamports: u64,
    stake_state: &StakeStateV2,
    clock: &Clock,
    stake_history: &StakeHistory,
) -> StakeAccountParsed {
    let meta = stake_state.meta();
    let delegation = stake_state.delegation();
    let (state, staked_lamports) = match stake_state {
        StakeStateV2::Uninitialized => (StakeLifecycleState::Uninitialized, 0),
        StakeStateV2::Initialized(_) => (StakeLifecycleState::Initialized, 0),
        StakeStateV2::RewardsPool => (StakeLifecycleState::RewardsPool, 0),
        StakeStateV2::Stake(_, stake, _) => {
            let StakeHistoryEntry {
                effective,
                activating,
                deactivating,
            } = stake.delegation.stake_activating_and_deactivating(
                clock.epoch,
                Some(stake_history),
                None,
            );
            let state = if effective == 0 && activating == 0 {
                StakeLifecycleState::Deactivated
            } else if deactivating > 0 {
                StakeLifecycleState::Deactivating
            } else if activating > 0 {
                StakeLifecycleState::Delegating
            } else {
                StakeLifecycleState::Active
            };
            (
                state,
                effective
                    .saturating_add(activating)
                    .saturating_add(deactivating),
            )
        }
    };

    StakeAccountParsed {
        address: *address,
        withdrawer: meta.map(|m| m.authorized.withdrawer),
        staker: meta.map(|m| m.authorized.staker),
        voter: delegation.map(|d| d.voter_pubkey),
        activation_epoch: delegation.map(|d| d.activation_epoch),
        deactivation_epoch: delegation
            .map(|d| d.deactivation_epoch)
            .filter(|epoch| *epoch != Epoch::MAX),
        is_cooling_down: state == StakeLifecycleState::Deactivating,
        is_locked_up: meta
            .map(|m| m.lockup.is_in_force(clock, None))
            .unwrap_or(false),
        balance_lamports: lamports,
        staked_lamports,
        rent_exempt_reserve: meta.map(|m| m.rent_exempt_reserve).unwrap_or(0),
        lockup: meta.map(|m| m.lockup),
        state,
    }
}

/// Minimal lamports of a stake account to be capable to exist delegated.
pub fn minimal_size_stake_account(rent_exempt_reserve: u64, min_stake: u64) -> u64 {
    rent_exempt_reserve.saturating_add(min_stake.max(MIN_STAKE_LAMPORTS))
}

/// Stake account is changing its delegation within the current epoch.
pub fn is_transient(stake_account: &StakeAccountParsed) -> bool {
    matches!(
        stake_account.state,
        StakeLifecycleState::Delegating | StakeLifecycleState::Deactivating
    ) && stake_account.staked_lamports > 0
}

/// Stake account managed by the bonds program and delegated to the bond validator,
/// the common precondition of funding and withdrawing.
pub fn check_owned_by_bond(
    stake_account: &StakeAccountParsed,
    expected_voter: &Pubkey,
    bonds_authority: &Pubkey,
) -> Result<()> {
    if stake_account.staker.as_ref() != Some(bonds_authority) {
        return Err(ErrorCode::stake_not_eligible(
            &stake_account.address,
            format!(
                "staker {:?} is not the bonds authority {}",
                stake_account.staker, bonds_authority
            ),
        ));
    }
    if stake_account.withdrawer.as_ref() != Some(bonds_authority) {
        return Err(ErrorCode::stake_not_eligible(
            &stake_account.address,
            format!(
                "withdrawer {:?} is not the bonds authority {}",
                stake_account.withdrawer, bonds_authority
            ),
        ));
    }
    if stake_account.voter.as_ref() != Some(expected_voter) {
        return Err(ErrorCode::stake_not_eligible(
            &stake_account.address,
            format!(
                "delegated to {:?}, expected vote account {}",
                stake_account.voter, expected_voter
            ),
        ));
    }
    if stake_account.is_locked_up {
        return Err(ErrorCode::stake_not_eligible(
            &stake_account.address,
            "lockup is in force",
        ));
    }
    Ok(())
}

pub fn check_usable_for_bond_funding(
    stake_account: &StakeAccountParsed,
    expected_voter: &Pubkey,
    bonds_authority: &Pubkey,
    min_stake: u64,
) -> Result<()> {
    check_owned_by_bond(stake_account, expected_voter, bonds_authority)?;
    if stake_account.state != StakeLifecycleState::Active {
        return Err(ErrorCode::stake_not_eligible(
            &stake_account.address,
            format!("not fully activated, state {:?}", stake_account.state),
        ));
    }
    let minimal_size = minimal_size_stake_account(stake_account.rent_exempt_reserve, min_stake);
    if stake_account.balance_lamports < minimal_size {
        return Err(ErrorCode::stake_not_eligible(
            &stake_account.address,
            format!(
                "balance {} is below the minimal size {}",
                stake_account.balance_lamports, minimal_size
            ),
        ));
    }
    Ok(())
}

pub fn is_usable_for_bond_funding(
    stake_account: &StakeAccountParsed,
    expected_voter: &Pubkey,
    bonds_authority: &Pubkey,
    min_stake: u64,
) -> bool {
    check_usable_for_bond_funding(stake_account, expected_voter, bonds_authority, min_stake)
        .is_ok()
}

/// Stake program merge rule restricted to the non-transient states:
/// both fully active or both deactivated, same voter, same lockup and same authorities.
pub fn check_mergeable_into(
    destination: &StakeAccountParsed,
    source: &StakeAccountParsed,
) -> Result<()> {
    let mismatch = |reason: String| {
        Err(ErrorCode::merge_mismatch(
            &destination.address,
            &source.address,
            reason,
        ))
    };
    if destination.address == source.address {
        return mismatch("cannot merge stake account into itself".to_string());
    }
    if is_transient(destination) || is_transient(source) {
        return mismatch(format!(
            "transient state, destination {:?}, source {:?}",
            destination.state, source.state
        ));
    }
    match (destination.state, source.state) {
        (StakeLifecycleState::Active, StakeLifecycleState::Active)
        | (StakeLifecycleState::Deactivated, StakeLifecycleState::Deactivated) => {}
        (destination_state, source_state) => {
            return mismatch(format!(
                "different or non-mergeable states, destination {:?}, source {:?}",
                destination_state, source_state
            ));
        }
    }
    if destination.voter != source.voter {
        return mismatch(format!(
            "delegated to different vote accounts {:?} and {:?}",
            destination.voter, source.voter
        ));
    }
    if destination.lockup != source.lockup {
        return mismatch(format!(
            "lockup differs {:?} and {:?}",
            destination.lockup, source.lockup
        ));
    }
    if destination.staker != source.staker || destination.withdrawer != source.withdrawer {
        return mismatch("authorities differ".to_string());
    }
    Ok(())
}

pub fn is_mergeable_into(destination: &StakeAccountParsed, source: &StakeAccountParsed) -> bool {
    check_mergeable_into(destination, source).is_ok()
}

/// Splitting off `amount` lamports has to leave both stake accounts at least at the minimal size.
pub fn check_splittable(
    stake_account: &StakeAccountParsed,
    amount: u64,
    min_stake: u64,
) -> Result<()> {
    let minimal_size = minimal_size_stake_account(stake_account.rent_exempt_reserve, min_stake);
    let remaining = stake_account.balance_lamports.checked_sub(amount);
    match remaining {
        Some(remaining) if remaining >= minimal_size && amount >= minimal_size => Ok(()),
        _ => Err(ErrorCode::NotBigEnoughToSplit {
            stake_account: stake_account.address,
            balance: stake_account.balance_lamports,
            amount,
            minimal_size,
        }),
    }
}

pub fn is_splittable(stake_account: &StakeAccountParsed, amount: u64, min_stake: u64) -> bool {
    check_splittable(stake_account, amount, min_stake).is_ok()
}

fn get_claiming_priority_key(stake_account: &StakeAccountParsed) -> u8 {
    match stake_account.state {
        StakeLifecycleState::Initialized => 0,
        StakeLifecycleState::Deactivated => 1,
        StakeLifecycleState::Deactivating => 2,
        StakeLifecycleState::Active => 3,
        StakeLifecycleState::Delegating => 4,
        StakeLifecycleState::Uninitialized | StakeLifecycleState::RewardsPool => u8::MAX,
    }
}

/// Picks the stake account a claim is best paid into.
/// Locked accounts are skipped; returns `None` when no account is usable.
pub fn prioritize_for_claiming(stake_accounts: &[StakeAccountParsed]) -> Option<Pubkey> {
    let mut candidates = stake_accounts
        .iter()
        .filter(|stake_account| !stake_account.is_locked_up)
        .filter(|stake_account| get_claiming_priority_key(stake_account) != u8::MAX)
        .collect::<Vec<_>>();
    candidates.sort_by_key(|stake_account| get_claiming_priority_key(stake_account));
    let chosen = candidates.first().map(|stake_account| stake_account.address);
    match chosen {
        Some(address) => debug!("Claiming to stake account {}", address),
        None if !stake_accounts.is_empty() => warn!(
            "All stake accounts are locked or not initialized for claiming ({})",
            stake_accounts.len()
        ),
        None => warn!("No stake accounts for claiming"),
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{delegated, get_clock, initialized, parse, RENT_EXEMPT_RESERVE};
    use assert_matches::assert_matches;
    use solana_sdk::stake::state::Lockup;

    const SOL: u64 = 1_000_000_000;

    #[test]
    fn classify_lifecycle_states() {
        let clock = get_clock(); // epoch 10
        let authority = Pubkey::new_unique();
        let voter = Pubkey::new_unique();

        let active = parse(10 * SOL, &delegated(&authority, &voter, 9 * SOL, 5, u64::MAX));
        assert_eq!(active.state, StakeLifecycleState::Active);
        assert_eq!(active.staked_lamports, 9 * SOL);
        assert_eq!(active.voter, Some(voter));
        assert_eq!(active.activation_epoch, Some(5));
        assert_eq!(active.deactivation_epoch, None);
        assert!(!active.is_cooling_down);

        let delegating = parse(
            10 * SOL,
            &delegated(&authority, &voter, 9 * SOL, clock.epoch, u64::MAX),
        );
        assert_eq!(delegating.state, StakeLifecycleState::Delegating);

        let deactivating = parse(10 * SOL, &delegated(&authority, &voter, 9 * SOL, 5, clock.epoch));
        assert_eq!(deactivating.state, StakeLifecycleState::Deactivating);
        assert!(deactivating.is_cooling_down);
        assert_eq!(deactivating.deactivation_epoch, Some(clock.epoch));

        let deactivated = parse(10 * SOL, &delegated(&authority, &voter, 9 * SOL, 5, 8));
        assert_eq!(deactivated.state, StakeLifecycleState::Deactivated);
        assert_eq!(deactivated.staked_lamports, 0);

        let initialized = parse(10 * SOL, &initialized(&authority, Lockup::default()));
        assert_eq!(initialized.state, StakeLifecycleState::Initialized);
        assert_eq!(initialized.voter, None);
        assert_eq!(initialized.staker, Some(authority));
        assert_eq!(initialized.rent_exempt_reserve, RENT_EXEMPT_RESERVE);

        assert_eq!(
            parse(10 * SOL, &StakeStateV2::Uninitialized).state,
            StakeLifecycleState::Uninitialized
        );
        assert_eq!(
            parse(10 * SOL, &StakeStateV2::RewardsPool).state,
            StakeLifecycleState::RewardsPool
        );
    }

    #[test]
    fn classify_malformed_data() {
        let clock = get_clock();
        let address = Pubkey::new_unique();
        assert_matches!(
            classify_stake_account(&address, 1, &[], &clock, &StakeHistory::default()),
            Err(ErrorCode::InvalidStakeAccountData(_))
        );
        assert_matches!(
            classify_stake_account(&address, 1, &[9, 0, 0, 0], &clock, &StakeHistory::default()),
            Err(ErrorCode::InvalidStakeAccountData(_))
        );
        // truncated delegated stake account
        let mut data = bincode::serialize(&delegated(
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            SOL,
            1,
            u64::MAX,
        ))
        .unwrap();
        data.truncate(100);
        assert_matches!(
            classify_stake_account(&address, 1, &data, &clock, &StakeHistory::default()),
            Err(ErrorCode::InvalidStakeAccountData(_))
        );
    }

    #[test]
    fn lockup_in_force() {
        let clock = get_clock();
        let authority = Pubkey::new_unique();
        let locked = parse(
            10 * SOL,
            &initialized(
                &authority,
                Lockup {
                    unix_timestamp: 0,
                    epoch: clock.epoch + 1,
                    custodian: Pubkey::new_unique(),
                },
            ),
        );
        assert!(locked.is_locked_up);
        let expired_lockup = parse(
            10 * SOL,
            &initialized(
                &authority,
                Lockup {
                    unix_timestamp: 0,
                    epoch: clock.epoch,
                    custodian: Pubkey::new_unique(),
                },
            ),
        );
        assert!(!expired_lockup.is_locked_up);
    }

    #[test]
    fn bond_funding_eligibility() {
        let bonds_authority = Pubkey::new_unique();
        let voter = Pubkey::new_unique();
        let active = parse(10 * SOL, &delegated(&bonds_authority, &voter, 9 * SOL, 5, u64::MAX));
        check_usable_for_bond_funding(&active, &voter, &bonds_authority, SOL).unwrap();
        assert!(is_usable_for_bond_funding(&active, &voter, &bonds_authority, SOL));

        assert_matches!(
            check_usable_for_bond_funding(&active, &Pubkey::new_unique(), &bonds_authority, SOL),
            Err(ErrorCode::StakeNotEligible { .. })
        );
        assert_matches!(
            check_usable_for_bond_funding(&active, &voter, &Pubkey::new_unique(), SOL),
            Err(ErrorCode::StakeNotEligible { .. })
        );

        let deactivating = parse(10 * SOL, &delegated(&bonds_authority, &voter, 9 * SOL, 5, 10));
        assert_matches!(
            check_usable_for_bond_funding(&deactivating, &voter, &bonds_authority, SOL),
            Err(ErrorCode::StakeNotEligible { reason, .. }) if reason.contains("Deactivating")
        );

        let too_small = parse(
            RENT_EXEMPT_RESERVE + SOL - 1,
            &delegated(&bonds_authority, &voter, SOL - 1, 5, u64::MAX),
        );
        assert!(!is_usable_for_bond_funding(&too_small, &voter, &bonds_authority, SOL));

        let mut locked = active.clone();
        locked.is_locked_up = true;
        assert!(!is_usable_for_bond_funding(&locked, &voter, &bonds_authority, SOL));
    }

    #[test]
    fn merge_eligibility() {
        let authority = Pubkey::new_unique();
        let voter = Pubkey::new_unique();
        let destination = parse(10 * SOL, &delegated(&authority, &voter, 9 * SOL, 5, u64::MAX));
        let source = parse(5 * SOL, &delegated(&authority, &voter, 4 * SOL, 6, u64::MAX));
        check_mergeable_into(&destination, &source).unwrap();
        assert!(is_mergeable_into(&source, &destination));

        let deactivated_destination =
            parse(10 * SOL, &delegated(&authority, &voter, 9 * SOL, 5, 8));
        let deactivated_source = parse(5 * SOL, &delegated(&authority, &voter, 4 * SOL, 5, 9));
        check_mergeable_into(&deactivated_destination, &deactivated_source).unwrap();

        // self merge
        assert_matches!(
            check_mergeable_into(&destination, &destination),
            Err(ErrorCode::MergeMismatch { .. })
        );

        // different voter
        let mut other = source.clone();
        other.voter = Some(Pubkey::new_unique());
        assert_matches!(
            check_mergeable_into(&destination, &other),
            Err(ErrorCode::MergeMismatch { .. })
        );

        // different lockup epoch
        let mut other = source.clone();
        other.lockup = Some(Lockup {
            epoch: 1,
            ..Lockup::default()
        });
        assert_matches!(
            check_mergeable_into(&destination, &other),
            Err(ErrorCode::MergeMismatch { .. })
        );

        // different lockup custodian
        let mut other = source.clone();
        other.lockup = Some(Lockup {
            custodian: Pubkey::new_unique(),
            ..Lockup::default()
        });
        assert_matches!(
            check_mergeable_into(&destination, &other),
            Err(ErrorCode::MergeMismatch { .. })
        );

        // different authorities
        let mut other = source.clone();
        other.withdrawer = Some(Pubkey::new_unique());
        assert_matches!(
            check_mergeable_into(&destination, &other),
            Err(ErrorCode::MergeMismatch { .. })
        );

        // one active and one deactivating
        let deactivating = parse(5 * SOL, &delegated(&authority, &voter, 4 * SOL, 5, 10));
        assert_matches!(
            check_mergeable_into(&destination, &deactivating),
            Err(ErrorCode::MergeMismatch { reason, .. }) if reason.contains("transient")
        );

        // one active and one deactivated
        assert_matches!(
            check_mergeable_into(&destination, &deactivated_source),
            Err(ErrorCode::MergeMismatch { reason, .. }) if reason.contains("states")
        );
    }

    #[test]
    fn split_floor() {
        let authority = Pubkey::new_unique();
        let voter = Pubkey::new_unique();
        let minimal_size = minimal_size_stake_account(RENT_EXEMPT_RESERVE, SOL);
        assert_eq!(minimal_size, RENT_EXEMPT_RESERVE + SOL);
        // configured minimum cannot lower the hard floor
        assert_eq!(minimal_size_stake_account(RENT_EXEMPT_RESERVE, 1), minimal_size);
        assert_eq!(
            minimal_size_stake_account(RENT_EXEMPT_RESERVE, 2 * SOL),
            RENT_EXEMPT_RESERVE + 2 * SOL
        );

        let stake_account = parse(
            2 * minimal_size,
            &delegated(&authority, &voter, 2 * minimal_size - RENT_EXEMPT_RESERVE, 5, u64::MAX),
        );
        check_splittable(&stake_account, minimal_size, SOL).unwrap();
        assert_eq!(
            check_splittable(&stake_account, minimal_size + 1, SOL),
            Err(ErrorCode::NotBigEnoughToSplit {
                stake_account: stake_account.address,
                balance: 2 * minimal_size,
                amount: minimal_size + 1,
                minimal_size,
            })
        );
        assert!(!is_splittable(&stake_account, minimal_size - 1, SOL));
        assert!(!is_splittable(&stake_account, 3 * minimal_size, SOL));
        assert!(!is_splittable(&stake_account, 2 * minimal_size, SOL));
    }

    #[test]
    fn transient_states() {
        let authority = Pubkey::new_unique();
        let voter = Pubkey::new_unique();
        assert!(is_transient(&parse(10 * SOL, &delegated(&authority, &voter, SOL, 10, u64::MAX))));
        assert!(is_transient(&parse(10 * SOL, &delegated(&authority, &voter, SOL, 5, 10))));
        assert!(!is_transient(&parse(10 * SOL, &delegated(&authority, &voter, SOL, 5, u64::MAX))));
        assert!(!is_transient(&parse(10 * SOL, &delegated(&authority, &voter, SOL, 5, 9))));
        assert!(!is_transient(&parse(10 * SOL, &initialized(&authority, Lockup::default()))));
    }

    #[test]
    fn claiming_priority() {
        let authority = Pubkey::new_unique();
        let voter = Pubkey::new_unique();
        let active = parse(10 * SOL, &delegated(&authority, &voter, SOL, 5, u64::MAX));
        let activating = parse(10 * SOL, &delegated(&authority, &voter, SOL, 10, u64::MAX));
        let deactivated = parse(10 * SOL, &delegated(&authority, &voter, SOL, 5, 9));
        let initialized = parse(10 * SOL, &initialized(&authority, Lockup::default()));
        let mut locked_initialized = initialized.clone();
        locked_initialized.address = Pubkey::new_unique();
        locked_initialized.is_locked_up = true;

        assert_eq!(prioritize_for_claiming(&[]), None);
        assert_eq!(
            prioritize_for_claiming(&[
                activating.clone(),
                active.clone(),
                locked_initialized.clone(),
                deactivated.clone()
            ]),
            Some(deactivated.address)
        );
        assert_eq!(
            prioritize_for_claiming(&[activating.clone(), initialized.clone(), active.clone()]),
            Some(initialized.address)
        );
        assert_eq!(
            prioritize_for_claiming(&[activating.clone(), active.clone()]),
            Some(active.address)
        );
        assert_eq!(prioritize_for_claiming(&[locked_initialized]), None);
    }
}
