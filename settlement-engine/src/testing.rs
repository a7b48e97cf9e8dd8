use crate::stake::{classify_stake_state, StakeAccountParsed};
use solana_sdk::clock::{Clock, Epoch};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::stake::stake_flags::StakeFlags;
use solana_sdk::stake::state::{Authorized, Delegation, Lockup, Meta, Stake, StakeStateV2};
use solana_sdk::stake_history::StakeHistory;

pub const RENT_EXEMPT_RESERVE: u64 = 2282880;

pub fn get_clock() -> Clock {
    Clock {
        slot: 1000,
        epoch_start_timestamp: 3,
        epoch: 10,
        leader_schedule_epoch: 11,
        unix_timestamp: 5,
    }
}

pub fn initialized(authority: &Pubkey, lockup: Lockup) -> StakeStateV2 {
    StakeStateV2::Initialized(meta(authority, lockup))
}

pub fn delegated(
    authority: &Pubkey,
    voter: &Pubkey,
    stake: u64,
    activation_epoch: Epoch,
    deactivation_epoch: Epoch,
) -> StakeStateV2 {
    let mut delegation = Delegation::new(voter, stake, activation_epoch);
    delegation.deactivation_epoch = deactivation_epoch;
    StakeStateV2::Stake(
        meta(authority, Lockup::default()),
        Stake {
            delegation,
            credits_observed: 0,
        },
        StakeFlags::empty(),
    )
}

fn meta(authority: &Pubkey, lockup: Lockup) -> Meta {
    Meta {
        rent_exempt_reserve: RENT_EXEMPT_RESERVE,
        authorized: Authorized {
            staker: *authority,
            withdrawer: *authority,
        },
        lockup,
    }
}

/// Native stake account bytes as the stake program stores them.
pub fn stake_account_data(state: &StakeStateV2) -> Vec<u8> {
    let mut data = bincode::serialize(state).unwrap();
    data.resize(StakeStateV2::size_of(), 0);
    data
}

/// Classified at [get_clock] with an empty stake history.
pub fn parse(lamports: u64, state: &StakeStateV2) -> StakeAccountParsed {
    let parsed = crate::stake::classify_stake_account(
        &Pubkey::new_unique(),
        lamports,
        &stake_account_data(state),
        &get_clock(),
        &StakeHistory::default(),
    )
    .unwrap();
    assert_eq!(
        parsed,
        classify_stake_state(
            &parsed.address,
            lamports,
            state,
            &get_clock(),
            &StakeHistory::default()
        )
    );
    parsed
}
