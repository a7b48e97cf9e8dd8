#![allow(dead_code)]

use merkle_tree::{get_proof, MerkleTree, TreeNode};
use settlement_engine::stake::{classify_stake_account, StakeAccountParsed};
use settlement_engine::{CreateSettlementArgs, EngineConfig, Settlement};
use solana_sdk::clock::{Clock, Epoch};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::stake::stake_flags::StakeFlags;
use solana_sdk::stake::state::{Authorized, Delegation, Lockup, Meta, Stake, StakeStateV2};
use solana_sdk::stake_history::StakeHistory;

pub const SOL: u64 = 1_000_000_000;
pub const RENT_EXEMPT_RESERVE: u64 = 2282880;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn clock(epoch: Epoch, slot: u64) -> Clock {
    Clock {
        slot,
        epoch_start_timestamp: 0,
        epoch,
        leader_schedule_epoch: epoch + 1,
        unix_timestamp: 1_700_000_000,
    }
}

/// Delegated stake account in the native encoding, fully active from `activation_epoch + 1`.
pub fn delegated_stake_data(
    authority: &Pubkey,
    voter: &Pubkey,
    lamports: u64,
    activation_epoch: Epoch,
    deactivation_epoch: Epoch,
) -> Vec<u8> {
    let mut delegation = Delegation::new(voter, lamports - RENT_EXEMPT_RESERVE, activation_epoch);
    delegation.deactivation_epoch = deactivation_epoch;
    let state = StakeStateV2::Stake(
        Meta {
            rent_exempt_reserve: RENT_EXEMPT_RESERVE,
            authorized: Authorized {
                staker: *authority,
                withdrawer: *authority,
            },
            lockup: Lockup::default(),
        },
        Stake {
            delegation,
            credits_observed: 0,
        },
        StakeFlags::empty(),
    );
    let mut data = bincode::serialize(&state).unwrap();
    data.resize(StakeStateV2::size_of(), 0);
    data
}

pub fn active_stake(
    authority: &Pubkey,
    voter: &Pubkey,
    lamports: u64,
    clock: &Clock,
) -> StakeAccountParsed {
    classify_stake_account(
        &Pubkey::new_unique(),
        lamports,
        &delegated_stake_data(authority, voter, lamports, 0, u64::MAX),
        clock,
        &StakeHistory::default(),
    )
    .unwrap()
}

/// Indexed claim tree nodes with proofs of the sorted settlement merkle tree and its root.
pub fn claim_tree(claims: &[u64]) -> (Vec<TreeNode>, [u8; 32]) {
    let nodes = claims
        .iter()
        .enumerate()
        .map(|(index, claim)| TreeNode {
            stake_authority: Pubkey::new_unique(),
            withdraw_authority: Pubkey::new_unique(),
            claim: *claim,
            index: index as u64,
            proof: None,
        })
        .collect::<Vec<_>>();
    let tree = MerkleTree::new(
        &nodes.iter().map(|node| node.hash()).collect::<Vec<_>>(),
        true,
    );
    let root = tree.get_root().unwrap().to_bytes();
    let nodes = nodes
        .into_iter()
        .enumerate()
        .map(|(index, node)| TreeNode {
            proof: get_proof(&tree, index),
            ..node
        })
        .collect();
    (nodes, root)
}

pub fn new_settlement(
    config: &EngineConfig,
    bond: &Pubkey,
    merkle_root: [u8; 32],
    max_total_claim: u64,
    max_merkle_nodes: u64,
    clock: &Clock,
) -> Settlement {
    Settlement::new(
        CreateSettlementArgs {
            bond: *bond,
            merkle_root,
            max_total_claim,
            max_merkle_nodes,
            epoch: clock.epoch,
            slot: clock.slot,
            rent_collector: Pubkey::new_unique(),
        },
        config,
    )
    .unwrap()
}
