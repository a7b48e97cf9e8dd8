//! Merkle primitives of the validator bonds settlements.
//!
//! A claim is a tree node `(stake_authority, withdraw_authority, claim)`, hashed
//! into an item hash, then into a leaf with the [`LEAF_PREFIX`] domain byte.
//! The indexed [`TreeNode`] commits the leaf index into the item hash as well,
//! so its proof is valid only for the index it was placed at.
//! Intermediate nodes are prefixed with [`INTERMEDIATE_PREFIX`]. The settlement
//! tree builder sorts the two children of every intermediate node, proofs are
//! folded the same way (see [`SiblingOrder`]).

pub mod merkle_tree;
pub mod serde_serialize;
pub mod tree_node;
pub mod verify;

pub use merkle_tree::{get_proof, MerkleTree, Proof, ProofEntry};
pub use tree_node::{TreeNode, TreeNodeV1};
pub use verify::{
    hash_indexed_leaf, hash_indexed_tree_node, hash_intermediate, hash_leaf, hash_leaf_from_item,
    hash_pair, hash_tree_node, verify_claim, verify_proof, verify_proof_with_order,
    PositionalSiblings, SiblingOrder, SortedSiblings,
};

pub const LEAF_PREFIX: &[u8] = &[0];
pub const INTERMEDIATE_PREFIX: &[u8] = &[1];
