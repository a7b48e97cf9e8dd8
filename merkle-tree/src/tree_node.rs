use crate::serde_serialize::pubkey_string_conversion;
use crate::verify::{hash_indexed_tree_node, hash_leaf_from_item, hash_tree_node};
use serde::{Deserialize, Serialize};
use solana_program::hash::Hash;
use solana_program::pubkey::Pubkey;

/// Claim record of a settlement merkle tree.
#[derive(Default, Clone, Eq, Debug, Hash, PartialEq, Deserialize, Serialize)]
pub struct TreeNodeV1 {
    #[serde(with = "pubkey_string_conversion")]
    pub stake_authority: Pubkey,
    #[serde(with = "pubkey_string_conversion")]
    pub withdraw_authority: Pubkey,
    pub claim: u64,
    pub proof: Option<Vec<[u8; 32]>>,
}

impl TreeNodeV1 {
    /// Item hash, the value the tree builder consumes.
    pub fn hash(&self) -> Hash {
        hash_tree_node(&self.stake_authority, &self.withdraw_authority, self.claim)
    }

    /// Leaf hash, the value the proof is folded from.
    pub fn leaf_hash(&self) -> Hash {
        hash_leaf_from_item(self.hash().as_ref())
    }
}

/// Claim record with the leaf index committed into the hash,
/// as produced by the settlement distribution pipelines.
#[derive(Default, Clone, Eq, Debug, Hash, PartialEq, Deserialize, Serialize)]
pub struct TreeNode {
    #[serde(with = "pubkey_string_conversion")]
    pub stake_authority: Pubkey,
    #[serde(with = "pubkey_string_conversion")]
    pub withdraw_authority: Pubkey,
    pub claim: u64,
    pub index: u64,
    pub proof: Option<Vec<[u8; 32]>>,
}

impl TreeNode {
    pub fn hash(&self) -> Hash {
        hash_indexed_tree_node(
            &self.stake_authority,
            &self.withdraw_authority,
            self.claim,
            self.index,
        )
    }

    pub fn leaf_hash(&self) -> Hash {
        hash_leaf_from_item(self.hash().as_ref())
    }
}
