use crate::tree_node::TreeNodeV1;
use crate::{INTERMEDIATE_PREFIX, LEAF_PREFIX};
use solana_program::hash::{hashv, Hash};
use solana_program::pubkey::Pubkey;

/// Decides in which order the accumulated hash and the proof sibling
/// are concatenated when computing the parent node.
///
/// The ordering has to be the one the tree builder used, otherwise
/// a valid proof folds to a different root.
pub trait SiblingOrder {
    /// Returns `(left, right)` for the parent hash at the given proof `level` (0 = leaf level).
    fn order<'a>(&self, level: usize, accumulated: &'a Hash, sibling: &'a Hash)
        -> (&'a Hash, &'a Hash);
}

/// Lexicographic ordering, the smaller hash is the left child.
/// This is the ordering of the settlement merkle trees (`MerkleTree::new(items, true)`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortedSiblings;

impl SiblingOrder for SortedSiblings {
    fn order<'a>(
        &self,
        _level: usize,
        accumulated: &'a Hash,
        sibling: &'a Hash,
    ) -> (&'a Hash, &'a Hash) {
        if accumulated <= sibling {
            (accumulated, sibling)
        } else {
            (sibling, accumulated)
        }
    }
}

/// Left/right position taken from the bits of the leaf index,
/// for trees built without sorting the children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionalSiblings {
    pub leaf_index: u64,
}

impl SiblingOrder for PositionalSiblings {
    fn order<'a>(
        &self,
        level: usize,
        accumulated: &'a Hash,
        sibling: &'a Hash,
    ) -> (&'a Hash, &'a Hash) {
        let is_right_child = level < u64::BITS as usize && (self.leaf_index >> level) & 1 == 1;
        if is_right_child {
            (sibling, accumulated)
        } else {
            (accumulated, sibling)
        }
    }
}

/// Hash of the claim data, the "item" that is placed into the merkle tree.
pub fn hash_tree_node(stake_authority: &Pubkey, withdraw_authority: &Pubkey, claim: u64) -> Hash {
    hashv(&[
        stake_authority.as_ref(),
        withdraw_authority.as_ref(),
        claim.to_le_bytes().as_ref(),
    ])
}

/// Leaf hash as stored in the tree: `sha256(0x00 || item_hash)`.
pub fn hash_leaf_from_item(item: &[u8]) -> Hash {
    hashv(&[LEAF_PREFIX, item])
}

pub fn hash_leaf(stake_authority: &Pubkey, withdraw_authority: &Pubkey, claim: u64) -> Hash {
    hash_leaf_from_item(hash_tree_node(stake_authority, withdraw_authority, claim).as_ref())
}

/// Hash of the claim data committing to the leaf `index` the claim is placed at.
pub fn hash_indexed_tree_node(
    stake_authority: &Pubkey,
    withdraw_authority: &Pubkey,
    claim: u64,
    index: u64,
) -> Hash {
    hashv(&[
        stake_authority.as_ref(),
        withdraw_authority.as_ref(),
        claim.to_le_bytes().as_ref(),
        index.to_le_bytes().as_ref(),
    ])
}

pub fn hash_indexed_leaf(
    stake_authority: &Pubkey,
    withdraw_authority: &Pubkey,
    claim: u64,
    index: u64,
) -> Hash {
    hash_leaf_from_item(
        hash_indexed_tree_node(stake_authority, withdraw_authority, claim, index).as_ref(),
    )
}

/// Intermediate node hash with positional children: `sha256(0x01 || left || right)`.
pub fn hash_intermediate(left: &Hash, right: &Hash) -> Hash {
    hashv(&[INTERMEDIATE_PREFIX, left.as_ref(), right.as_ref()])
}

pub fn hash_pair<O: SiblingOrder + ?Sized>(
    order: &O,
    level: usize,
    accumulated: &Hash,
    sibling: &Hash,
) -> Hash {
    let (left, right) = order.order(level, accumulated, sibling);
    hash_intermediate(left, right)
}

/// Folds the proof starting from the leaf, sorted sibling ordering.
pub fn verify_proof(leaf: &Hash, proof: &[[u8; 32]], root: &Hash) -> bool {
    verify_proof_with_order(leaf, proof, root, &SortedSiblings)
}

pub fn verify_proof_with_order<O: SiblingOrder + ?Sized>(
    leaf: &Hash,
    proof: &[[u8; 32]],
    root: &Hash,
    order: &O,
) -> bool {
    let computed = proof
        .iter()
        .enumerate()
        .fold(*leaf, |accumulated, (level, sibling)| {
            hash_pair(order, level, &accumulated, &Hash::new_from_array(*sibling))
        });
    computed == *root
}

/// Verifies the claim tree node belongs to the tree with the `root`.
pub fn verify_claim(root: &Hash, tree_node: &TreeNodeV1, proof: &[[u8; 32]]) -> bool {
    verify_proof(&tree_node.leaf_hash(), proof, root)
}
