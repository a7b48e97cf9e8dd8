use crate::verify::{hash_intermediate, hash_leaf_from_item};
use solana_program::hash::Hash;

/// Merkle tree over item hashes, the nodes are stored level by level starting with the leaves.
/// When a level has odd number of nodes the last node is paired with itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    leaf_count: usize,
    nodes: Vec<Hash>,
    sorted_hashes: bool,
}

/// One step of the path from a leaf to the root, keeping the sibling
/// and the side it sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofEntry {
    target: Hash,
    left_sibling: Option<Hash>,
    right_sibling: Option<Hash>,
}

impl ProofEntry {
    pub fn new(target: Hash, left_sibling: Option<Hash>, right_sibling: Option<Hash>) -> Self {
        assert!(left_sibling.is_none() ^ right_sibling.is_none());
        Self {
            target,
            left_sibling,
            right_sibling,
        }
    }

    pub fn get_sibling(&self) -> &Hash {
        self.left_sibling
            .as_ref()
            .or(self.right_sibling.as_ref())
            .unwrap_or(&self.target)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Proof(Vec<ProofEntry>);

impl Proof {
    pub fn push(&mut self, entry: ProofEntry) {
        self.0.push(entry)
    }

    /// Folds the path from the `leaf` keeping the sibling sides recorded by the tree,
    /// `sorted_hashes` has to match the tree the proof was taken from.
    pub fn verify(&self, leaf: &Hash, root: &Hash, sorted_hashes: bool) -> bool {
        let computed = self.0.iter().fold(*leaf, |accumulated, entry| {
            let (left, right) = match (entry.left_sibling, entry.right_sibling) {
                (Some(left), _) => (left, accumulated),
                (None, right) => (accumulated, right.unwrap_or(accumulated)),
            };
            if sorted_hashes && left > right {
                hash_intermediate(&right, &left)
            } else {
                hash_intermediate(&left, &right)
            }
        });
        computed == *root
    }

    /// Proof as stored in the claim tree node, siblings from the leaf level up.
    pub fn to_siblings(&self) -> Vec<[u8; 32]> {
        self.0.iter().map(|entry| entry.get_sibling().to_bytes()).collect()
    }
}

impl MerkleTree {
    /// Number of nodes of the tree: `2n - 1` for a balanced tree plus one node
    /// per level when the odd leaf makes a single-child path to the root.
    fn calculate_vec_capacity(leaf_count: usize) -> usize {
        if leaf_count > 0 {
            fast_math::log2_raw(leaf_count as f32) as usize + 2 * leaf_count + 1
        } else {
            0
        }
    }

    fn next_level_len(level_len: usize) -> usize {
        if level_len == 1 {
            0
        } else {
            (level_len + 1) / 2
        }
    }

    fn parent(&self, left: &Hash, right: &Hash) -> Hash {
        if self.sorted_hashes && left > right {
            hash_intermediate(right, left)
        } else {
            hash_intermediate(left, right)
        }
    }

    /// Builds the tree from item hashes (e.g., `TreeNodeV1::hash`),
    /// every item is hashed into the leaf with the leaf prefix.
    pub fn new<T: AsRef<[u8]>>(items: &[T], sorted_hashes: bool) -> Self {
        let mut tree = MerkleTree {
            leaf_count: items.len(),
            nodes: Vec::with_capacity(Self::calculate_vec_capacity(items.len())),
            sorted_hashes,
        };
        tree.nodes
            .extend(items.iter().map(|item| hash_leaf_from_item(item.as_ref())));

        let mut level_start = 0;
        let mut level_len = items.len();
        while Self::next_level_len(level_len) > 0 {
            let next_level_start = level_start + level_len;
            for i in (0..level_len).step_by(2) {
                let left = tree.nodes[level_start + i];
                let right = if i + 1 < level_len {
                    tree.nodes[level_start + i + 1]
                } else {
                    left
                };
                let parent = tree.parent(&left, &right);
                tree.nodes.push(parent);
            }
            level_start = next_level_start;
            level_len = Self::next_level_len(level_len);
        }
        tree
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn get_root(&self) -> Option<&Hash> {
        self.nodes.last()
    }

    pub fn get_leaf(&self, index: usize) -> Option<&Hash> {
        if index < self.leaf_count {
            self.nodes.get(index)
        } else {
            None
        }
    }

    pub fn find_path(&self, index: usize) -> Option<Proof> {
        if index >= self.leaf_count {
            return None;
        }
        let mut proof = Proof::default();
        let mut level_start = 0;
        let mut level_len = self.leaf_count;
        let mut node_index = index;
        while Self::next_level_len(level_len) > 0 {
            let level = &self.nodes[level_start..level_start + level_len];
            let target = level[node_index];
            let entry = if node_index % 2 == 0 {
                let right = level.get(node_index + 1).copied().unwrap_or(target);
                ProofEntry::new(target, None, Some(right))
            } else {
                ProofEntry::new(target, Some(level[node_index - 1]), None)
            };
            proof.push(entry);
            node_index /= 2;
            level_start += level_len;
            level_len = Self::next_level_len(level_len);
        }
        Some(proof)
    }
}

/// Extracts merkle proof for a tree node at index `i` from a merkle tree.
pub fn get_proof(merkle_tree: &MerkleTree, i: usize) -> Option<Vec<[u8; 32]>> {
    merkle_tree.find_path(i).map(|path| path.to_siblings())
}
