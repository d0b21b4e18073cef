//! Client-side mirror of the on-chain append-only Poseidon commitment
//! tree.
//!
//! Insertion replays the contract's filled-subtree walk so the mirrored
//! root matches the chain bit-for-bit; retained levels answer
//! authentication-path queries for any previously inserted leaf. The
//! verifier accepts any of its last [`ROOT_HISTORY_SIZE`] roots, so the
//! mirror keeps the same ring.

use ark_bn254::Fr;
use ark_ff::Zero;
use thiserror::Error;
use zktoken_crypto::poseidon::poseidon2;

/// Fixed tree depth; capacity is `2^TREE_DEPTH` leaves.
pub const TREE_DEPTH: usize = 20;

/// How many recent roots the on-chain verifier accepts.
pub const ROOT_HISTORY_SIZE: usize = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("merkle tree is full")]
    TreeFull,
    #[error("leaf index {0} is out of range")]
    LeafIndexOutOfRange(u64),
}

/// Authentication path for one leaf. `indices` is the LSB-first bit
/// decomposition of the leaf index, one bit per level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerklePath {
    pub root: Fr,
    pub elements: Vec<Fr>,
    pub indices: Vec<u8>,
    pub leaf_index: u64,
}

#[derive(Clone, Debug)]
pub struct PoolTree {
    /// levels[0] holds the leaves; levels[d] the nodes at height d.
    levels: Vec<Vec<Fr>>,
    /// Rightmost filled subtree hash per level, as the contract keeps it.
    filled_subtrees: Vec<Fr>,
    /// zeros[0] = 0, zeros[i] = poseidon2(zeros[i-1], zeros[i-1]).
    zeros: Vec<Fr>,
    next_index: u64,
    current_root: Fr,
    root_history: Vec<Fr>,
    root_history_index: usize,
}

impl Default for PoolTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolTree {
    pub fn new() -> Self {
        let mut zeros = Vec::with_capacity(TREE_DEPTH + 1);
        zeros.push(Fr::zero());
        for level in 0..TREE_DEPTH {
            let prev = zeros[level];
            zeros.push(poseidon2(prev, prev));
        }
        let filled_subtrees = zeros[..TREE_DEPTH].to_vec();
        let current_root = zeros[TREE_DEPTH];
        let mut root_history = vec![Fr::zero(); ROOT_HISTORY_SIZE];
        root_history[0] = current_root;
        Self {
            levels: vec![Vec::new(); TREE_DEPTH + 1],
            filled_subtrees,
            zeros,
            next_index: 0,
            current_root,
            root_history,
            root_history_index: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == 0
    }

    pub fn capacity(&self) -> u64 {
        1u64 << TREE_DEPTH
    }

    pub fn is_full(&self) -> bool {
        self.next_index == self.capacity()
    }

    /// Index the next inserted leaf will receive.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn root(&self) -> Fr {
        self.current_root
    }

    /// Empty-subtree hash per level.
    pub fn zeros(&self) -> &[Fr] {
        &self.zeros
    }

    /// Whether the verifier would still accept this root. The all-zero
    /// filler slots of a young ring never match a real root.
    pub fn is_known_root(&self, root: &Fr) -> bool {
        if root.is_zero() {
            return false;
        }
        self.root_history.iter().any(|known| known == root)
    }

    /// Append a leaf, returning its assigned index and the new root.
    pub fn insert(&mut self, leaf: Fr) -> Result<(u64, Fr), MerkleError> {
        if self.is_full() {
            return Err(MerkleError::TreeFull);
        }
        let index = self.next_index;
        let mut current = leaf;
        let mut position = usize::try_from(index).expect("depth-20 index fits usize");
        self.levels[0].push(leaf);
        for level in 0..TREE_DEPTH {
            if position % 2 == 0 {
                // Left child: remember it for the sibling that arrives
                // later, pair with the empty-subtree hash for now.
                self.filled_subtrees[level] = current;
                current = poseidon2(current, self.zeros[level]);
            } else {
                current = poseidon2(self.filled_subtrees[level], current);
            }
            position /= 2;
            if self.levels[level + 1].len() == position {
                self.levels[level + 1].push(current);
            } else {
                self.levels[level + 1][position] = current;
            }
        }
        self.current_root = current;
        self.root_history_index = (self.root_history_index + 1) % ROOT_HISTORY_SIZE;
        self.root_history[self.root_history_index] = current;
        self.next_index += 1;
        Ok((index, current))
    }

    /// Append a batch of leaves, returning the root after each one.
    pub fn extend<I>(&mut self, leaves: I) -> Result<Vec<Fr>, MerkleError>
    where
        I: IntoIterator<Item = Fr>,
    {
        let mut roots = Vec::new();
        for leaf in leaves {
            let (_, root) = self.insert(leaf)?;
            roots.push(root);
        }
        Ok(roots)
    }

    /// Authentication path for a previously inserted leaf, anchored to
    /// the current root.
    pub fn path(&self, index: u64) -> Result<MerklePath, MerkleError> {
        if index >= self.next_index {
            return Err(MerkleError::LeafIndexOutOfRange(index));
        }
        let mut elements = Vec::with_capacity(TREE_DEPTH);
        let mut indices = Vec::with_capacity(TREE_DEPTH);
        let mut position = usize::try_from(index).expect("depth-20 index fits usize");
        for level in 0..TREE_DEPTH {
            indices.push((position % 2) as u8);
            let sibling_position = if position % 2 == 0 {
                position + 1
            } else {
                position - 1
            };
            let sibling = if sibling_position < self.levels[level].len() {
                self.levels[level][sibling_position]
            } else {
                self.zeros[level]
            };
            elements.push(sibling);
            position /= 2;
        }
        Ok(MerklePath {
            root: self.current_root,
            elements,
            indices,
            leaf_index: index,
        })
    }

    /// Re-fold a leaf up its path and compare against the current root.
    pub fn verify(&self, leaf: Fr, path: &MerklePath) -> bool {
        Self::verify_against(leaf, path, self.current_root)
    }

    /// Re-fold a leaf up its path and compare against a supplied root.
    pub fn verify_against(leaf: Fr, path: &MerklePath, root: Fr) -> bool {
        if path.elements.len() != TREE_DEPTH || path.indices.len() != TREE_DEPTH {
            return false;
        }
        let mut current = leaf;
        for (sibling, bit) in path.elements.iter().zip(path.indices.iter()) {
            current = if *bit == 0 {
                poseidon2(current, *sibling)
            } else {
                poseidon2(*sibling, current)
            };
        }
        current == root
    }
}

#[cfg(test)]
mod tests {
    use zktoken_crypto::field::fr_from_biguint;

    use super::*;

    fn leaf(value: u64) -> Fr {
        Fr::from(value)
    }

    #[test]
    fn zero_table_matches_reference() {
        let tree = PoolTree::new();
        // Published reference values for the zero-seeded Poseidon tree.
        let expected_level_1 = num_bigint::BigUint::parse_bytes(
            b"14744269619966411208579211824598458697587494354926760081771325075741142829156",
            10,
        )
        .unwrap();
        let expected_level_2 = num_bigint::BigUint::parse_bytes(
            b"7423237065226347324353380772367382631490014989348495481811164164159255474657",
            10,
        )
        .unwrap();
        assert_eq!(tree.zeros()[0], Fr::zero());
        assert_eq!(tree.zeros()[1], fr_from_biguint(&expected_level_1));
        assert_eq!(tree.zeros()[2], fr_from_biguint(&expected_level_2));
    }

    #[test]
    fn same_sequence_same_root() {
        let mut a = PoolTree::new();
        let mut b = PoolTree::new();
        for value in 1..=8u64 {
            a.insert(leaf(value)).unwrap();
            b.insert(leaf(value)).unwrap();
        }
        assert_eq!(a.root(), b.root());
        assert_eq!(a.next_index(), 8);
    }

    #[test]
    fn extend_matches_single_inserts() {
        let mut a = PoolTree::new();
        let mut b = PoolTree::new();
        let roots = a.extend((1..=4u64).map(leaf)).unwrap();
        for value in 1..=4u64 {
            b.insert(leaf(value)).unwrap();
        }
        assert_eq!(roots.len(), 4);
        assert_eq!(*roots.last().unwrap(), b.root());
    }

    #[test]
    fn insertion_order_determines_root() {
        let mut a = PoolTree::new();
        let mut b = PoolTree::new();
        a.insert(leaf(1)).unwrap();
        a.insert(leaf(2)).unwrap();
        b.insert(leaf(2)).unwrap();
        b.insert(leaf(1)).unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn every_inserted_leaf_verifies() {
        let mut tree = PoolTree::new();
        let leaves: Vec<Fr> = (10..25u64).map(leaf).collect();
        for value in &leaves {
            tree.insert(*value).unwrap();
        }
        for (index, value) in leaves.iter().enumerate() {
            let path = tree.path(index as u64).unwrap();
            assert_eq!(path.leaf_index, index as u64);
            assert_eq!(path.elements.len(), TREE_DEPTH);
            assert!(tree.verify(*value, &path));
        }
    }

    #[test]
    fn path_indices_decompose_leaf_index() {
        let mut tree = PoolTree::new();
        for value in 0..6u64 {
            tree.insert(leaf(value + 100)).unwrap();
        }
        let path = tree.path(5).unwrap();
        // 5 = 0b101, LSB first.
        assert_eq!(&path.indices[..3], &[1, 0, 1]);
        assert!(path.indices[3..].iter().all(|bit| *bit == 0));
    }

    #[test]
    fn stale_root_fails_verification() {
        let mut tree = PoolTree::new();
        tree.insert(leaf(1)).unwrap();
        let root_after_first = tree.root();
        tree.insert(leaf(2)).unwrap();
        let path = tree.path(0).unwrap();
        // The fresh path anchors to the new root, not the stale one.
        assert!(tree.verify(leaf(1), &path));
        assert!(!PoolTree::verify_against(leaf(1), &path, root_after_first));
    }

    #[test]
    fn root_history_is_a_ring() {
        let mut tree = PoolTree::new();
        let (_, first_root) = tree.insert(leaf(1)).unwrap();
        assert!(tree.is_known_root(&first_root));
        // 30 further inserts evict the first root from the 30-slot ring.
        for value in 2..=31u64 {
            tree.insert(leaf(value)).unwrap();
        }
        assert!(!tree.is_known_root(&first_root));
        assert!(tree.is_known_root(&tree.root()));
        assert!(!tree.is_known_root(&Fr::zero()));
    }

    #[test]
    fn wrong_leaf_fails() {
        let mut tree = PoolTree::new();
        tree.insert(leaf(7)).unwrap();
        let path = tree.path(0).unwrap();
        assert!(!tree.verify(leaf(8), &path));
    }

    #[test]
    fn out_of_range_path_rejected() {
        let tree = PoolTree::new();
        assert_eq!(tree.path(0), Err(MerkleError::LeafIndexOutOfRange(0)));
    }
}
