//! Merkle combination of ordered child checksums
//!
//! [`ChecksumMerkleTree`] is a thin wrapper around `rs_merkle` used to combine
//! the checksums of a node's children (documents of a project, projects of a
//! snapshot) into one value, and to prove that a pulled child belongs to an
//! advertised parent.

use crate::checksum::Checksum;
use rs_merkle::{Hasher, MerkleTree as RsMerkleTree};

/// Merkle tree over child checksums, in caller-supplied order
pub struct ChecksumMerkleTree {
    inner: RsMerkleTree<Blake3Hasher>,
}

impl std::fmt::Debug for ChecksumMerkleTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumMerkleTree")
            .field("leaf_count", &self.leaf_count())
            .field("root", &self.root())
            .finish()
    }
}

impl ChecksumMerkleTree {
    /// Build from ordered child checksums
    #[must_use]
    pub fn from_leaves(leaves: &[Checksum]) -> Self {
        let leaves: Vec<_> = leaves.iter().map(|c| *c.as_bytes()).collect();
        Self {
            inner: RsMerkleTree::from_leaves(&leaves),
        }
    }

    /// Root of an ordered sequence without keeping the tree around
    #[must_use]
    pub fn root_of<I>(leaves: I) -> Checksum
    where
        I: IntoIterator<Item = Checksum>,
    {
        let leaves: Vec<Checksum> = leaves.into_iter().collect();
        Self::from_leaves(&leaves).root()
    }

    /// Root checksum. Zero for an empty tree.
    #[inline]
    #[must_use]
    pub fn root(&self) -> Checksum {
        self.inner.root().map_or_else(Checksum::default, Checksum::new)
    }

    /// Number of leaves
    #[inline]
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.inner.leaves().map_or(0, |leaves| leaves.len())
    }

    /// Whether the tree has no leaves
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    /// Inclusion proof for the leaf at `leaf_index`
    ///
    /// Returns `None` when the index is out of range.
    #[must_use]
    pub fn proof(&self, leaf_index: usize) -> Option<InclusionProof> {
        if leaf_index >= self.leaf_count() {
            return None;
        }
        Some(InclusionProof {
            inner: self.inner.proof(&[leaf_index]),
            leaf_index,
            total_leaves: self.leaf_count(),
        })
    }
}

/// Proof that a child checksum sits at a given position under a root
pub struct InclusionProof {
    inner: rs_merkle::MerkleProof<Blake3Hasher>,
    leaf_index: usize,
    total_leaves: usize,
}

impl std::fmt::Debug for InclusionProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InclusionProof")
            .field("leaf_index", &self.leaf_index)
            .field("total_leaves", &self.total_leaves)
            .finish_non_exhaustive()
    }
}

impl InclusionProof {
    /// Position of the proven leaf
    #[inline]
    #[must_use]
    pub fn leaf_index(&self) -> usize {
        self.leaf_index
    }

    /// Check that `leaf` is included under `root`
    #[must_use]
    pub fn verify(&self, leaf: Checksum, root: Checksum) -> bool {
        self.inner.verify(
            *root.as_bytes(),
            &[self.leaf_index],
            &[*leaf.as_bytes()],
            self.total_leaves,
        )
    }
}

/// BLAKE3 adapter for `rs_merkle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    type Hash = [u8; 32];

    #[inline]
    fn hash(data: &[u8]) -> Self::Hash {
        *blake3::hash(data).as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Checksum> {
        (0..n)
            .map(|i| Checksum::compute(i.to_string().as_bytes()))
            .collect()
    }

    #[test]
    fn empty_tree_has_zero_root() {
        let tree = ChecksumMerkleTree::from_leaves(&[]);
        assert!(tree.is_empty());
        assert!(tree.root().is_zero());
    }

    #[test]
    fn root_is_order_sensitive() {
        let mut forward = leaves(4);
        let a = ChecksumMerkleTree::root_of(forward.clone());
        forward.swap(0, 3);
        let b = ChecksumMerkleTree::root_of(forward);
        assert_ne!(a, b);
    }

    #[test]
    fn root_changes_when_one_leaf_changes() {
        let mut children = leaves(5);
        let before = ChecksumMerkleTree::root_of(children.clone());
        children[2] = Checksum::compute(b"edited");
        assert_ne!(before, ChecksumMerkleTree::root_of(children));
    }

    #[test]
    fn proof_verifies_pulled_child() {
        let children = leaves(8);
        let tree = ChecksumMerkleTree::from_leaves(&children);
        let proof = tree.proof(3).unwrap();
        assert!(proof.verify(children[3], tree.root()));
        assert!(!proof.verify(children[4], tree.root()));
    }

    #[test]
    fn proof_out_of_range_is_none() {
        let tree = ChecksumMerkleTree::from_leaves(&leaves(2));
        assert!(tree.proof(2).is_none());
    }
}
