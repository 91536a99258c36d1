//! Merkle tree over transaction encodings.
//!
//! Leaves are SHA-256 of each transaction's serialization; internal nodes
//! hash the concatenation of their children. A level with odd cardinality
//! duplicates its last node before pairing.

use super::{sha256, Hash};

/// Compute the merkle root of a list of serialized transactions.
///
/// A single-leaf tree's root is the leaf itself; an empty list yields the
/// zero hash (blocks always carry at least a coinbase, so this is only a
/// degenerate-input guard).
pub fn merkle_root(tx_bytes: &[Vec<u8>]) -> Hash {
    if tx_bytes.is_empty() {
        return Hash::zero();
    }

    let mut level: Vec<Hash> = tx_bytes.iter().map(|bytes| sha256(bytes)).collect();

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().expect("level is non-empty"));
        }

        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut data = Vec::with_capacity(64);
            data.extend_from_slice(&pair[0].0);
            data.extend_from_slice(&pair[1].0);
            next.push(sha256(&data));
        }

        level = next;
    }

    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_leaves(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("tx-{}", i).into_bytes()).collect()
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(merkle_root(&[]), Hash::zero());
    }

    #[test]
    fn test_single_leaf_is_leaf_hash() {
        let leaves = make_leaves(1);
        assert_eq!(merkle_root(&leaves), sha256(&leaves[0]));
    }

    #[test]
    fn test_two_leaves() {
        let leaves = make_leaves(2);
        let left = sha256(&leaves[0]);
        let right = sha256(&leaves[1]);

        let mut data = Vec::new();
        data.extend_from_slice(&left.0);
        data.extend_from_slice(&right.0);

        assert_eq!(merkle_root(&leaves), sha256(&data));
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        // A three-leaf tree must equal the four-leaf tree with the last
        // leaf repeated.
        let three = make_leaves(3);
        let mut four = three.clone();
        four.push(three[2].clone());

        assert_eq!(merkle_root(&three), merkle_root(&four));
    }

    #[test]
    fn test_deterministic() {
        let leaves = make_leaves(9);
        assert_eq!(merkle_root(&leaves), merkle_root(&leaves));
    }

    #[test]
    fn test_order_matters() {
        let leaves = make_leaves(4);
        let mut reversed = leaves.clone();
        reversed.reverse();
        assert_ne!(merkle_root(&leaves), merkle_root(&reversed));
    }

    #[test]
    fn test_content_matters() {
        let leaves = make_leaves(4);
        let mut tampered = leaves.clone();
        tampered[2][0] ^= 0x01;
        assert_ne!(merkle_root(&leaves), merkle_root(&tampered));
    }
}
