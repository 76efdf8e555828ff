//! Merkle tree calculation over transaction hashes
//!
//! Odd levels duplicate their last hash, which is what makes the
//! CVE-2012-2459 duplicate-subtree malleation possible in the first place.

use super::hash::HashAlgorithm;
use crate::core::UInt256;

/// Calculate the merkle root from a list of transaction hashes
pub fn calculate_merkle_root(hashes: &[UInt256], hasher: &dyn HashAlgorithm) -> UInt256 {
    if hashes.is_empty() {
        return UInt256::ZERO;
    }

    let mut current_level: Vec<UInt256> = hashes.to_vec();

    while current_level.len() > 1 {
        let next_level = current_level
            .chunks(2)
            .map(|chunk| match chunk {
                [left, right] => hasher.digest_pair(left, right),
                [single] => hasher.digest_pair(single, single),
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect();
        current_level = next_level;
    }

    current_level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::DoubleSha256;

    fn leaf(n: u8) -> UInt256 {
        DoubleSha256.digest(&[n])
    }

    #[test]
    fn test_merkle_root_single() {
        let hashes = vec![leaf(1)];
        assert_eq!(calculate_merkle_root(&hashes, &DoubleSha256), hashes[0]);
    }

    #[test]
    fn test_merkle_root_two() {
        let hashes = vec![leaf(1), leaf(2)];
        let root = calculate_merkle_root(&hashes, &DoubleSha256);
        assert_eq!(root, DoubleSha256.digest_pair(&hashes[0], &hashes[1]));
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        // The reason duplicate detection must run before the root comparison
        let three = vec![leaf(1), leaf(2), leaf(3)];
        let four = vec![leaf(1), leaf(2), leaf(3), leaf(3)];
        assert_eq!(
            calculate_merkle_root(&three, &DoubleSha256),
            calculate_merkle_root(&four, &DoubleSha256)
        );
    }

    #[test]
    fn test_empty_merkle_root() {
        assert_eq!(calculate_merkle_root(&[], &DoubleSha256), UInt256::ZERO);
    }
}
