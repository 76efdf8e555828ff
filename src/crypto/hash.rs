//! Cryptographic hashing utilities
//!
//! Provides the SHA-256 based digests used for block hashes, transaction
//! IDs, merkle trees and wire-message checksums.

use crate::core::UInt256;
use sha2::{Digest, Sha256};

/// Number of digest bytes carried in a wire-message checksum
pub const CHECKSUM_SIZE: usize = 4;

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Digest used for hashes and checksums.
///
/// The node only ever runs with [`DoubleSha256`], but networks built on
/// other digests plug in here.
pub trait HashAlgorithm: Send + Sync {
    /// Full 256-bit digest
    fn digest(&self, data: &[u8]) -> UInt256;

    /// Digest of the concatenation of two 256-bit values (merkle node)
    fn digest_pair(&self, left: &UInt256, right: &UInt256) -> UInt256 {
        let mut data = [0u8; 64];
        data[..32].copy_from_slice(&left.to_bytes());
        data[32..].copy_from_slice(&right.to_bytes());
        self.digest(&data)
    }

    /// First four bytes of the digest, as used in message headers
    fn checksum(&self, data: &[u8]) -> [u8; CHECKSUM_SIZE] {
        let digest = self.digest(data).to_bytes();
        let mut checksum = [0u8; CHECKSUM_SIZE];
        checksum.copy_from_slice(&digest[..CHECKSUM_SIZE]);
        checksum
    }
}

/// Bitcoin's double SHA-256
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleSha256;

impl HashAlgorithm for DoubleSha256 {
    fn digest(&self, data: &[u8]) -> UInt256 {
        UInt256::from_bytes(double_sha256(data))
    }
}
