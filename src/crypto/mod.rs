//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256 / double SHA-256 hashing
//! - The pluggable digest used for hashes and message checksums
//! - Merkle root calculation

pub mod hash;
pub mod merkle;

pub use hash::{double_sha256, sha256, DoubleSha256, HashAlgorithm, CHECKSUM_SIZE};
pub use merkle::calculate_merkle_root;
