//! Block and block header data model
//!
//! A block contains an 80-byte header and a list of transactions.

use crate::core::transaction::Transaction;
use crate::core::UInt256;
use crate::crypto::{calculate_merkle_root, HashAlgorithm};
use crate::encoding::{ProtocolType, SerializationContext};

/// Block header size in bytes, without the transaction count
pub const BLOCK_HEADER_SIZE: usize = 80;

/// Block header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub previous_block_hash: UInt256,
    pub merkle_root: UInt256,
    pub timestamp: u32,
    /// Compact difficulty target
    pub bits: u32,
    pub nonce: u32,
    /// Only meaningful in `headers` messages, where it is always zero
    pub transaction_count: u64,
    /// Cached header hash; never serialized
    pub hash: UInt256,
}

impl BlockHeader {
    /// Create a header and compute its hash
    pub fn new(
        version: i32,
        previous_block_hash: UInt256,
        merkle_root: UInt256,
        timestamp: u32,
        bits: u32,
        nonce: u32,
        hasher: &dyn HashAlgorithm,
    ) -> Self {
        let mut header = Self {
            version,
            previous_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
            transaction_count: 0,
            hash: UInt256::ZERO,
        };
        header.rehash(hasher);
        header
    }

    /// Hash of the 80-byte header
    pub fn compute_hash(&self, hasher: &dyn HashAlgorithm) -> UInt256 {
        let ctx = SerializationContext::new(0).header_in_block();
        hasher.digest(&self.to_bytes(&ctx))
    }

    /// Recompute the cached hash, e.g. after changing the nonce
    pub fn rehash(&mut self, hasher: &dyn HashAlgorithm) {
        self.hash = self.compute_hash(hasher);
    }
}

/// Sparse list of header hashes, newest first, describing a chain to a
/// peer so it can find the fork point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockLocator {
    pub hashes: Vec<UInt256>,
}

/// A block in the blockchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// Hashes (txids) of all transactions, in block order
    pub fn transaction_hashes(&self) -> Vec<UInt256> {
        self.transactions.iter().map(|tx| tx.hash).collect()
    }

    /// Merkle root of the transactions as they currently are
    pub fn compute_merkle_root(&self, hasher: &dyn HashAlgorithm) -> UInt256 {
        calculate_merkle_root(&self.transaction_hashes(), hasher)
    }

    /// Recompute header and transaction hashes
    pub fn rehash(&mut self, hasher: &dyn HashAlgorithm) {
        self.header.rehash(hasher);
        for tx in &mut self.transactions {
            tx.rehash(hasher);
        }
    }

    /// Serialized size excluding witness data
    pub fn size_without_witness(&self) -> usize {
        self.serialized_size(&SerializationContext::new(0).with_witness(false))
    }

    /// Get the coinbase transaction (first transaction)
    pub fn coinbase_tx(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DoubleSha256;

    #[test]
    fn test_bitcoin_genesis_hash() {
        let header = BlockHeader::new(
            1,
            UInt256::ZERO,
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
                .parse()
                .unwrap(),
            1_231_006_505,
            0x1d00ffff,
            2_083_236_893,
            &DoubleSha256,
        );
        assert_eq!(
            header.hash.to_string(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
    }

    #[test]
    fn test_header_hash_changes_with_nonce() {
        let mut header = BlockHeader::new(
            1,
            UInt256::ZERO,
            UInt256::ZERO,
            0,
            0x207fffff,
            0,
            &DoubleSha256,
        );
        let before = header.hash;
        header.nonce += 1;
        header.rehash(&DoubleSha256);
        assert_ne!(before, header.hash);
    }
}
