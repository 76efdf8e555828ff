//! Transaction data model
//!
//! Bitcoin-style transactions: inputs spend previous outputs referenced by
//! [`OutPoint`], outputs lock value to a public-key script, and inputs may
//! carry a segwit witness stack.

use crate::core::UInt256;
use crate::crypto::HashAlgorithm;
use crate::encoding::{ProtocolType, SerializationContext};

// =============================================================================
// Constants
// =============================================================================

/// Sequence number that disables locktime
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Output index used by the null outpoint
pub const NULL_OUTPUT_INDEX: u32 = 0xFFFF_FFFF;

// =============================================================================
// OutPoint
// =============================================================================

/// Reference to an output of a previous transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub hash: UInt256,
    pub index: u32,
}

impl OutPoint {
    /// Marks coinbase inputs
    pub const NULL: OutPoint = OutPoint {
        hash: UInt256::ZERO,
        index: NULL_OUTPUT_INDEX,
    };

    pub fn new(hash: UInt256, index: u32) -> Self {
        Self { hash, index }
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

// =============================================================================
// Witness
// =============================================================================

/// Segwit witness stack of one input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionWitness {
    /// Opaque stack items
    pub components: Vec<Vec<u8>>,
}

impl TransactionWitness {
    pub fn new(components: Vec<Vec<u8>>) -> Self {
        Self { components }
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

// =============================================================================
// Inputs / Outputs
// =============================================================================

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInput {
    pub previous_output: OutPoint,
    pub signature_script: Vec<u8>,
    pub sequence: u32,
    pub script_witness: TransactionWitness,
}

impl TransactionInput {
    pub fn new(previous_output: OutPoint, signature_script: Vec<u8>) -> Self {
        Self {
            previous_output,
            signature_script,
            sequence: SEQUENCE_FINAL,
            script_witness: TransactionWitness::default(),
        }
    }

    /// Coinbase input carrying arbitrary script data
    pub fn coinbase(signature_script: Vec<u8>) -> Self {
        Self::new(OutPoint::NULL, signature_script)
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutput {
    /// Amount in the smallest unit; validated against the money range
    pub value: i64,
    pub public_key_script: Vec<u8>,
}

impl TransactionOutput {
    pub fn new(value: i64, public_key_script: Vec<u8>) -> Self {
        Self {
            value,
            public_key_script,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A transaction with cached hashes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
    /// Hash of the serialization without witness data (txid)
    pub hash: UInt256,
    /// Hash of the serialization with witness data (wtxid)
    pub witness_hash: UInt256,
}

impl Transaction {
    /// Create a transaction and compute its hashes
    pub fn new(
        version: i32,
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
        lock_time: u32,
        hasher: &dyn HashAlgorithm,
    ) -> Self {
        let mut tx = Self {
            version,
            inputs,
            outputs,
            lock_time,
            hash: UInt256::ZERO,
            witness_hash: UInt256::ZERO,
        };
        tx.rehash(hasher);
        tx
    }

    /// A coinbase has exactly one input spending the null outpoint
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.script_witness.is_empty())
    }

    /// Recompute the cached hashes from the current contents
    pub fn rehash(&mut self, hasher: &dyn HashAlgorithm) {
        let legacy = SerializationContext::new(0).with_witness(false);
        self.hash = hasher.digest(&self.to_bytes(&legacy));
        self.witness_hash = if self.has_witness() {
            hasher.digest(&self.to_bytes(&SerializationContext::new(0)))
        } else {
            self.hash
        };
    }

    /// Serialized size excluding witness data
    pub fn size_without_witness(&self) -> usize {
        self.serialized_size(&SerializationContext::new(0).with_witness(false))
    }

    pub fn total_output(&self) -> Option<i64> {
        self.outputs
            .iter()
            .try_fold(0i64, |total, output| total.checked_add(output.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DoubleSha256;

    #[test]
    fn test_coinbase_detection() {
        let coinbase = Transaction::new(
            1,
            vec![TransactionInput::coinbase(vec![0x51, 0x51])],
            vec![TransactionOutput::new(50, vec![])],
            0,
            &DoubleSha256,
        );
        assert!(coinbase.is_coinbase());

        let spend = Transaction::new(
            1,
            vec![TransactionInput::new(OutPoint::new(coinbase.hash, 0), vec![])],
            vec![TransactionOutput::new(50, vec![])],
            0,
            &DoubleSha256,
        );
        assert!(!spend.is_coinbase());
    }

    #[test]
    fn test_witness_hash_differs_only_with_witness() {
        let mut input = TransactionInput::new(OutPoint::new(UInt256::from_u64(1), 0), vec![]);
        let plain = Transaction::new(1, vec![input.clone()], vec![], 0, &DoubleSha256);
        assert!(!plain.has_witness());
        assert_eq!(plain.hash, plain.witness_hash);

        input.script_witness = TransactionWitness::new(vec![vec![0x30, 0x44]]);
        let segwit = Transaction::new(1, vec![input], vec![], 0, &DoubleSha256);
        assert!(segwit.has_witness());
        assert_eq!(segwit.hash, plain.hash);
        assert_ne!(segwit.hash, segwit.witness_hash);
    }

    #[test]
    fn test_total_output_overflow() {
        let tx = Transaction::new(
            1,
            vec![],
            vec![
                TransactionOutput::new(i64::MAX, vec![]),
                TransactionOutput::new(1, vec![]),
            ],
            0,
            &DoubleSha256,
        );
        assert_eq!(tx.total_output(), None);
    }
}
