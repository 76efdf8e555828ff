//! Core blockchain components
//!
//! This module contains the fundamental building blocks:
//! - UInt256 hashes and targets
//! - Transactions (inputs, outputs, segwit witnesses)
//! - Blocks and block headers
//! - Chain state (the header index and best-header pointer)

pub mod block;
pub mod chain_state;
pub mod transaction;
pub mod uint256;

pub use block::{Block, BlockHeader, BlockLocator, BLOCK_HEADER_SIZE};
pub use chain_state::{ChainState, ChainStateError, HeaderNode, NodeId};
pub use transaction::{
    OutPoint, Transaction, TransactionInput, TransactionOutput, TransactionWitness,
    NULL_OUTPUT_INDEX, SEQUENCE_FINAL,
};
pub use uint256::{UInt256, UInt256Error, UINT256_SIZE};
