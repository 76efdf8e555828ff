//! bitnode: protocol and header-consensus core for a Bitcoin-like P2P node
//!
//! This crate provides:
//! - 256-bit hash arithmetic and compact difficulty targets
//! - CompactSize integers and the protocol type serializers
//! - An incremental, checksummed wire message framer
//! - Context-free block and transaction rules
//! - A header validator feeding an in-memory header index
//!
//! # Example
//!
//! ```rust
//! use bitnode::consensus::ConsensusParameters;
//! use bitnode::core::ChainState;
//!
//! let params = ConsensusParameters::regtest();
//! let chain = ChainState::new(params.genesis_header.clone());
//! assert_eq!(chain.best_header().height, 0);
//! assert_eq!(chain.best_header().hash, params.genesis_hash());
//! ```

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod crypto;
pub mod encoding;
pub mod events;
pub mod network;

// Re-export commonly used types
pub use config::NodeConfig;
pub use consensus::{ConsensusParameters, HeaderValidator, Network};
pub use core::{Block, BlockHeader, ChainState, Transaction, UInt256};
pub use events::{ChainEvent, EventBus};
pub use network::{Message, MessageCodec, Node};
