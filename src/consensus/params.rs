//! Consensus parameters and network definitions

use crate::core::{BlockHeader, UInt256};
use crate::crypto::DoubleSha256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Satoshis per coin
pub const COIN: i64 = 100_000_000;

/// Upper bound on any amount
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// Network the node participates in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// Frame magic identifying the network on the wire
    pub fn magic(self) -> [u8; 4] {
        match self {
            Network::Mainnet => [0xf9, 0xbe, 0xb4, 0xd9],
            Network::Testnet => [0x0b, 0x11, 0x09, 0x07],
            Network::Regtest => [0xfa, 0xbf, 0xb5, 0xda],
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Network::Mainnet => 8333,
            Network::Testnet => 18333,
            Network::Regtest => 18444,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        };
        f.write_str(name)
    }
}

/// Read-only consensus constants for one network
#[derive(Debug, Clone)]
pub struct ConsensusParameters {
    pub network: Network,
    pub genesis_header: BlockHeader,
    /// Maximum block weight in weight units
    pub max_block_weight: u64,
    pub witness_scale_factor: u64,
    pub max_money: i64,
    /// Easiest allowed proof-of-work target
    pub pow_limit: UInt256,
    /// Seconds a header timestamp may run ahead of the local clock
    pub max_future_block_time: i64,
    pub min_header_version: i32,
    /// Known-good header hashes by height
    pub checkpoints: BTreeMap<u32, UInt256>,
}

const GENESIS_MERKLE_ROOT: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

impl ConsensusParameters {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    pub fn mainnet() -> Self {
        let checkpoints = [
            (11_111, "0000000069e244f73d78e8fd29ba2fd2ed618bd6fa2ee92559f542fdb26e7c1d"),
            (33_333, "000000002dd5588a74784eaa7ab0507a18ad16a236e7b1ce69f00d7ddfb5d0a6"),
            (74_000, "0000000000573993a3c9e41ce34471c079dcf5f52a0e824a81e7f953b8661a20"),
        ];
        Self {
            checkpoints: checkpoints
                .into_iter()
                .map(|(height, hash)| (height, parse_hash(hash)))
                .collect(),
            ..Self::base(
                Network::Mainnet,
                genesis_header(1_231_006_505, 0x1d00ffff, 2_083_236_893),
                "00000000ffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
            )
        }
    }

    pub fn testnet() -> Self {
        Self::base(
            Network::Testnet,
            genesis_header(1_296_688_602, 0x1d00ffff, 414_098_458),
            "00000000ffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
    }

    pub fn regtest() -> Self {
        Self::base(
            Network::Regtest,
            genesis_header(1_296_688_602, 0x207fffff, 2),
            "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
    }

    fn base(network: Network, genesis_header: BlockHeader, pow_limit: &str) -> Self {
        Self {
            network,
            genesis_header,
            max_block_weight: 4_000_000,
            witness_scale_factor: 4,
            max_money: MAX_MONEY,
            pow_limit: parse_hash(pow_limit),
            max_future_block_time: 2 * 60 * 60,
            min_header_version: 1,
            checkpoints: BTreeMap::new(),
        }
    }

    pub fn genesis_hash(&self) -> UInt256 {
        self.genesis_header.hash
    }

    /// Largest serialized size without witness data
    pub fn max_block_base_size(&self) -> u64 {
        self.max_block_weight / self.witness_scale_factor
    }
}

fn genesis_header(timestamp: u32, bits: u32, nonce: u32) -> BlockHeader {
    BlockHeader::new(
        1,
        UInt256::ZERO,
        parse_hash(GENESIS_MERKLE_ROOT),
        timestamp,
        bits,
        nonce,
        &DoubleSha256,
    )
}

// Only used for the compile-time constants above
fn parse_hash(hex: &str) -> UInt256 {
    hex.parse().unwrap_or(UInt256::ZERO)
}
