//! Chain State Management
//!
//! In-memory index of validated headers. Nodes live in one arena owned by
//! [`ChainState`]; parent links are arena handles, so the index is
//! append-only and never holds dangling references. Only the best-header
//! pointer moves.

use crate::core::block::{BlockHeader, BlockLocator};
use crate::core::UInt256;
use std::collections::HashMap;
use thiserror::Error;

/// Number of most recent hashes included one by one in a block locator
const LOCATOR_DENSE_ENTRIES: usize = 10;

/// Chain state errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainStateError {
    #[error("Previous header {previous} of {hash} is not indexed")]
    MissingParent { hash: UInt256, previous: UInt256 },
}

/// Handle of a node in the header arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A validated header's position in the header tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderNode {
    pub id: NodeId,
    pub hash: UInt256,
    pub height: u32,
    /// Parent node; `None` only for genesis
    pub previous: Option<NodeId>,
}

/// Header tree with a best-header pointer
#[derive(Debug, Clone)]
pub struct ChainState {
    nodes: Vec<HeaderNode>,
    headers: Vec<BlockHeader>,
    by_hash: HashMap<UInt256, NodeId>,
    best_header: NodeId,
}

impl ChainState {
    /// Create an index containing only the genesis header
    pub fn new(genesis: BlockHeader) -> Self {
        let id = NodeId(0);
        let node = HeaderNode {
            id,
            hash: genesis.hash,
            height: 0,
            previous: None,
        };

        let mut by_hash = HashMap::new();
        by_hash.insert(genesis.hash, id);

        Self {
            nodes: vec![node],
            headers: vec![genesis],
            by_hash,
            best_header: id,
        }
    }

    /// Insert a header whose parent is already indexed.
    ///
    /// Idempotent: a known header returns its existing node and `false`.
    pub fn add_to_block_index(
        &mut self,
        header: &BlockHeader,
    ) -> Result<(HeaderNode, bool), ChainStateError> {
        if let Some(id) = self.by_hash.get(&header.hash) {
            return Ok((self.nodes[id.0], false));
        }

        let parent = self
            .get(&header.previous_block_hash)
            .copied()
            .ok_or(ChainStateError::MissingParent {
                hash: header.hash,
                previous: header.previous_block_hash,
            })?;

        let id = NodeId(self.nodes.len());
        let node = HeaderNode {
            id,
            hash: header.hash,
            height: parent.height + 1,
            previous: Some(parent.id),
        };

        self.nodes.push(node);
        self.headers.push(header.clone());
        self.by_hash.insert(header.hash, id);

        log::debug!("Indexed header {} at height {}", node.hash, node.height);
        Ok((node, true))
    }

    pub fn genesis(&self) -> &HeaderNode {
        &self.nodes[0]
    }

    pub fn best_header(&self) -> &HeaderNode {
        &self.nodes[self.best_header.0]
    }

    /// Move the best-header pointer; the policy belongs to the caller
    pub fn set_best_header(&mut self, id: NodeId) {
        self.best_header = id;
    }

    pub fn node(&self, id: NodeId) -> &HeaderNode {
        &self.nodes[id.0]
    }

    pub fn header(&self, id: NodeId) -> &BlockHeader {
        &self.headers[id.0]
    }

    pub fn get(&self, hash: &UInt256) -> Option<&HeaderNode> {
        self.by_hash.get(hash).map(|id| &self.nodes[id.0])
    }

    pub fn contains(&self, hash: &UInt256) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn previous(&self, node: &HeaderNode) -> Option<&HeaderNode> {
        node.previous.map(|id| self.node(id))
    }

    /// Ancestor of `node` at `height`, if `height` is not above it
    pub fn ancestor<'a>(&'a self, node: &'a HeaderNode, height: u32) -> Option<&'a HeaderNode> {
        if height > node.height {
            return None;
        }
        let mut current = node;
        while current.height > height {
            current = self.previous(current)?;
        }
        Some(current)
    }

    /// Locator of the best chain: the last ten hashes, then exponentially
    /// spaced ones, always ending at genesis
    pub fn block_locator(&self) -> BlockLocator {
        let mut hashes = Vec::new();
        let mut step = 1u32;
        let mut current = Some(self.best_header());

        while let Some(node) = current {
            hashes.push(node.hash);
            if node.height == 0 {
                break;
            }
            if hashes.len() >= LOCATOR_DENSE_ENTRIES {
                step = step.saturating_mul(2);
            }
            current = self.ancestor(node, node.height.saturating_sub(step));
        }

        BlockLocator { hashes }
    }

    /// Number of indexed headers
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DoubleSha256;

    fn child_of(parent: &BlockHeader, nonce: u32) -> BlockHeader {
        BlockHeader::new(
            1,
            parent.hash,
            UInt256::ZERO,
            parent.timestamp + 600,
            0x207fffff,
            nonce,
            &DoubleSha256,
        )
    }

    fn genesis() -> BlockHeader {
        BlockHeader::new(
            1,
            UInt256::ZERO,
            UInt256::ZERO,
            1_296_688_602,
            0x207fffff,
            2,
            &DoubleSha256,
        )
    }

    #[test]
    fn test_add_to_block_index_heights() {
        let genesis = genesis();
        let mut state = ChainState::new(genesis.clone());
        let first = child_of(&genesis, 1);
        let second = child_of(&first, 1);

        let (node1, new1) = state.add_to_block_index(&first).unwrap();
        let (node2, new2) = state.add_to_block_index(&second).unwrap();

        assert!(new1 && new2);
        assert_eq!(node1.height, 1);
        assert_eq!(node2.height, 2);
        assert_eq!(state.previous(&node2), Some(&node1));
        assert_eq!(state.header(node2.id), &second);
    }

    #[test]
    fn test_add_is_idempotent() {
        let genesis = genesis();
        let mut state = ChainState::new(genesis.clone());
        let header = child_of(&genesis, 1);

        let (first, is_new) = state.add_to_block_index(&header).unwrap();
        let (again, is_new_again) = state.add_to_block_index(&header).unwrap();

        assert!(is_new);
        assert!(!is_new_again);
        assert_eq!(first, again);
        assert_eq!(state.len(), 2);

        let (genesis_node, genesis_new) = state.add_to_block_index(&genesis).unwrap();
        assert!(!genesis_new);
        assert_eq!(genesis_node.height, 0);
    }

    #[test]
    fn test_missing_parent() {
        let mut state = ChainState::new(genesis());
        let orphan = BlockHeader::new(
            1,
            UInt256::from_u64(99),
            UInt256::ZERO,
            0,
            0x207fffff,
            0,
            &DoubleSha256,
        );
        assert!(matches!(
            state.add_to_block_index(&orphan),
            Err(ChainStateError::MissingParent { .. })
        ));
    }

    #[test]
    fn test_ancestor() {
        let genesis = genesis();
        let mut state = ChainState::new(genesis.clone());
        let mut headers = vec![genesis.clone()];
        for _ in 0..5 {
            let next = child_of(headers.last().unwrap(), 0);
            headers.push(next);
        }
        let mut tip = *state.genesis();
        for header in &headers[1..] {
            tip = state.add_to_block_index(header).unwrap().0;
        }

        // `tip` is a copy owned by the test, not a node borrowed from the index
        assert_eq!(state.ancestor(&tip, tip.height), Some(&tip));
        assert_eq!(state.ancestor(&tip, 2).map(|node| node.hash), Some(headers[2].hash));
        assert_eq!(state.ancestor(&tip, 0), Some(state.genesis()));
        assert_eq!(state.ancestor(&tip, 6), None);
    }

    #[test]
    fn test_block_locator_shape() {
        let genesis = genesis();
        let mut state = ChainState::new(genesis.clone());
        let mut tip = genesis.clone();
        for _ in 0..30 {
            tip = child_of(&tip, 0);
            let (node, _) = state.add_to_block_index(&tip).unwrap();
            state.set_best_header(node.id);
        }

        let locator = state.block_locator();
        assert_eq!(locator.hashes[0], tip.hash);
        assert_eq!(*locator.hashes.last().unwrap(), genesis.hash);
        // 10 dense entries (30..21), then 19, 15, 7, genesis
        assert_eq!(locator.hashes.len(), 14);
    }
}
