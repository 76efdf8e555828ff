//! Message dispatch
//!
//! Processors declare the message kinds they handle; the dispatcher is a
//! fixed table from [`MessageKind`] to processors built once at startup.
//! Processors answer with the messages to send back to the peer.

use crate::consensus::block_rules::BlockRuleSet;
use crate::consensus::header_validator::{HeaderValidatorHandle, ValidatorError};
use crate::consensus::params::ConsensusParameters;
use crate::consensus::transaction_rules::check_transaction;
use crate::consensus::validation::ValidationState;
use crate::core::ChainState;
use crate::crypto::HashAlgorithm;
use crate::network::message::{Message, MessageKind, VersionMessage};
use crate::network::peer::PeerContext;
use crate::network::protocol::{MAX_HEADERS_RESULTS, MIN_PEER_PROTO_VERSION};
use crate::network::types::{NetworkAddress, NodeServices};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Processor errors; the connection is dropped on any of them
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Peer misbehaved: {0}")]
    Misbehavior(String),
    #[error("Validator error: {0}")]
    Validator(#[from] ValidatorError),
}

/// Handles some message kinds for every peer
pub trait MessageProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn interests(&self) -> &'static [MessageKind];

    fn process(&self, peer: &Arc<PeerContext>, message: &Message) -> Result<Vec<Message>, ProcessorError>;
}

/// Routes decoded messages to the processors registered for their kind
#[derive(Default)]
pub struct MessageDispatcher {
    routes: HashMap<MessageKind, Vec<Arc<dyn MessageProcessor>>>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn MessageProcessor>) {
        for kind in processor.interests() {
            self.routes.entry(*kind).or_default().push(processor.clone());
        }
    }

    pub fn handles(&self, kind: MessageKind) -> bool {
        self.routes.contains_key(&kind)
    }

    /// Run every interested processor, collecting their replies in order
    pub fn dispatch(&self, peer: &Arc<PeerContext>, message: &Message) -> Result<Vec<Message>, ProcessorError> {
        let Some(kind) = message.kind() else {
            log::debug!("Ignoring unknown command '{}' from {}", message.command(), peer);
            return Ok(Vec::new());
        };
        let Some(processors) = self.routes.get(&kind) else {
            log::trace!("No processor for '{}' from {}", kind.command(), peer);
            return Ok(Vec::new());
        };

        let mut replies = Vec::new();
        for processor in processors {
            replies.extend(processor.process(peer, message)?);
        }
        Ok(replies)
    }
}

// =============================================================================
// Handshake
// =============================================================================

/// What this node announces about itself in `version`
#[derive(Debug, Clone)]
pub struct LocalVersion {
    pub protocol_version: i32,
    pub services: NodeServices,
    pub user_agent: String,
    pub relay: bool,
    /// Random per node, to detect connections to ourselves
    pub nonce: u64,
}

impl LocalVersion {
    pub fn message(&self, receiver: NetworkAddress, start_height: i32) -> VersionMessage {
        VersionMessage::new(
            self.protocol_version,
            self.services,
            receiver,
            self.nonce,
            self.user_agent.clone(),
            start_height,
            self.relay,
        )
    }
}

/// Version negotiation, keep-alive and peer preferences
pub struct HandshakeProcessor {
    local: LocalVersion,
    chain_state: Arc<RwLock<ChainState>>,
}

impl HandshakeProcessor {
    pub fn new(local: LocalVersion, chain_state: Arc<RwLock<ChainState>>) -> Self {
        Self { local, chain_state }
    }

    fn start_height(&self) -> i32 {
        // Never wait on the validator's write lock from here
        self.chain_state
            .try_read()
            .map(|chain| chain.best_header().height as i32)
            .unwrap_or(0)
    }

    fn on_version(&self, peer: &PeerContext, version: &VersionMessage) -> Result<Vec<Message>, ProcessorError> {
        if version.nonce == self.local.nonce {
            return Err(ProcessorError::Misbehavior("connected to self".to_string()));
        }
        if version.version < MIN_PEER_PROTO_VERSION {
            return Err(ProcessorError::Misbehavior(format!(
                "obsolete protocol version {}",
                version.version
            )));
        }
        if peer.info().is_some() {
            return Err(ProcessorError::Misbehavior("duplicate version message".to_string()));
        }

        peer.record_version(version);
        peer.set_negotiated_version(version.version.min(self.local.protocol_version));
        log::info!(
            "Handshake with {}: version {}, agent {}, height {}",
            peer,
            version.version,
            version.user_agent,
            version.start_height
        );

        let mut replies = Vec::with_capacity(2);
        if !peer.outbound {
            let receiver = version.sender.clone();
            replies.push(Message::Version(self.local.message(receiver, self.start_height())));
        }
        replies.push(Message::Verack);
        Ok(replies)
    }
}

impl MessageProcessor for HandshakeProcessor {
    fn name(&self) -> &'static str {
        "handshake"
    }

    fn interests(&self) -> &'static [MessageKind] {
        &[
            MessageKind::Version,
            MessageKind::Verack,
            MessageKind::Ping,
            MessageKind::SendHeaders,
        ]
    }

    fn process(&self, peer: &Arc<PeerContext>, message: &Message) -> Result<Vec<Message>, ProcessorError> {
        match message {
            Message::Version(version) => self.on_version(peer, version),
            Message::Verack => {
                peer.mark_handshake_complete();
                log::debug!("Handshake complete with {}", peer);
                Ok(Vec::new())
            }
            Message::Ping(nonce) => Ok(vec![Message::Pong(*nonce)]),
            Message::SendHeaders => {
                peer.set_prefers_headers();
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }
}

// =============================================================================
// Headers
// =============================================================================

/// Hands received headers to the header validator
pub struct HeadersProcessor {
    validator: HeaderValidatorHandle,
}

impl HeadersProcessor {
    pub fn new(validator: HeaderValidatorHandle) -> Self {
        Self { validator }
    }
}

impl MessageProcessor for HeadersProcessor {
    fn name(&self) -> &'static str {
        "headers"
    }

    fn interests(&self) -> &'static [MessageKind] {
        &[MessageKind::Headers]
    }

    fn process(&self, peer: &Arc<PeerContext>, message: &Message) -> Result<Vec<Message>, ProcessorError> {
        let Message::Headers(headers) = message else {
            return Ok(Vec::new());
        };
        if headers.len() > MAX_HEADERS_RESULTS {
            return Err(ProcessorError::Misbehavior(format!(
                "{} headers in one message",
                headers.len()
            )));
        }

        log::debug!("Received {} headers from {}", headers.len(), peer);
        self.validator.request_validation(headers.clone(), peer.clone())?;
        Ok(Vec::new())
    }
}

// =============================================================================
// Blocks and transactions
// =============================================================================

/// Runs the context-free rules on relayed blocks and transactions.
///
/// A peer relaying anything that fails them is disconnected.
pub struct BlockProcessor {
    rules: BlockRuleSet,
    params: Arc<ConsensusParameters>,
    hasher: Arc<dyn HashAlgorithm>,
}

impl BlockProcessor {
    pub fn new(params: Arc<ConsensusParameters>, hasher: Arc<dyn HashAlgorithm>) -> Self {
        Self::with_rules(BlockRuleSet::default(), params, hasher)
    }

    pub fn with_rules(
        rules: BlockRuleSet,
        params: Arc<ConsensusParameters>,
        hasher: Arc<dyn HashAlgorithm>,
    ) -> Self {
        Self {
            rules,
            params,
            hasher,
        }
    }
}

impl MessageProcessor for BlockProcessor {
    fn name(&self) -> &'static str {
        "blocks"
    }

    fn interests(&self) -> &'static [MessageKind] {
        &[MessageKind::Block, MessageKind::Tx]
    }

    fn process(&self, peer: &Arc<PeerContext>, message: &Message) -> Result<Vec<Message>, ProcessorError> {
        match message {
            Message::Block(block) => {
                let state = self.rules.validate(block, &self.params, self.hasher.as_ref());
                if let ValidationState::Invalid(rejection) = state {
                    log::warn!("Block {} from {} rejected: {}", block.header.hash, peer, rejection);
                    return Err(ProcessorError::Misbehavior(format!(
                        "invalid block {}: {}",
                        block.header.hash, rejection
                    )));
                }
                log::debug!(
                    "Block {} from {} passed checks ({} transactions)",
                    block.header.hash,
                    peer,
                    block.tx_count()
                );
                Ok(Vec::new())
            }
            Message::Tx(tx) => {
                if let Err(rejection) = check_transaction(tx, &self.params) {
                    log::warn!("Transaction {} from {} rejected: {}", tx.hash, peer, rejection);
                    return Err(ProcessorError::Misbehavior(format!(
                        "invalid transaction {}: {}",
                        tx.hash, rejection
                    )));
                }
                log::trace!("Transaction {} from {} passed checks", tx.hash, peer);
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::header_validator::HeaderValidator;
    use crate::consensus::validation::reasons;
    use crate::core::{Block, BlockHeader, Transaction, TransactionInput, TransactionOutput, UInt256};
    use crate::crypto::{calculate_merkle_root, DoubleSha256};
    use crate::events::EventBus;
    use crate::network::protocol::PROTOCOL_VERSION;
    use bytes::Bytes;

    fn local() -> LocalVersion {
        LocalVersion {
            protocol_version: PROTOCOL_VERSION,
            services: NodeServices::NETWORK,
            user_agent: "/bitnode:test/".to_string(),
            relay: false,
            nonce: 1,
        }
    }

    fn chain_state() -> Arc<RwLock<ChainState>> {
        let params = ConsensusParameters::regtest();
        Arc::new(RwLock::new(ChainState::new(params.genesis_header)))
    }

    fn handshake() -> Arc<HandshakeProcessor> {
        Arc::new(HandshakeProcessor::new(local(), chain_state()))
    }

    fn remote_version(version: i32, nonce: u64) -> Message {
        Message::Version(VersionMessage::new(
            version,
            NodeServices::NETWORK,
            NetworkAddress::unspecified(),
            nonce,
            "/remote:1.0/".to_string(),
            10,
            true,
        ))
    }

    #[test]
    fn test_inbound_handshake() {
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register(handshake());
        let peer = Arc::new(PeerContext::new(1, "inbound", false));

        let replies = dispatcher.dispatch(&peer, &remote_version(70015, 2)).unwrap();
        assert_eq!(replies.len(), 2);
        assert!(matches!(&replies[0], Message::Version(v) if v.start_height == 0));
        assert_eq!(replies[1], Message::Verack);
        assert_eq!(peer.negotiated_version(), 70015);

        dispatcher.dispatch(&peer, &Message::Verack).unwrap();
        assert!(peer.is_handshake_complete());

        // A second version is a protocol violation
        assert!(dispatcher.dispatch(&peer, &remote_version(70015, 2)).is_err());
    }

    #[test]
    fn test_outbound_handshake_only_acks() {
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register(handshake());
        let peer = Arc::new(PeerContext::new(1, "outbound", true));

        let replies = dispatcher.dispatch(&peer, &remote_version(80000, 2)).unwrap();
        assert_eq!(replies, vec![Message::Verack]);
        assert_eq!(peer.negotiated_version(), PROTOCOL_VERSION);
    }

    #[test]
    fn test_rejects_self_and_obsolete_peers() {
        let processor = handshake();
        let peer = Arc::new(PeerContext::new(1, "peer", true));
        assert!(processor.process(&peer, &remote_version(70015, 1)).is_err());
        assert!(processor.process(&peer, &remote_version(300, 2)).is_err());
    }

    #[test]
    fn test_ping_and_unknown() {
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register(handshake());
        let peer = Arc::new(PeerContext::new(1, "peer", true));

        assert_eq!(
            dispatcher.dispatch(&peer, &Message::Ping(9)).unwrap(),
            vec![Message::Pong(9)]
        );
        let unknown = Message::Unknown {
            command: "mempool".to_string(),
            payload: Bytes::new(),
        };
        assert!(dispatcher.dispatch(&peer, &unknown).unwrap().is_empty());
        assert!(!dispatcher.handles(MessageKind::Inv));
    }

    #[tokio::test]
    async fn test_headers_are_enqueued() {
        let params = Arc::new(ConsensusParameters::regtest());
        let (validator, handle) = HeaderValidator::new(
            chain_state(),
            params.clone(),
            Arc::new(EventBus::new()),
        );
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register(Arc::new(HeadersProcessor::new(handle)));
        let peer = Arc::new(PeerContext::new(1, "peer", true));

        let headers = Message::Headers(vec![params.genesis_header.clone()]);
        assert!(dispatcher.dispatch(&peer, &headers).unwrap().is_empty());

        let too_many = Message::Headers(vec![params.genesis_header.clone(); MAX_HEADERS_RESULTS + 1]);
        assert!(matches!(
            dispatcher.dispatch(&peer, &too_many),
            Err(ProcessorError::Misbehavior(_))
        ));

        // Queue is closed once the consumer is gone
        drop(validator);
        assert!(matches!(
            dispatcher.dispatch(&peer, &headers),
            Err(ProcessorError::Validator(ValidatorError::QueueClosed))
        ));
    }

    fn coinbase_block() -> Block {
        let coinbase = Transaction::new(
            1,
            vec![TransactionInput::coinbase(vec![0x03, 0x01, 0x00])],
            vec![TransactionOutput::new(50 * 100_000_000, vec![0x51])],
            0,
            &DoubleSha256,
        );
        let root = calculate_merkle_root(&[coinbase.hash], &DoubleSha256);
        let header = BlockHeader::new(1, UInt256::ZERO, root, 0, 0x207fffff, 0, &DoubleSha256);
        Block::new(header, vec![coinbase])
    }

    fn block_dispatcher() -> MessageDispatcher {
        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register(Arc::new(BlockProcessor::new(
            Arc::new(ConsensusParameters::regtest()),
            Arc::new(DoubleSha256),
        )));
        dispatcher
    }

    #[test]
    fn test_valid_block_is_accepted() {
        let dispatcher = block_dispatcher();
        let peer = Arc::new(PeerContext::new(1, "peer", true));
        let block = Message::Block(coinbase_block());
        assert!(dispatcher.dispatch(&peer, &block).unwrap().is_empty());
    }

    #[test]
    fn test_block_with_bad_merkle_root_is_misbehavior() {
        let dispatcher = block_dispatcher();
        let peer = Arc::new(PeerContext::new(1, "peer", true));
        let mut block = coinbase_block();
        block.header.merkle_root = UInt256::from_u64(7);

        match dispatcher.dispatch(&peer, &Message::Block(block)) {
            Err(ProcessorError::Misbehavior(reason)) => {
                assert!(reason.contains(reasons::BAD_TXNMRKLROOT))
            }
            other => panic!("expected misbehavior, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_transaction_is_misbehavior() {
        let dispatcher = block_dispatcher();
        let peer = Arc::new(PeerContext::new(1, "peer", true));
        let empty = Transaction::new(1, vec![], vec![], 0, &DoubleSha256);

        match dispatcher.dispatch(&peer, &Message::Tx(empty)) {
            Err(ProcessorError::Misbehavior(reason)) => {
                assert!(reason.contains(reasons::BAD_TXNS_VIN_EMPTY))
            }
            other => panic!("expected misbehavior, got {:?}", other),
        }
        let valid = coinbase_block().transactions.remove(0);
        assert!(dispatcher.dispatch(&peer, &Message::Tx(valid)).unwrap().is_empty());
    }
}
