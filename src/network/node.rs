//! Node wiring
//!
//! Owns the shared chain state, the event bus, the header validator and
//! the message dispatcher, and hands out per-peer codecs. Transport is up
//! to the caller: any duplex stream can be attached with
//! [`Node::handle_stream`].

use crate::config::NodeConfig;
use crate::consensus::header_validator::{HeaderValidator, ShutdownOnFatal};
use crate::consensus::params::ConsensusParameters;
use crate::core::{ChainState, UInt256};
use crate::crypto::{DoubleSha256, HashAlgorithm};
use crate::events::EventBus;
use crate::network::codec::MessageCodec;
use crate::network::connection::{run_connection, ConnectionError};
use crate::network::message::Message;
use crate::network::peer::PeerContext;
use crate::network::processor::{
    BlockProcessor, HandshakeProcessor, HeadersProcessor, LocalVersion, MessageDispatcher,
};
use crate::network::types::NetworkAddress;
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

/// Node status information
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub network: String,
    pub best_height: u32,
    pub best_hash: UInt256,
    pub indexed_headers: usize,
    /// Set once the validator has failed
    pub failure: Option<String>,
}

/// What a replay fed through the node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub messages: usize,
    pub header_batches: usize,
}

/// The protocol node
pub struct Node {
    pub config: NodeConfig,
    pub params: Arc<ConsensusParameters>,
    pub chain_state: Arc<RwLock<ChainState>>,
    pub events: Arc<EventBus>,
    dispatcher: Arc<MessageDispatcher>,
    hasher: Arc<dyn HashAlgorithm>,
    local: LocalVersion,
    validator: Option<HeaderValidator>,
    validator_task: Option<JoinHandle<()>>,
    fatal: Arc<ShutdownOnFatal>,
    shutdown: CancellationToken,
    next_peer_id: AtomicU64,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        let params = ConsensusParameters::for_network(config.network);
        Self::with_params(config, params)
    }

    pub fn with_params(config: NodeConfig, params: ConsensusParameters) -> Self {
        let params = Arc::new(params);
        let chain_state = Arc::new(RwLock::new(ChainState::new(params.genesis_header.clone())));
        let events = Arc::new(EventBus::new());
        let (validator, handle) =
            HeaderValidator::new(chain_state.clone(), params.clone(), events.clone());

        let local = LocalVersion {
            protocol_version: config.protocol_version,
            services: config.services(),
            user_agent: config.user_agent.clone(),
            relay: config.relay,
            nonce: rand::random(),
        };

        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register(Arc::new(HandshakeProcessor::new(
            local.clone(),
            chain_state.clone(),
        )));
        dispatcher.register(Arc::new(HeadersProcessor::new(handle)));
        let hasher: Arc<dyn HashAlgorithm> = Arc::new(DoubleSha256);
        dispatcher.register(Arc::new(BlockProcessor::new(params.clone(), hasher.clone())));

        let shutdown = CancellationToken::new();
        log::info!(
            "Node created for {} with genesis {}",
            params.network,
            params.genesis_hash()
        );

        Self {
            config,
            params,
            chain_state,
            events,
            dispatcher: Arc::new(dispatcher),
            hasher,
            local,
            validator: Some(validator),
            validator_task: None,
            fatal: Arc::new(ShutdownOnFatal::new(shutdown.clone())),
            shutdown,
            next_peer_id: AtomicU64::new(1),
        }
    }

    /// Start the header validator; must be called from within a runtime
    pub fn start(&mut self) {
        if let Some(validator) = self.validator.take() {
            self.validator_task = Some(validator.spawn(self.shutdown.clone(), self.fatal.clone()));
        }
    }

    pub fn new_peer(&self, remote: &str, outbound: bool) -> Arc<PeerContext> {
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(PeerContext::new(id, remote, outbound))
    }

    /// Framer for a peer on this node's network
    pub fn codec(&self, peer: Arc<PeerContext>) -> MessageCodec {
        MessageCodec::new(self.params.network.magic(), self.hasher.clone(), peer)
            .with_max_payload_size(self.config.max_message_size)
    }

    pub fn version_message(&self, receiver: NetworkAddress) -> Message {
        let start_height = self
            .chain_state
            .try_read()
            .map(|chain| chain.best_header().height as i32)
            .unwrap_or(0);
        Message::Version(self.local.message(receiver, start_height))
    }

    /// Serve a peer over `stream` until it disconnects or the node stops
    pub async fn handle_stream<S>(
        &self,
        stream: S,
        remote: &str,
        outbound: bool,
    ) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer = self.new_peer(remote, outbound);
        log::info!("Connected to {} ({})", peer, if outbound { "outbound" } else { "inbound" });

        let greeting = outbound.then(|| self.version_message(NetworkAddress::unspecified()));
        run_connection(
            stream,
            self.codec(peer),
            self.dispatcher.clone(),
            greeting,
            self.shutdown.child_token(),
        )
        .await
    }

    /// Feed captured wire frames through the framer and dispatcher.
    ///
    /// The capture is treated as an already handshaked peer; replies are
    /// dropped.
    pub async fn replay<R>(&self, reader: R, source: &str) -> Result<ReplaySummary, ConnectionError>
    where
        R: AsyncRead + Unpin,
    {
        let peer = self.new_peer(source, false);
        peer.set_negotiated_version(self.config.protocol_version);
        peer.mark_handshake_complete();

        let mut frames = FramedRead::new(reader, self.codec(peer.clone()));
        let mut summary = ReplaySummary::default();
        while let Some(message) = frames.next().await {
            let message = message?;
            summary.messages += 1;
            if matches!(message, Message::Headers(_)) {
                summary.header_batches += 1;
            }
            self.dispatcher.dispatch(&peer, &message)?;
        }

        log::info!(
            "Replayed {} messages from {} ({} bytes wasted)",
            summary.messages,
            source,
            peer.metrics.wasted()
        );
        Ok(summary)
    }

    pub async fn status(&self) -> NodeStatus {
        let chain = self.chain_state.read().await;
        let best = chain.best_header();
        NodeStatus {
            network: self.params.network.to_string(),
            best_height: best.height,
            best_hash: best.hash,
            indexed_headers: chain.len(),
            failure: self.fatal.failure(),
        }
    }

    /// Token cancelled when the node stops, including after a fatal error
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the validator and every connection
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.validator_task.take() {
            if let Err(e) = task.await {
                log::error!("Validator supervisor failed: {}", e);
            }
        }
        log::info!("Node stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::params::Network;
    use crate::events::ChainEvent;
    use crate::core::{Block, BlockHeader, Transaction, TransactionInput, TransactionOutput};
    use crate::network::processor::ProcessorError;
    use crate::network::protocol::PROTOCOL_VERSION;
    use crate::network::types::NodeServices;
    use bytes::BytesMut;
    use futures::sink::SinkExt;
    use tokio::io::duplex;
    use tokio_util::codec::{Encoder, Framed};

    fn regtest_node() -> Node {
        Node::new(NodeConfig {
            network: Network::Regtest,
            ..Default::default()
        })
    }

    fn mined_child(parent: &BlockHeader) -> BlockHeader {
        let mut header = BlockHeader::new(
            1,
            parent.hash,
            UInt256::ZERO,
            parent.timestamp + 600,
            parent.bits,
            0,
            &DoubleSha256,
        );
        let target = UInt256::from_compact(header.bits).unwrap();
        while header.hash > target {
            header.nonce += 1;
            header.rehash(&DoubleSha256);
        }
        header
    }

    fn remote_version() -> Message {
        let remote = LocalVersion {
            protocol_version: PROTOCOL_VERSION,
            services: NodeServices::NETWORK,
            user_agent: "/remote:1.0/".to_string(),
            relay: true,
            nonce: 77,
        };
        Message::Version(remote.message(NetworkAddress::unspecified(), 0))
    }

    #[tokio::test]
    async fn test_headers_from_peer_reach_chain_state() {
        let mut node = regtest_node();
        node.start();
        let mut events = node.events.subscribe();
        let header = mined_child(&node.params.genesis_header);

        let (local_end, remote_end) = duplex(64 * 1024);
        let remote_peer = Arc::new(PeerContext::new(99, "node", true));
        let codec = MessageCodec::new(Network::Regtest.magic(), Arc::new(DoubleSha256), remote_peer);
        let remote = async {
            let mut framed = Framed::new(remote_end, codec);
            framed.send(remote_version()).await.unwrap();
            // Inbound side answers with its own version, then verack
            assert!(matches!(framed.next().await, Some(Ok(Message::Version(_)))));
            assert_eq!(framed.next().await.unwrap().unwrap(), Message::Verack);
            framed.send(Message::Verack).await.unwrap();
            framed.send(Message::Headers(vec![header.clone()])).await.unwrap();
        };

        let (result, ()) = tokio::join!(node.handle_stream(local_end, "remote", false), remote);
        assert!(result.is_ok());

        let ChainEvent::HeadersValidated(event) = events.recv().await.unwrap() else {
            panic!("expected validated headers");
        };
        assert_eq!(event.new_headers_count, 1);

        let status = node.status().await;
        assert_eq!(status.best_height, 1);
        assert_eq!(status.best_hash, header.hash);
        assert!(status.failure.is_none());
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_replay_capture() {
        let mut node = regtest_node();
        node.start();
        let mut events = node.events.subscribe();

        let first = mined_child(&node.params.genesis_header);
        let second = mined_child(&first);
        let mut capture = BytesMut::new();
        let capture_peer = node.new_peer("capture", true);
        capture_peer.set_negotiated_version(PROTOCOL_VERSION);
        let mut writer = node.codec(capture_peer);
        writer.encode(Message::Ping(1), &mut capture).unwrap();
        writer
            .encode(Message::Headers(vec![first, second.clone()]), &mut capture)
            .unwrap();

        let summary = node.replay(&capture[..], "capture").await.unwrap();
        assert_eq!(summary, ReplaySummary { messages: 2, header_batches: 1 });

        let ChainEvent::HeadersValidated(event) = events.recv().await.unwrap() else {
            panic!("expected validated headers");
        };
        assert_eq!(event.last_header.unwrap().hash, second.hash);
        assert_eq!(node.status().await.best_height, 2);
        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_replayed_block_with_bad_merkle_root_is_rejected() {
        let node = regtest_node();
        let coinbase = Transaction::new(
            1,
            vec![TransactionInput::coinbase(vec![0x03, 0x01, 0x00])],
            vec![TransactionOutput::new(50 * 100_000_000, vec![0x51])],
            0,
            &DoubleSha256,
        );
        let mut header = mined_child(&node.params.genesis_header);
        header.merkle_root = UInt256::from_u64(1);
        let block = Block::new(header, vec![coinbase]);

        let mut capture = BytesMut::new();
        let capture_peer = node.new_peer("capture", true);
        capture_peer.set_negotiated_version(PROTOCOL_VERSION);
        node.codec(capture_peer)
            .encode(Message::Block(block), &mut capture)
            .unwrap();

        let result = node.replay(&capture[..], "capture").await;
        assert!(matches!(
            result,
            Err(ConnectionError::Processor(ProcessorError::Misbehavior(_)))
        ));
    }
}
