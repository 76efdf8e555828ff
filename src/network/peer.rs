//! Per-connection peer state
//!
//! A [`PeerContext`] is shared by the framer, the message processors and
//! the header validator. Everything mutable in it is either atomic or
//! behind a short-lived lock, so it can be passed around as an `Arc`.

use crate::encoding::SerializationContext;
use crate::network::message::VersionMessage;
use crate::network::protocol::INIT_PROTO_VERSION;
use crate::network::types::NodeServices;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::RwLock;

/// Byte counters for one connection
#[derive(Debug, Default)]
pub struct PeerMetrics {
    received: AtomicU64,
    sent: AtomicU64,
    wasted: AtomicU64,
}

impl PeerMetrics {
    /// Bytes of successfully framed and decoded messages
    pub fn record_received(&self, bytes: usize) {
        self.received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Bytes skipped while hunting for magic, or carried by unknown commands
    pub fn record_wasted(&self, bytes: usize) {
        self.wasted.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn wasted(&self) -> u64 {
        self.wasted.load(Ordering::Relaxed)
    }
}

/// What the peer told us in its `version` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub version: i32,
    pub services: NodeServices,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

impl From<&VersionMessage> for PeerInfo {
    fn from(message: &VersionMessage) -> Self {
        Self {
            version: message.version,
            services: message.services,
            user_agent: message.user_agent.clone(),
            start_height: message.start_height,
            relay: message.relay,
        }
    }
}

/// State of a single peer connection
#[derive(Debug)]
pub struct PeerContext {
    pub id: u64,
    /// Remote endpoint, for logging
    pub remote: String,
    pub outbound: bool,
    pub metrics: PeerMetrics,
    negotiated_version: AtomicI32,
    handshake_complete: AtomicBool,
    prefers_headers: AtomicBool,
    info: RwLock<Option<PeerInfo>>,
}

impl PeerContext {
    pub fn new(id: u64, remote: impl Into<String>, outbound: bool) -> Self {
        Self {
            id,
            remote: remote.into(),
            outbound,
            metrics: PeerMetrics::default(),
            negotiated_version: AtomicI32::new(INIT_PROTO_VERSION),
            handshake_complete: AtomicBool::new(false),
            prefers_headers: AtomicBool::new(false),
            info: RwLock::new(None),
        }
    }

    pub fn negotiated_version(&self) -> i32 {
        self.negotiated_version.load(Ordering::Acquire)
    }

    pub fn set_negotiated_version(&self, version: i32) {
        self.negotiated_version.store(version, Ordering::Release);
    }

    /// Context for payloads exchanged with this peer
    pub fn serialization_context(&self) -> SerializationContext {
        SerializationContext::new(self.negotiated_version())
    }

    pub fn record_version(&self, message: &VersionMessage) {
        if let Ok(mut info) = self.info.write() {
            *info = Some(PeerInfo::from(message));
        }
    }

    pub fn info(&self) -> Option<PeerInfo> {
        self.info.read().ok().and_then(|info| info.clone())
    }

    pub fn mark_handshake_complete(&self) {
        self.handshake_complete.store(true, Ordering::Release);
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.handshake_complete.load(Ordering::Acquire)
    }

    /// Peer asked for `headers` announcements instead of `inv`
    pub fn set_prefers_headers(&self) {
        self.prefers_headers.store(true, Ordering::Relaxed);
    }

    pub fn prefers_headers(&self) -> bool {
        self.prefers_headers.load(Ordering::Relaxed)
    }
}

impl fmt::Display for PeerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer={} ({})", self.id, self.remote)
    }
}
