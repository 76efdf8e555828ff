//! Chain events
//!
//! Fire-and-forget broadcast of validation outcomes. Publishing never
//! blocks: slow subscribers lag and missing subscribers are ignored.

use crate::consensus::validation::Rejection;
use crate::core::{BlockHeader, HeaderNode};
use crate::network::peer::PeerContext;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Maximum number of events to buffer per subscriber
const BROADCAST_CAPACITY: usize = 256;

/// A batch of headers passed validation
#[derive(Clone, Debug)]
pub struct HeadersValidated {
    /// Headers that passed the rules, including already known ones
    pub validated_count: usize,
    /// Headers that were not indexed before this batch
    pub new_headers_count: usize,
    /// `None` when the batch was empty
    pub last_header: Option<BlockHeader>,
    pub last_node: Option<HeaderNode>,
    pub peer: Arc<PeerContext>,
}

/// A header in a batch failed a rule; later headers were not looked at
#[derive(Clone, Debug)]
pub struct HeaderValidationFailed {
    pub header: BlockHeader,
    pub rejection: Rejection,
    pub peer: Arc<PeerContext>,
}

#[derive(Clone, Debug)]
pub enum ChainEvent {
    HeadersValidated(HeadersValidated),
    HeaderValidationFailed(HeaderValidationFailed),
}

impl ChainEvent {
    pub fn peer(&self) -> &Arc<PeerContext> {
        match self {
            ChainEvent::HeadersValidated(event) => &event.peer,
            ChainEvent::HeaderValidationFailed(event) => &event.peer,
        }
    }
}

impl fmt::Display for ChainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainEvent::HeadersValidated(event) => {
                write!(
                    f,
                    "headers validated from {}: {} validated, {} new",
                    event.peer, event.validated_count, event.new_headers_count
                )?;
                if let Some(node) = &event.last_node {
                    write!(f, ", last {} at height {}", node.hash, node.height)?;
                }
                Ok(())
            }
            ChainEvent::HeaderValidationFailed(event) => write!(
                f,
                "header {} from {} rejected: {}",
                event.header.hash, event.peer, event.rejection
            ),
        }
    }
}

/// Broadcaster for chain events
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ChainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Publish to all current subscribers, returning how many got it
    pub fn publish(&self, event: ChainEvent) -> usize {
        // No subscribers is not an error
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
