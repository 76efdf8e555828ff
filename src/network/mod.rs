//! P2P networking
//!
//! Wire protocol of the node: frame codec, message types, per-peer state,
//! dispatch of decoded messages and the connection driver.

pub mod codec;
pub mod connection;
pub mod message;
pub mod node;
pub mod peer;
pub mod processor;
pub mod protocol;
pub mod types;

pub use codec::{FrameProgress, MessageCodec, ProtocolError};
pub use connection::{run_connection, ConnectionError};
pub use message::{GetHeadersMessage, Message, MessageKind, VersionMessage};
pub use node::{Node, NodeStatus, ReplaySummary};
pub use peer::{PeerContext, PeerInfo, PeerMetrics};
pub use processor::{
    BlockProcessor, HandshakeProcessor, HeadersProcessor, LocalVersion, MessageDispatcher,
    MessageProcessor,
    ProcessorError,
};
pub use protocol::{
    COMMAND_SIZE, HEADER_SIZE, MAX_HEADERS_RESULTS, MAX_MESSAGE_SIZE, PROTOCOL_VERSION,
};
pub use types::{InventoryType, InventoryVector, NetworkAddress, NodeServices};
