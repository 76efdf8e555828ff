//! Protocol versions and wire-frame constants

/// Protocol version spoken by this node
pub const PROTOCOL_VERSION: i32 = 70016;

/// Version assumed before the handshake completes
pub const INIT_PROTO_VERSION: i32 = 209;

/// Peers older than this are disconnected
pub const MIN_PEER_PROTO_VERSION: i32 = 31800;

/// `version` carries sender address, nonce, user agent and start height
pub const VERSION_WITH_SENDER: i32 = 106;

/// Network addresses carry a timestamp outside of `version`
pub const CADDR_TIME_VERSION: i32 = 31402;

/// `version` carries the relay flag (BIP 37)
pub const RELAY_VERSION: i32 = 70001;

/// Magic number size in bytes
pub const MAGIC_SIZE: usize = 4;

/// Command field size in bytes (ASCII, NUL padded)
pub const COMMAND_SIZE: usize = 12;

/// Magic + command + payload length + checksum
pub const HEADER_SIZE: usize = MAGIC_SIZE + COMMAND_SIZE + 4 + 4;

/// Default maximum payload size accepted from a peer
pub const MAX_MESSAGE_SIZE: u32 = 4_000_000;

/// Maximum number of headers in one `headers` message
pub const MAX_HEADERS_RESULTS: usize = 2000;

/// `ping` and `pong` carry a nonce (BIP 31)
pub const BIP0031_VERSION: i32 = 60000;
