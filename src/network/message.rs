//! Network message types for P2P communication
//!
//! Every message the node understands is a variant of [`Message`]. The
//! command string on the wire maps to a [`MessageKind`] through a fixed
//! table, so dispatch is resolved at compile time. Commands outside the
//! table survive framing as [`Message::Unknown`].

use crate::core::{Block, BlockHeader, BlockLocator, Transaction, UInt256};
use crate::crypto::HashAlgorithm;
use crate::encoding::{
    DecodeError, ProtocolReader, ProtocolType, ProtocolWriter, SerializationContext,
};
use crate::network::protocol::{BIP0031_VERSION, RELAY_VERSION, VERSION_WITH_SENDER};
use crate::network::types::{InventoryVector, NetworkAddress, NodeServices};
use bytes::Bytes;

/// Commands understood by this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Version,
    Verack,
    Ping,
    Pong,
    GetAddr,
    Addr,
    Inv,
    GetData,
    NotFound,
    GetHeaders,
    Headers,
    Block,
    Tx,
    SendHeaders,
}

impl MessageKind {
    pub const ALL: [MessageKind; 14] = [
        MessageKind::Version,
        MessageKind::Verack,
        MessageKind::Ping,
        MessageKind::Pong,
        MessageKind::GetAddr,
        MessageKind::Addr,
        MessageKind::Inv,
        MessageKind::GetData,
        MessageKind::NotFound,
        MessageKind::GetHeaders,
        MessageKind::Headers,
        MessageKind::Block,
        MessageKind::Tx,
        MessageKind::SendHeaders,
    ];

    /// Command string as it appears in the frame header
    pub fn command(self) -> &'static str {
        match self {
            MessageKind::Version => "version",
            MessageKind::Verack => "verack",
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::GetAddr => "getaddr",
            MessageKind::Addr => "addr",
            MessageKind::Inv => "inv",
            MessageKind::GetData => "getdata",
            MessageKind::NotFound => "notfound",
            MessageKind::GetHeaders => "getheaders",
            MessageKind::Headers => "headers",
            MessageKind::Block => "block",
            MessageKind::Tx => "tx",
            MessageKind::SendHeaders => "sendheaders",
        }
    }

    pub fn from_command(command: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.command() == command)
    }
}

/// Handshake message announcing a peer's capabilities.
///
/// The layout depends on the message's own `version` field rather than on
/// the negotiated version, since it is exchanged before negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: NodeServices,
    /// Unix time of the sender
    pub timestamp: i64,
    pub receiver: NetworkAddress,
    pub sender: NetworkAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    /// Whether the peer wants transaction announcements
    pub relay: bool,
}

impl VersionMessage {
    pub fn new(
        version: i32,
        services: NodeServices,
        receiver: NetworkAddress,
        nonce: u64,
        user_agent: String,
        start_height: i32,
        relay: bool,
    ) -> Self {
        Self {
            version,
            services,
            timestamp: chrono::Utc::now().timestamp(),
            receiver,
            sender: NetworkAddress::unspecified(),
            nonce,
            user_agent,
            start_height,
            relay,
        }
    }
}

impl ProtocolType for VersionMessage {
    fn serialize(&self, writer: &mut ProtocolWriter, ctx: &SerializationContext) -> usize {
        let addr_ctx = ctx.without_address_timestamp();
        let mut written = writer.write_i32_le(self.version);
        written += self.services.serialize(writer, ctx);
        written += writer.write_i64_le(self.timestamp);
        written += self.receiver.serialize(writer, &addr_ctx);

        if self.version >= VERSION_WITH_SENDER {
            written += self.sender.serialize(writer, &addr_ctx);
            written += writer.write_u64_le(self.nonce);
            written += writer.write_var_string(&self.user_agent);
            written += writer.write_i32_le(self.start_height);
            if self.version >= RELAY_VERSION {
                written += writer.write_bool(self.relay);
            }
        }
        written
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        let addr_ctx = ctx.without_address_timestamp();
        let version = reader.read_i32_le()?;
        let services = NodeServices::deserialize(reader, ctx)?;
        let timestamp = reader.read_i64_le()?;
        let receiver = NetworkAddress::deserialize(reader, &addr_ctx)?;

        let mut message = VersionMessage {
            version,
            services,
            timestamp,
            receiver,
            sender: NetworkAddress::unspecified(),
            nonce: 0,
            user_agent: String::new(),
            start_height: 0,
            relay: true,
        };

        if version >= VERSION_WITH_SENDER {
            message.sender = NetworkAddress::deserialize(reader, &addr_ctx)?;
            message.nonce = reader.read_u64_le()?;
            message.user_agent = reader.read_var_string()?;
            message.start_height = reader.read_i32_le()?;
            // Some implementations omit the relay flag
            if version >= RELAY_VERSION && !reader.is_empty() {
                message.relay = reader.read_bool()?;
            }
        }
        Ok(message)
    }
}

/// Request for headers following the first locator hash we share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetHeadersMessage {
    pub version: i32,
    pub locator: BlockLocator,
    /// Last header wanted; zero means "as many as possible"
    pub hash_stop: UInt256,
}

impl ProtocolType for GetHeadersMessage {
    fn serialize(&self, writer: &mut ProtocolWriter, ctx: &SerializationContext) -> usize {
        writer.write_i32_le(self.version)
            + self.locator.serialize(writer, ctx)
            + writer.write_uint256(&self.hash_stop)
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        Ok(GetHeadersMessage {
            version: reader.read_i32_le()?,
            locator: BlockLocator::deserialize(reader, ctx)?,
            hash_stop: reader.read_uint256()?,
        })
    }
}

/// Network message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    /// Keep-alive ping with nonce
    Ping(u64),
    /// Reply to a ping, echoing its nonce
    Pong(u64),
    GetAddr,
    Addr(Vec<NetworkAddress>),
    Inv(Vec<InventoryVector>),
    GetData(Vec<InventoryVector>),
    NotFound(Vec<InventoryVector>),
    GetHeaders(GetHeadersMessage),
    Headers(Vec<BlockHeader>),
    Block(Block),
    Tx(Transaction),
    SendHeaders,
    /// Well-framed message with a command this node does not implement
    Unknown { command: String, payload: Bytes },
}

impl Message {
    /// Kind of a known message; `None` for [`Message::Unknown`]
    pub fn kind(&self) -> Option<MessageKind> {
        let kind = match self {
            Message::Version(_) => MessageKind::Version,
            Message::Verack => MessageKind::Verack,
            Message::Ping(_) => MessageKind::Ping,
            Message::Pong(_) => MessageKind::Pong,
            Message::GetAddr => MessageKind::GetAddr,
            Message::Addr(_) => MessageKind::Addr,
            Message::Inv(_) => MessageKind::Inv,
            Message::GetData(_) => MessageKind::GetData,
            Message::NotFound(_) => MessageKind::NotFound,
            Message::GetHeaders(_) => MessageKind::GetHeaders,
            Message::Headers(_) => MessageKind::Headers,
            Message::Block(_) => MessageKind::Block,
            Message::Tx(_) => MessageKind::Tx,
            Message::SendHeaders => MessageKind::SendHeaders,
            Message::Unknown { .. } => return None,
        };
        Some(kind)
    }

    /// Command name for the frame header and for logging
    pub fn command(&self) -> &str {
        match self {
            Message::Unknown { command, .. } => command,
            known => known.kind().map(MessageKind::command).unwrap_or_default(),
        }
    }

    /// Append the payload (without the frame header) to `writer`
    pub fn serialize_payload(&self, writer: &mut ProtocolWriter, ctx: &SerializationContext) -> usize {
        match self {
            Message::Version(version) => version.serialize(writer, ctx),
            Message::Verack | Message::GetAddr | Message::SendHeaders => 0,
            Message::Ping(nonce) | Message::Pong(nonce) => {
                if ctx.protocol_version > BIP0031_VERSION {
                    writer.write_u64_le(*nonce)
                } else {
                    0
                }
            }
            Message::Addr(addresses) => addresses.serialize(writer, ctx),
            Message::Inv(items) | Message::GetData(items) | Message::NotFound(items) => {
                items.serialize(writer, ctx)
            }
            Message::GetHeaders(request) => request.serialize(writer, ctx),
            Message::Headers(headers) => headers.serialize(writer, ctx),
            Message::Block(block) => block.serialize(writer, ctx),
            Message::Tx(tx) => tx.serialize(writer, ctx),
            Message::Unknown { payload, .. } => writer.write_bytes(payload),
        }
    }

    pub fn payload_bytes(&self, ctx: &SerializationContext) -> Bytes {
        let mut writer = ProtocolWriter::new();
        self.serialize_payload(&mut writer, ctx);
        writer.into_bytes()
    }

    /// Decode the payload of a known command.
    ///
    /// Headers, blocks and transactions come back with their hashes
    /// computed, so downstream consumers never see a stale zero hash.
    pub fn decode(
        kind: MessageKind,
        payload: &[u8],
        ctx: &SerializationContext,
        hasher: &dyn HashAlgorithm,
    ) -> Result<Message, DecodeError> {
        let mut reader = ProtocolReader::new(payload);
        let reader = &mut reader;

        let message = match kind {
            MessageKind::Version => Message::Version(VersionMessage::deserialize(reader, ctx)?),
            MessageKind::Verack => Message::Verack,
            MessageKind::GetAddr => Message::GetAddr,
            MessageKind::SendHeaders => Message::SendHeaders,
            MessageKind::Ping => Message::Ping(Self::read_nonce(reader, ctx)?),
            MessageKind::Pong => Message::Pong(Self::read_nonce(reader, ctx)?),
            MessageKind::Addr => Message::Addr(Vec::deserialize(reader, ctx)?),
            MessageKind::Inv => Message::Inv(Vec::deserialize(reader, ctx)?),
            MessageKind::GetData => Message::GetData(Vec::deserialize(reader, ctx)?),
            MessageKind::NotFound => Message::NotFound(Vec::deserialize(reader, ctx)?),
            MessageKind::GetHeaders => {
                Message::GetHeaders(GetHeadersMessage::deserialize(reader, ctx)?)
            }
            MessageKind::Headers => {
                let mut headers = Vec::<BlockHeader>::deserialize(reader, ctx)?;
                for header in &mut headers {
                    header.rehash(hasher);
                }
                Message::Headers(headers)
            }
            MessageKind::Block => {
                let mut block = Block::deserialize(reader, ctx)?;
                block.rehash(hasher);
                Message::Block(block)
            }
            MessageKind::Tx => {
                let mut tx = Transaction::deserialize(reader, ctx)?;
                tx.rehash(hasher);
                Message::Tx(tx)
            }
        };
        Ok(message)
    }

    fn read_nonce(
        reader: &mut ProtocolReader<'_>,
        ctx: &SerializationContext,
    ) -> Result<u64, DecodeError> {
        if ctx.protocol_version > BIP0031_VERSION {
            reader.read_u64_le()
        } else {
            Ok(0)
        }
    }
}
