//! Incremental message framer
//!
//! Frame layout: `magic(4) | command(12, NUL padded) | length(u32 LE) |
//! checksum(4) | payload`. The checksum is the first four bytes of the
//! double SHA-256 of the payload.
//!
//! Header fields are consumed as soon as they are parsed and remembered in
//! [`HeaderParseState`], so a header split across reads is never parsed
//! twice. The payload stays in the buffer until all of it has arrived.

use crate::crypto::{HashAlgorithm, CHECKSUM_SIZE};
use crate::encoding::DecodeError;
use crate::network::message::{Message, MessageKind};
use crate::network::peer::PeerContext;
use crate::network::protocol::{COMMAND_SIZE, HEADER_SIZE, MAGIC_SIZE, MAX_MESSAGE_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Framing and decoding errors; all of them end the connection
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: u64, max: u32 },
    #[error("Checksum mismatch for '{command}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        command: String,
        expected: String,
        actual: String,
    },
    #[error("Invalid command name '{0}'")]
    InvalidCommand(String),
    #[error("Failed to decode '{command}': {source}")]
    Decode {
        command: String,
        #[source]
        source: DecodeError,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Header fields parsed so far for the frame in progress
#[derive(Debug, Default)]
struct HeaderParseState {
    magic_read: bool,
    command: Option<String>,
    payload_length: Option<u32>,
    checksum: Option<[u8; CHECKSUM_SIZE]>,
}

impl HeaderParseState {
    /// Header bytes already taken off the input for the frame in progress
    fn bytes_read(&self) -> usize {
        let mut read = 0;
        if self.magic_read {
            read += MAGIC_SIZE;
        }
        if self.command.is_some() {
            read += COMMAND_SIZE;
        }
        if self.payload_length.is_some() {
            read += 4;
        }
        if self.checksum.is_some() {
            read += CHECKSUM_SIZE;
        }
        read
    }
}

/// Result of one parse attempt
#[derive(Debug)]
pub struct FrameProgress {
    /// Bytes the caller may discard from the front of the input
    pub consumed: usize,
    /// Bytes looked at; more input is needed before looking again
    pub examined: usize,
    pub message: Option<Message>,
}

impl FrameProgress {
    fn incomplete(consumed: usize, examined: usize) -> Self {
        Self {
            consumed,
            examined,
            message: None,
        }
    }
}

enum MagicSearch {
    /// Magic starts after `skipped` bytes
    Found { skipped: usize },
    /// Input ends with a prefix of the magic, starting after `skipped` bytes
    Partial { skipped: usize },
    Missing,
}

/// Framer for one peer connection
pub struct MessageCodec {
    magic: [u8; MAGIC_SIZE],
    max_payload_size: u32,
    hasher: Arc<dyn HashAlgorithm>,
    peer: Arc<PeerContext>,
    state: HeaderParseState,
}

impl MessageCodec {
    pub fn new(magic: [u8; MAGIC_SIZE], hasher: Arc<dyn HashAlgorithm>, peer: Arc<PeerContext>) -> Self {
        Self {
            magic,
            max_payload_size: MAX_MESSAGE_SIZE,
            hasher,
            peer,
            state: HeaderParseState::default(),
        }
    }

    pub fn with_max_payload_size(mut self, max_payload_size: u32) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    pub fn peer(&self) -> &Arc<PeerContext> {
        &self.peer
    }

    /// Try to parse one message from the front of `input`.
    ///
    /// `input` must start where the previous call's `consumed` ended.
    pub fn try_parse_message(&mut self, input: &[u8]) -> Result<FrameProgress, ProtocolError> {
        let mut position = 0;

        if !self.state.magic_read {
            match self.find_magic(input) {
                MagicSearch::Found { skipped } => {
                    self.peer.metrics.record_wasted(skipped);
                    self.state.magic_read = true;
                    position = skipped + MAGIC_SIZE;
                }
                MagicSearch::Partial { skipped } => {
                    self.peer.metrics.record_wasted(skipped);
                    return Ok(FrameProgress::incomplete(skipped, input.len()));
                }
                MagicSearch::Missing => {
                    self.peer.metrics.record_wasted(input.len());
                    return Ok(FrameProgress::incomplete(input.len(), input.len()));
                }
            }
        }

        if self.state.command.is_none() {
            let Some(raw) = input.get(position..position + COMMAND_SIZE) else {
                return Ok(FrameProgress::incomplete(position, input.len()));
            };
            self.state.command = Some(parse_command(raw));
            position += COMMAND_SIZE;
        }

        let length = match self.state.payload_length {
            Some(length) => length,
            None => {
                let Some(mut raw) = input.get(position..position + 4) else {
                    return Ok(FrameProgress::incomplete(position, input.len()));
                };
                let length = raw.get_u32_le();
                if length > self.max_payload_size {
                    self.state = HeaderParseState::default();
                    return Err(ProtocolError::PayloadTooLarge {
                        size: length as u64,
                        max: self.max_payload_size,
                    });
                }
                self.state.payload_length = Some(length);
                position += 4;
                length
            }
        };

        let expected = match self.state.checksum {
            Some(checksum) => checksum,
            None => {
                let Some(raw) = input.get(position..position + CHECKSUM_SIZE) else {
                    return Ok(FrameProgress::incomplete(position, input.len()));
                };
                let mut checksum = [0u8; CHECKSUM_SIZE];
                checksum.copy_from_slice(raw);
                self.state.checksum = Some(checksum);
                position += CHECKSUM_SIZE;
                checksum
            }
        };

        let length = length as usize;
        let Some(payload) = input.get(position..position + length) else {
            return Ok(FrameProgress::incomplete(position, input.len()));
        };
        position += length;

        let command = std::mem::take(&mut self.state).command.unwrap_or_default();
        let actual = self.hasher.checksum(payload);
        if actual != expected {
            return Err(ProtocolError::ChecksumMismatch {
                command,
                expected: hex::encode(expected),
                actual: hex::encode(actual),
            });
        }

        let message = self.decode_payload(command, payload, HEADER_SIZE + length)?;
        Ok(FrameProgress {
            consumed: position,
            examined: position,
            message: Some(message),
        })
    }

    fn decode_payload(
        &self,
        command: String,
        payload: &[u8],
        frame_size: usize,
    ) -> Result<Message, ProtocolError> {
        match MessageKind::from_command(&command) {
            Some(kind) => {
                let ctx = self.peer.serialization_context();
                let message = match Message::decode(kind, payload, &ctx, self.hasher.as_ref()) {
                    Ok(message) => message,
                    Err(source) => {
                        self.peer.metrics.record_wasted(frame_size);
                        return Err(ProtocolError::Decode { command, source });
                    }
                };
                self.peer.metrics.record_received(frame_size);
                log::trace!("Received '{}' ({} bytes) from {}", command, frame_size, self.peer);
                Ok(message)
            }
            None => {
                log::debug!("Unknown command '{}' from {}", command, self.peer);
                self.peer.metrics.record_wasted(frame_size);
                Ok(Message::Unknown {
                    command,
                    payload: Bytes::copy_from_slice(payload),
                })
            }
        }
    }

    fn find_magic(&self, input: &[u8]) -> MagicSearch {
        let mut from = 0;
        while let Some(offset) = input[from..].iter().position(|b| *b == self.magic[0]) {
            let start = from + offset;
            let candidate = &input[start..];
            if candidate.len() < MAGIC_SIZE {
                if self.magic.starts_with(candidate) {
                    return MagicSearch::Partial { skipped: start };
                }
            } else if candidate[..MAGIC_SIZE] == self.magic {
                return MagicSearch::Found { skipped: start };
            }
            from = start + 1;
        }
        MagicSearch::Missing
    }
}

fn parse_command(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let progress = self.try_parse_message(&src[..])?;
        src.advance(progress.consumed);
        Ok(progress.message)
    }

    /// A frame cut off by the end of the stream is dropped, not an error
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }

        let leftover = src.len() + self.state.bytes_read();
        if leftover > 0 {
            log::warn!("Dropping {} bytes of incomplete frame from {}", leftover, self.peer);
            self.peer.metrics.record_wasted(leftover);
            self.state = HeaderParseState::default();
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let command = item.command();
        if command.len() > COMMAND_SIZE || !command.is_ascii() {
            return Err(ProtocolError::InvalidCommand(command.to_string()));
        }

        let payload = item.payload_bytes(&self.peer.serialization_context());
        if payload.len() > self.max_payload_size as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len() as u64,
                max: self.max_payload_size,
            });
        }

        let mut command_bytes = [0u8; COMMAND_SIZE];
        command_bytes[..command.len()].copy_from_slice(command.as_bytes());

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_slice(&self.magic);
        dst.put_slice(&command_bytes);
        dst.put_u32_le(payload.len() as u32);
        dst.put_slice(&self.hasher.checksum(&payload));
        dst.put_slice(&payload);

        self.peer.metrics.record_sent(HEADER_SIZE + payload.len());
        log::trace!("Sent '{}' ({} bytes) to {}", command, payload.len(), self.peer);
        Ok(())
    }
}
