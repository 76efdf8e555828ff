//! Binary protocol encoding
//!
//! Primitive codec (fixed-width integers, CompactSize, length-prefixed
//! arrays) and the [`ProtocolType`] contract implemented by every type that
//! travels on the wire.

pub mod block;
pub mod context;
pub mod error;
pub mod reader;
pub mod transaction;
pub mod varint;
pub mod writer;

pub use context::SerializationContext;
pub use error::DecodeError;
pub use reader::ProtocolReader;
pub use varint::{var_int_size, write_var_int};
pub use writer::ProtocolWriter;

use crate::core::UInt256;
use bytes::Bytes;

/// A type with a binary wire representation
pub trait ProtocolType: Sized {
    /// Append the wire form to `writer`, returning the bytes written
    fn serialize(&self, writer: &mut ProtocolWriter, ctx: &SerializationContext) -> usize;

    /// Read one value from `reader`
    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        ctx: &SerializationContext,
    ) -> Result<Self, DecodeError>;

    /// Serialize into a fresh buffer
    fn to_bytes(&self, ctx: &SerializationContext) -> Bytes {
        let mut writer = ProtocolWriter::new();
        self.serialize(&mut writer, ctx);
        writer.into_bytes()
    }

    /// Deserialize from a complete buffer
    fn from_bytes(data: &[u8], ctx: &SerializationContext) -> Result<Self, DecodeError> {
        let mut reader = ProtocolReader::new(data);
        Self::deserialize(&mut reader, ctx)
    }

    fn serialized_size(&self, ctx: &SerializationContext) -> usize {
        let mut writer = ProtocolWriter::new();
        self.serialize(&mut writer, ctx)
    }
}

impl ProtocolType for UInt256 {
    fn serialize(&self, writer: &mut ProtocolWriter, _ctx: &SerializationContext) -> usize {
        writer.write_uint256(self)
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        _ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        reader.read_uint256()
    }
}

/// Arrays are a CompactSize count followed by the items
impl<T: ProtocolType> ProtocolType for Vec<T> {
    fn serialize(&self, writer: &mut ProtocolWriter, ctx: &SerializationContext) -> usize {
        let mut written = writer.write_var_int(self.len() as u64);
        for item in self {
            written += item.serialize(writer, ctx);
        }
        written
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        let count = reader.read_length()?;
        // Every item takes at least one byte, so a hostile count cannot
        // allocate past the payload size
        let mut items = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            items.push(T::deserialize(reader, ctx)?);
        }
        Ok(items)
    }
}
