//! Growable output buffer for outgoing payloads

use super::varint::write_var_int;
use crate::core::UInt256;
use bytes::{BufMut, Bytes, BytesMut};

/// Output buffer; every write returns the number of bytes it added
#[derive(Debug, Default)]
pub struct ProtocolWriter {
    buf: BytesMut,
}

macro_rules! write_fixed {
    ($name:ident, $ty:ty, $put:ident) => {
        pub fn $name(&mut self, value: $ty) -> usize {
            self.buf.$put(value);
            std::mem::size_of::<$ty>()
        }
    };
}

impl ProtocolWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> usize {
        self.buf.put_slice(bytes);
        bytes.len()
    }

    write_fixed!(write_u8, u8, put_u8);
    write_fixed!(write_u16_le, u16, put_u16_le);
    write_fixed!(write_u16_be, u16, put_u16);
    write_fixed!(write_u32_le, u32, put_u32_le);
    write_fixed!(write_u32_be, u32, put_u32);
    write_fixed!(write_i32_le, i32, put_i32_le);
    write_fixed!(write_u64_le, u64, put_u64_le);
    write_fixed!(write_i64_le, i64, put_i64_le);

    pub fn write_bool(&mut self, value: bool) -> usize {
        self.write_u8(value as u8)
    }

    pub fn write_var_int(&mut self, value: u64) -> usize {
        write_var_int(&mut self.buf, value)
    }

    /// Length-prefixed byte array; `None` is written as a zero length
    pub fn write_byte_array(&mut self, bytes: Option<&[u8]>) -> usize {
        let bytes = bytes.unwrap_or_default();
        self.write_var_int(bytes.len() as u64) + self.write_bytes(bytes)
    }

    pub fn write_var_string(&mut self, value: &str) -> usize {
        self.write_byte_array(Some(value.as_bytes()))
    }

    pub fn write_uint256(&mut self, value: &UInt256) -> usize {
        self.write_bytes(&value.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_counts_bytes() {
        let mut writer = ProtocolWriter::new();
        let mut written = writer.write_i32_le(-1);
        written += writer.write_u16_be(8333);
        written += writer.write_var_string("abc");
        written += writer.write_byte_array(None);

        assert_eq!(written, writer.len());
        assert_eq!(
            writer.as_slice(),
            &[0xff, 0xff, 0xff, 0xff, 0x20, 0x8d, 0x03, b'a', b'b', b'c', 0x00]
        );
    }
}
