//! Incremental reader over a received payload

use super::error::DecodeError;
use super::varint::{VARINT_U16_MARKER, VARINT_U32_MARKER, VARINT_U64_MARKER};
use crate::core::{UInt256, UINT256_SIZE};
use bytes::Buf;

/// Cursor over a byte slice with bounds-checked primitive reads
#[derive(Debug, Clone)]
pub struct ProtocolReader<'a> {
    data: &'a [u8],
    position: usize,
}

macro_rules! read_fixed {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $get:ident) => {
        $(#[$doc])*
        pub fn $name(&mut self) -> Result<$ty, DecodeError> {
            let mut bytes = self.read_bytes(std::mem::size_of::<$ty>())?;
            Ok(bytes.$get())
        }
    };
}

impl<'a> ProtocolReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Everything consumed so far (used to hash just-decoded structures)
    pub fn consumed_since(&self, start: usize) -> &'a [u8] {
        &self.data[start..self.position]
    }

    /// Read exactly `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    read_fixed!(read_u8, u8, get_u8);
    read_fixed!(read_u16_le, u16, get_u16_le);
    read_fixed!(
        /// Big-endian, used for network-address ports
        read_u16_be,
        u16,
        get_u16
    );
    read_fixed!(read_u32_le, u32, get_u32_le);
    read_fixed!(read_u32_be, u32, get_u32);
    read_fixed!(read_i32_le, i32, get_i32_le);
    read_fixed!(read_u64_le, u64, get_u64_le);
    read_fixed!(read_i64_le, i64, get_i64_le);

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a CompactSize integer
    pub fn read_var_int(&mut self) -> Result<u64, DecodeError> {
        match self.read_u8()? {
            VARINT_U16_MARKER => Ok(self.read_u16_le()? as u64),
            VARINT_U32_MARKER => Ok(self.read_u32_le()? as u64),
            VARINT_U64_MARKER => self.read_u64_le(),
            small => Ok(small as u64),
        }
    }

    /// Read a CompactSize used as an in-memory length or count
    pub fn read_length(&mut self) -> Result<usize, DecodeError> {
        let value = self.read_var_int()?;
        usize::try_from(value).map_err(|_| DecodeError::LengthOverflow(value))
    }

    /// Read a length-prefixed byte array.
    ///
    /// A zero length yields `None`, the "no array" sentinel.
    pub fn read_byte_array(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        let len = self.read_length()?;
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(self.read_bytes(len)?.to_vec()))
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_var_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_length()?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    pub fn read_uint256(&mut self) -> Result<UInt256, DecodeError> {
        Ok(UInt256::from_bytes(self.read_array::<UINT256_SIZE>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_reads() {
        let data = [0x01, 0x00, 0x00, 0x00, 0x20, 0x8d, 0x01];
        let mut reader = ProtocolReader::new(&data);
        assert_eq!(reader.read_u32_le().unwrap(), 1);
        assert_eq!(reader.read_u16_be().unwrap(), 0x208d);
        assert!(reader.read_bool().unwrap());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_eof_is_reported() {
        let data = [0x01, 0x02];
        let mut reader = ProtocolReader::new(&data);
        assert_eq!(
            reader.read_u32_le(),
            Err(DecodeError::UnexpectedEof {
                needed: 4,
                remaining: 2
            })
        );
        // A failed read does not move the cursor
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_empty_byte_array_is_sentinel() {
        let data = [0x00, 0x02, 0xaa, 0xbb];
        let mut reader = ProtocolReader::new(&data);
        assert_eq!(reader.read_byte_array().unwrap(), None);
        assert_eq!(reader.read_byte_array().unwrap(), Some(vec![0xaa, 0xbb]));
    }

    #[test]
    fn test_var_string() {
        let data = [0x03, b'a', b'b', b'c', 0x01, 0xff];
        let mut reader = ProtocolReader::new(&data);
        assert_eq!(reader.read_var_string().unwrap(), "abc");
        assert_eq!(reader.read_var_string(), Err(DecodeError::InvalidUtf8));
    }
}
