//! CompactSize variable-length integers
//!
//! | value                     | encoding            |
//! |---------------------------|---------------------|
//! | `< 0xFD`                  | 1 byte              |
//! | `<= 0xFFFF`               | `0xFD` + u16 LE     |
//! | `<= 0xFFFF_FFFF`          | `0xFE` + u32 LE     |
//! | otherwise                 | `0xFF` + u64 LE     |

use bytes::BufMut;

pub const VARINT_U16_MARKER: u8 = 0xFD;
pub const VARINT_U32_MARKER: u8 = 0xFE;
pub const VARINT_U64_MARKER: u8 = 0xFF;

/// Number of bytes `value` takes once encoded
pub fn var_int_size(value: u64) -> usize {
    match value {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

/// Write `value` using the smallest encoding, returning the bytes written
pub fn write_var_int<B: BufMut>(buf: &mut B, value: u64) -> usize {
    match value {
        0..=0xFC => buf.put_u8(value as u8),
        0xFD..=0xFFFF => {
            buf.put_u8(VARINT_U16_MARKER);
            buf.put_u16_le(value as u16);
        }
        0x1_0000..=0xFFFF_FFFF => {
            buf.put_u8(VARINT_U32_MARKER);
            buf.put_u32_le(value as u32);
        }
        _ => {
            buf.put_u8(VARINT_U64_MARKER);
            buf.put_u64_le(value);
        }
    }
    var_int_size(value)
}
