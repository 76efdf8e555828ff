//! Payload decoding errors

use thiserror::Error;

/// Errors raised while decoding protocol types.
///
/// Any of these makes the message unusable; callers should treat the
/// sending connection as unreliable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("Invalid UTF-8 string")]
    InvalidUtf8,
    #[error("Length {0} does not fit in memory")]
    LengthOverflow(u64),
    #[error("Superfluous witness record")]
    SuperfluousWitness,
    #[error("Unknown optional data (transaction flags {0:#04x})")]
    UnknownOptionalData(u8),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
