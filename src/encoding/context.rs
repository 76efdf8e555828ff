//! Cross-cutting serialization switches threaded through composite types

/// Options that change the wire shape of nested types.
///
/// Containers pass the context down unchanged unless they need to flip a
/// switch for their children (a block embeds its header with
/// `header_in_block` set, for example).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializationContext {
    /// Protocol version negotiated with the peer
    pub protocol_version: i32,
    /// Include segwit witness data in transactions
    pub include_witness: bool,
    /// Header is embedded in a block payload and must not carry its own
    /// transaction count
    pub header_in_block: bool,
    /// Network addresses carry a timestamp (false inside `version`)
    pub address_timestamp: bool,
}

impl SerializationContext {
    pub fn new(protocol_version: i32) -> Self {
        Self {
            protocol_version,
            include_witness: true,
            header_in_block: false,
            address_timestamp: true,
        }
    }

    pub fn with_witness(mut self, include_witness: bool) -> Self {
        self.include_witness = include_witness;
        self
    }

    pub fn header_in_block(mut self) -> Self {
        self.header_in_block = true;
        self
    }

    pub fn without_address_timestamp(mut self) -> Self {
        self.address_timestamp = false;
        self
    }
}
