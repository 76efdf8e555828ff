//! Protocol types shared by several messages: service flags, network
//! addresses and inventory vectors

use crate::core::UInt256;
use crate::encoding::{
    DecodeError, ProtocolReader, ProtocolType, ProtocolWriter, SerializationContext,
};
use crate::network::protocol::CADDR_TIME_VERSION;
use bitflags::bitflags;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

bitflags! {
    /// Services advertised in `version` and network addresses
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeServices: u64 {
        const NETWORK = 1;
        const GETUTXO = 1 << 1;
        const BLOOM = 1 << 2;
        const WITNESS = 1 << 3;
        const COMPACT_FILTERS = 1 << 6;
        const NETWORK_LIMITED = 1 << 10;
    }
}

impl ProtocolType for NodeServices {
    fn serialize(&self, writer: &mut ProtocolWriter, _ctx: &SerializationContext) -> usize {
        writer.write_u64_le(self.bits())
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        _ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        // Unknown service bits are kept, peers may advertise newer services
        Ok(NodeServices::from_bits_retain(reader.read_u64_le()?))
    }
}

/// Address of a node as advertised on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAddress {
    /// Last-seen time; only present outside of `version`
    pub time: u32,
    pub services: NodeServices,
    /// IPv4 addresses are stored IPv4-mapped
    pub ip: Ipv6Addr,
    pub port: u16,
}

impl NetworkAddress {
    pub fn new(addr: SocketAddr, services: NodeServices) -> Self {
        let ip = match addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        Self {
            time: 0,
            services,
            ip,
            port: addr.port(),
        }
    }

    /// Unroutable placeholder used when the address is unknown
    pub fn unspecified() -> Self {
        Self {
            time: 0,
            services: NodeServices::empty(),
            ip: Ipv6Addr::UNSPECIFIED,
            port: 0,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        let ip = match self.ip.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(self.ip),
        };
        SocketAddr::new(ip, self.port)
    }

    fn has_time(ctx: &SerializationContext) -> bool {
        ctx.address_timestamp && ctx.protocol_version >= CADDR_TIME_VERSION
    }
}

impl ProtocolType for NetworkAddress {
    fn serialize(&self, writer: &mut ProtocolWriter, ctx: &SerializationContext) -> usize {
        let mut written = 0;
        if Self::has_time(ctx) {
            written += writer.write_u32_le(self.time);
        }
        written += self.services.serialize(writer, ctx);
        written += writer.write_bytes(&self.ip.octets());
        written + writer.write_u16_be(self.port)
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        let time = if Self::has_time(ctx) {
            reader.read_u32_le()?
        } else {
            0
        };
        Ok(NetworkAddress {
            time,
            services: NodeServices::deserialize(reader, ctx)?,
            ip: Ipv6Addr::from(reader.read_array::<16>()?),
            port: reader.read_u16_be()?,
        })
    }
}

/// Kind of object referenced by an inventory vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryType {
    Error,
    Tx,
    Block,
    FilteredBlock,
    CompactBlock,
    WitnessTx,
    WitnessBlock,
    Unknown(u32),
}

const MSG_WITNESS_FLAG: u32 = 1 << 30;

impl InventoryType {
    pub fn to_u32(self) -> u32 {
        match self {
            InventoryType::Error => 0,
            InventoryType::Tx => 1,
            InventoryType::Block => 2,
            InventoryType::FilteredBlock => 3,
            InventoryType::CompactBlock => 4,
            InventoryType::WitnessTx => 1 | MSG_WITNESS_FLAG,
            InventoryType::WitnessBlock => 2 | MSG_WITNESS_FLAG,
            InventoryType::Unknown(value) => value,
        }
    }
}

impl From<u32> for InventoryType {
    fn from(value: u32) -> Self {
        match value {
            0 => InventoryType::Error,
            1 => InventoryType::Tx,
            2 => InventoryType::Block,
            3 => InventoryType::FilteredBlock,
            4 => InventoryType::CompactBlock,
            v if v == 1 | MSG_WITNESS_FLAG => InventoryType::WitnessTx,
            v if v == 2 | MSG_WITNESS_FLAG => InventoryType::WitnessBlock,
            other => InventoryType::Unknown(other),
        }
    }
}

/// Reference to a block or transaction in `inv`, `getdata` and `notfound`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InventoryVector {
    pub kind: InventoryType,
    pub hash: UInt256,
}

impl InventoryVector {
    pub fn new(kind: InventoryType, hash: UInt256) -> Self {
        Self { kind, hash }
    }
}

impl ProtocolType for InventoryVector {
    fn serialize(&self, writer: &mut ProtocolWriter, _ctx: &SerializationContext) -> usize {
        writer.write_u32_le(self.kind.to_u32()) + writer.write_uint256(&self.hash)
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        _ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        Ok(InventoryVector {
            kind: InventoryType::from(reader.read_u32_le()?),
            hash: reader.read_uint256()?,
        })
    }
}
