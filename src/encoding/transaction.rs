//! Wire encoding of transactions and their parts
//!
//! Segwit transactions are written as `version | 0x00 | flags | inputs |
//! outputs | witnesses | lock_time`. The `0x00` marker reads as an empty input
//! list to legacy parsers, which is how the extended form is recognised.

use super::{DecodeError, ProtocolReader, ProtocolType, ProtocolWriter, SerializationContext};
use crate::core::{
    OutPoint, Transaction, TransactionInput, TransactionOutput, TransactionWitness, UInt256,
};

/// Flag bit announcing witness data
const WITNESS_FLAG: u8 = 0x01;

impl ProtocolType for OutPoint {
    fn serialize(&self, writer: &mut ProtocolWriter, _ctx: &SerializationContext) -> usize {
        writer.write_uint256(&self.hash) + writer.write_u32_le(self.index)
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        _ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        Ok(OutPoint {
            hash: reader.read_uint256()?,
            index: reader.read_u32_le()?,
        })
    }
}

/// Inputs never carry their witness inline; see [`Transaction`]
impl ProtocolType for TransactionInput {
    fn serialize(&self, writer: &mut ProtocolWriter, ctx: &SerializationContext) -> usize {
        self.previous_output.serialize(writer, ctx)
            + writer.write_byte_array(Some(&self.signature_script))
            + writer.write_u32_le(self.sequence)
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        Ok(TransactionInput {
            previous_output: OutPoint::deserialize(reader, ctx)?,
            signature_script: reader.read_byte_array()?.unwrap_or_default(),
            sequence: reader.read_u32_le()?,
            script_witness: TransactionWitness::default(),
        })
    }
}

impl ProtocolType for TransactionOutput {
    fn serialize(&self, writer: &mut ProtocolWriter, _ctx: &SerializationContext) -> usize {
        writer.write_i64_le(self.value) + writer.write_byte_array(Some(&self.public_key_script))
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        _ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        Ok(TransactionOutput {
            value: reader.read_i64_le()?,
            public_key_script: reader.read_byte_array()?.unwrap_or_default(),
        })
    }
}

impl ProtocolType for TransactionWitness {
    fn serialize(&self, writer: &mut ProtocolWriter, _ctx: &SerializationContext) -> usize {
        let mut written = writer.write_var_int(self.components.len() as u64);
        for component in &self.components {
            written += writer.write_byte_array(Some(component));
        }
        written
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        _ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        let count = reader.read_length()?;
        let mut components = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            components.push(reader.read_byte_array()?.unwrap_or_default());
        }
        Ok(TransactionWitness { components })
    }
}

impl ProtocolType for Transaction {
    fn serialize(&self, writer: &mut ProtocolWriter, ctx: &SerializationContext) -> usize {
        let with_witness = ctx.include_witness && self.has_witness();

        let mut written = writer.write_i32_le(self.version);
        if with_witness {
            // Empty input list marker, then the flags
            written += writer.write_u8(0x00);
            written += writer.write_u8(WITNESS_FLAG);
        }
        written += self.inputs.serialize(writer, ctx);
        written += self.outputs.serialize(writer, ctx);
        if with_witness {
            for input in &self.inputs {
                written += input.script_witness.serialize(writer, ctx);
            }
        }
        written + writer.write_u32_le(self.lock_time)
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        let version = reader.read_i32_le()?;
        let mut flags = 0u8;

        let mut inputs = Vec::<TransactionInput>::deserialize(reader, ctx)?;
        let mut outputs = Vec::new();
        if inputs.is_empty() && ctx.include_witness {
            flags = reader.read_u8()?;
            if flags != 0 {
                inputs = Vec::<TransactionInput>::deserialize(reader, ctx)?;
                outputs = Vec::<TransactionOutput>::deserialize(reader, ctx)?;
            }
        } else {
            outputs = Vec::<TransactionOutput>::deserialize(reader, ctx)?;
        }

        if flags & WITNESS_FLAG != 0 && ctx.include_witness {
            flags ^= WITNESS_FLAG;
            for input in &mut inputs {
                input.script_witness = TransactionWitness::deserialize(reader, ctx)?;
            }
            if inputs.iter().all(|input| input.script_witness.is_empty()) {
                return Err(DecodeError::SuperfluousWitness);
            }
        }

        if flags != 0 {
            return Err(DecodeError::UnknownOptionalData(flags));
        }

        let lock_time = reader.read_u32_le()?;

        Ok(Transaction {
            version,
            inputs,
            outputs,
            lock_time,
            hash: UInt256::ZERO,
            witness_hash: UInt256::ZERO,
        })
    }
}
