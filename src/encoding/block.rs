//! Wire encoding of block headers and blocks

use super::{DecodeError, ProtocolReader, ProtocolType, ProtocolWriter, SerializationContext};
use crate::core::{Block, BlockHeader, BlockLocator, Transaction, UInt256};

impl ProtocolType for BlockHeader {
    fn serialize(&self, writer: &mut ProtocolWriter, ctx: &SerializationContext) -> usize {
        let mut written = writer.write_i32_le(self.version);
        written += writer.write_uint256(&self.previous_block_hash);
        written += writer.write_uint256(&self.merkle_root);
        written += writer.write_u32_le(self.timestamp);
        written += writer.write_u32_le(self.bits);
        written += writer.write_u32_le(self.nonce);
        if !ctx.header_in_block {
            written += writer.write_var_int(self.transaction_count);
        }
        written
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        let version = reader.read_i32_le()?;
        let previous_block_hash = reader.read_uint256()?;
        let merkle_root = reader.read_uint256()?;
        let timestamp = reader.read_u32_le()?;
        let bits = reader.read_u32_le()?;
        let nonce = reader.read_u32_le()?;
        let transaction_count = if ctx.header_in_block {
            0
        } else {
            reader.read_var_int()?
        };

        Ok(BlockHeader {
            version,
            previous_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
            transaction_count,
            hash: UInt256::ZERO,
        })
    }
}

impl ProtocolType for Block {
    fn serialize(&self, writer: &mut ProtocolWriter, ctx: &SerializationContext) -> usize {
        // The transaction array carries its own count
        let header_ctx = ctx.header_in_block();
        self.header.serialize(writer, &header_ctx) + self.transactions.serialize(writer, ctx)
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        let header = BlockHeader::deserialize(reader, &ctx.header_in_block())?;
        let transactions = Vec::<Transaction>::deserialize(reader, ctx)?;
        Ok(Block {
            header,
            transactions,
        })
    }
}

impl ProtocolType for BlockLocator {
    fn serialize(&self, writer: &mut ProtocolWriter, ctx: &SerializationContext) -> usize {
        self.hashes.serialize(writer, ctx)
    }

    fn deserialize(
        reader: &mut ProtocolReader<'_>,
        ctx: &SerializationContext,
    ) -> Result<Self, DecodeError> {
        Ok(BlockLocator {
            hashes: Vec::<UInt256>::deserialize(reader, ctx)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OutPoint, TransactionInput, TransactionOutput, BLOCK_HEADER_SIZE};
    use crate::crypto::DoubleSha256;

    fn header() -> BlockHeader {
        BlockHeader::new(
            2,
            UInt256::from_u64(7),
            UInt256::from_u64(9),
            1_600_000_000,
            0x207fffff,
            42,
            &DoubleSha256,
        )
    }

    #[test]
    fn test_header_sizes_by_context() {
        let standalone = SerializationContext::new(70016);
        assert_eq!(header().serialized_size(&standalone), BLOCK_HEADER_SIZE + 1);
        assert_eq!(
            header().serialized_size(&standalone.header_in_block()),
            BLOCK_HEADER_SIZE
        );
    }

    #[test]
    fn test_header_layout() {
        let bytes = header().to_bytes(&SerializationContext::new(70016).header_in_block());
        assert_eq!(&bytes[0..4], &[2, 0, 0, 0]);
        assert_eq!(bytes[4], 7);
        assert_eq!(bytes[36], 9);
        assert_eq!(&bytes[76..80], &[42, 0, 0, 0]);
    }

    #[test]
    fn test_block_round_trip() {
        let ctx = SerializationContext::new(70016);
        let coinbase = Transaction::new(
            1,
            vec![TransactionInput::coinbase(vec![0x01, 0x02])],
            vec![TransactionOutput::new(5_000_000_000, vec![0x51])],
            0,
            &DoubleSha256,
        );
        let spend = Transaction::new(
            2,
            vec![TransactionInput::new(OutPoint::new(coinbase.hash, 0), vec![0xaa])],
            vec![TransactionOutput::new(1_000, vec![0x52])],
            100,
            &DoubleSha256,
        );
        let block = Block::new(header(), vec![coinbase, spend]);

        let bytes = block.to_bytes(&ctx);
        let mut decoded = Block::from_bytes(&bytes, &ctx).unwrap();
        decoded.rehash(&DoubleSha256);

        assert_eq!(decoded, block);
    }
}
