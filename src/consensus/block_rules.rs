//! Context-free block rules
//!
//! Rules run in order and the first failure wins. The default order checks
//! the merkle commitment before anything else, so a block that was mutated
//! in transit is reported as `Mutated` rather than as a consensus failure
//! of the mutated copy.

use crate::consensus::params::ConsensusParameters;
use crate::consensus::transaction_rules::check_transaction;
use crate::consensus::validation::{reasons, RejectKind, Rejection, ValidationState};
use crate::core::{Block, UInt256};
use crate::crypto::{calculate_merkle_root, HashAlgorithm};

/// Everything a block rule may look at
pub struct BlockValidationContext<'a> {
    pub block: &'a Block,
    pub params: &'a ConsensusParameters,
    pub hasher: &'a dyn HashAlgorithm,
}

/// A single block check
pub trait BlockValidationRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, ctx: &BlockValidationContext<'_>) -> Result<(), Rejection>;
}

// =============================================================================
// Merkle root
// =============================================================================

/// Index of a transaction duplicating its predecessor in the way
/// CVE-2012-2459 allows without changing the merkle root.
///
/// Walks back from the last transaction in doubling strides down to the
/// largest power of two below the count; the prefix before that point
/// cannot hold a duplicated subtree.
pub fn find_duplicate_transaction(hashes: &[UInt256]) -> Option<usize> {
    let count = hashes.len();
    if count < 2 {
        return None;
    }

    let mut safe_point = 1;
    while safe_point * 2 < count {
        safe_point *= 2;
    }

    let mut position = count - 1;
    let mut stride = if count % 2 == 1 { 2 } else { 1 };
    while position >= safe_point {
        if hashes[position] == hashes[position - 1] {
            return Some(position);
        }
        if position < stride {
            break;
        }
        position -= stride;
        stride *= 2;
    }
    None
}

/// Merkle root must match the header, and the transaction list must not be
/// a duplicated variant of another one
pub struct MerkleRootRule;

impl BlockValidationRule for MerkleRootRule {
    fn name(&self) -> &'static str {
        "merkle-root"
    }

    fn check(&self, ctx: &BlockValidationContext<'_>) -> Result<(), Rejection> {
        let hashes = ctx.block.transaction_hashes();

        if let Some(position) = find_duplicate_transaction(&hashes) {
            return Err(Rejection::new(
                RejectKind::Mutated,
                reasons::BAD_TXNS_DUPLICATE,
                format!("duplicate transaction {} at index {}", hashes[position], position),
            ));
        }

        let root = calculate_merkle_root(&hashes, ctx.hasher);
        if root != ctx.block.header.merkle_root {
            return Err(Rejection::new(
                RejectKind::Mutated,
                reasons::BAD_TXNMRKLROOT,
                format!(
                    "merkle root mismatch: header {}, computed {}",
                    ctx.block.header.merkle_root, root
                ),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Size
// =============================================================================

/// Transaction count and legacy size must fit the weight limit
pub struct BlockSizeRule;

impl BlockValidationRule for BlockSizeRule {
    fn name(&self) -> &'static str {
        "block-size"
    }

    fn check(&self, ctx: &BlockValidationContext<'_>) -> Result<(), Rejection> {
        let params = ctx.params;
        let count = ctx.block.tx_count() as u64;
        let size = ctx.block.size_without_witness() as u64;

        let over_limit = |value: u64| {
            value.saturating_mul(params.witness_scale_factor) > params.max_block_weight
        };
        if count == 0 || over_limit(count) || over_limit(size) {
            return Err(Rejection::consensus(
                reasons::BAD_BLK_LENGTH,
                format!("{} transactions, {} bytes", count, size),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Coinbase
// =============================================================================

/// First transaction is the coinbase, and it is the only one
pub struct CoinbaseRule;

impl BlockValidationRule for CoinbaseRule {
    fn name(&self) -> &'static str {
        "coinbase"
    }

    fn check(&self, ctx: &BlockValidationContext<'_>) -> Result<(), Rejection> {
        if ctx.block.coinbase_tx().is_none() {
            return Err(Rejection::consensus(
                reasons::BAD_CB_MISSING,
                "first tx is not coinbase",
            ));
        }
        if ctx.block.transactions[1..].iter().any(|tx| tx.is_coinbase()) {
            return Err(Rejection::consensus(
                reasons::BAD_CB_MULTIPLE,
                "more than one coinbase",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// Context-free checks on every transaction
pub struct CheckTransactionsRule;

impl BlockValidationRule for CheckTransactionsRule {
    fn name(&self) -> &'static str {
        "check-transactions"
    }

    fn check(&self, ctx: &BlockValidationContext<'_>) -> Result<(), Rejection> {
        for tx in &ctx.block.transactions {
            check_transaction(tx, ctx.params).map_err(|rejection| {
                Rejection::consensus(
                    rejection.reason,
                    format!("transaction {} failed: {}", tx.hash, rejection),
                )
            })?;
        }
        Ok(())
    }
}

// =============================================================================
// Rule set
// =============================================================================

/// Ordered list of block rules
pub struct BlockRuleSet {
    rules: Vec<Box<dyn BlockValidationRule>>,
}

impl BlockRuleSet {
    pub fn new(rules: Vec<Box<dyn BlockValidationRule>>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> impl Iterator<Item = &dyn BlockValidationRule> {
        self.rules.iter().map(|rule| rule.as_ref())
    }

    pub fn check(&self, ctx: &BlockValidationContext<'_>) -> Result<(), Rejection> {
        for rule in &self.rules {
            if let Err(rejection) = rule.check(ctx) {
                log::debug!(
                    "Block {} failed rule {}: {}",
                    ctx.block.header.hash,
                    rule.name(),
                    rejection
                );
                return Err(rejection);
            }
        }
        Ok(())
    }

    pub fn validate(
        &self,
        block: &Block,
        params: &ConsensusParameters,
        hasher: &dyn HashAlgorithm,
    ) -> ValidationState {
        let ctx = BlockValidationContext {
            block,
            params,
            hasher,
        };
        self.check(&ctx).into()
    }
}

impl Default for BlockRuleSet {
    fn default() -> Self {
        Self::new(vec![
            Box::new(MerkleRootRule),
            Box::new(BlockSizeRule),
            Box::new(CoinbaseRule),
            Box::new(CheckTransactionsRule),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BlockHeader, OutPoint, Transaction, TransactionInput, TransactionOutput};
    use crate::crypto::DoubleSha256;

    fn coinbase() -> Transaction {
        Transaction::new(
            1,
            vec![TransactionInput::coinbase(vec![0x03, 0x01, 0x00])],
            vec![TransactionOutput::new(50 * 100_000_000, vec![0x51])],
            0,
            &DoubleSha256,
        )
    }

    fn spend(n: u64) -> Transaction {
        Transaction::new(
            1,
            vec![TransactionInput::new(OutPoint::new(UInt256::from_u64(n), 0), vec![])],
            vec![TransactionOutput::new(1_000, vec![0x51])],
            0,
            &DoubleSha256,
        )
    }

    /// Block whose header commits to its transactions
    fn block(transactions: Vec<Transaction>) -> Block {
        let hashes: Vec<UInt256> = transactions.iter().map(|tx| tx.hash).collect();
        let root = calculate_merkle_root(&hashes, &DoubleSha256);
        let header = BlockHeader::new(1, UInt256::ZERO, root, 0, 0x207fffff, 0, &DoubleSha256);
        Block::new(header, transactions)
    }

    fn nine_transactions() -> Vec<Transaction> {
        let mut transactions = vec![coinbase()];
        transactions.extend((1..9).map(spend));
        transactions
    }

    fn validate(block: &Block) -> ValidationState {
        BlockRuleSet::default().validate(block, &ConsensusParameters::regtest(), &DoubleSha256)
    }

    fn reason(block: &Block) -> Option<&'static str> {
        validate(block).rejection().map(|r| r.reason)
    }

    #[test]
    fn test_valid_block() {
        assert!(validate(&block(nine_transactions())).is_valid());
    }

    #[test]
    fn test_duplicate_last_transaction_is_mutation() {
        let mut transactions = nine_transactions();
        transactions[8] = transactions[7].clone();
        let state = validate(&block(transactions));

        let rejection = state.rejection().unwrap();
        assert_eq!(rejection.reason, reasons::BAD_TXNS_DUPLICATE);
        assert_eq!(rejection.kind, RejectKind::Mutated);
    }

    #[test]
    fn test_duplicate_walk() {
        let distinct: Vec<UInt256> = (0..9).map(UInt256::from_u64).collect();
        assert_eq!(find_duplicate_transaction(&distinct), None);

        let mut duplicated = distinct.clone();
        duplicated[8] = duplicated[7];
        assert_eq!(find_duplicate_transaction(&duplicated), Some(8));

        let pair = [UInt256::from_u64(1), UInt256::from_u64(1)];
        assert_eq!(find_duplicate_transaction(&pair), Some(1));
        assert_eq!(find_duplicate_transaction(&pair[..1]), None);
    }

    #[test]
    fn test_merkle_root_mismatch() {
        let mut block = block(nine_transactions());
        block.header.merkle_root = UInt256::from_u64(1);

        let state = validate(&block);
        assert_eq!(state.rejection().unwrap().reason, reasons::BAD_TXNMRKLROOT);
        assert_eq!(state.rejection().unwrap().kind, RejectKind::Mutated);
    }

    #[test]
    fn test_empty_block() {
        assert_eq!(reason(&block(vec![])), Some(reasons::BAD_BLK_LENGTH));
    }

    #[test]
    fn test_coinbase_placement() {
        assert_eq!(
            reason(&block(vec![spend(1), coinbase()])),
            Some(reasons::BAD_CB_MISSING)
        );

        let mut second = coinbase();
        second.lock_time = 1;
        second.rehash(&DoubleSha256);
        assert_eq!(
            reason(&block(vec![coinbase(), second])),
            Some(reasons::BAD_CB_MULTIPLE)
        );

        assert_eq!(reason(&block(vec![coinbase(), spend(1)])), None);
    }

    #[test]
    fn test_transaction_failure_is_consensus() {
        let mut bad = spend(1);
        bad.outputs[0].value = -1;
        bad.rehash(&DoubleSha256);

        let state = validate(&block(vec![coinbase(), bad]));
        let rejection = state.rejection().unwrap();
        assert_eq!(rejection.kind, RejectKind::Consensus);
        assert_eq!(rejection.reason, reasons::BAD_TXNS_VOUT_NEGATIVE);
    }
}
