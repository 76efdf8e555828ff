//! Header rules run by the header validator
//!
//! Rules see the chain state read-only through [`HeaderValidationContext`].
//! A rule may mark the header forced-valid (a checkpoint match); the
//! validator then skips the remaining rules.

use crate::consensus::params::ConsensusParameters;
use crate::consensus::validation::{reasons, RejectKind, Rejection};
use crate::core::{BlockHeader, ChainState, HeaderNode, UInt256};

/// Source of the current unix time
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// State shared by the rules while one header is checked
pub struct HeaderValidationContext<'a> {
    pub header: &'a BlockHeader,
    pub chain_state: &'a ChainState,
    pub params: &'a ConsensusParameters,
    /// Unix time the header is judged against
    pub now: i64,
    previous: Option<HeaderNode>,
    forced_valid: bool,
}

impl<'a> HeaderValidationContext<'a> {
    pub fn new(
        header: &'a BlockHeader,
        chain_state: &'a ChainState,
        params: &'a ConsensusParameters,
        now: i64,
    ) -> Self {
        Self {
            header,
            chain_state,
            params,
            now,
            previous: None,
            forced_valid: false,
        }
    }

    /// Parent node, once [`PreviousHeaderRule`] has found it
    pub fn previous(&self) -> Option<&HeaderNode> {
        self.previous.as_ref()
    }

    /// Height the header would get in the index
    pub fn height(&self) -> Option<u32> {
        self.previous.map(|node| node.height + 1)
    }

    /// Accept the header without running the remaining rules
    pub fn force_valid(&mut self) {
        self.forced_valid = true;
    }

    pub fn is_forced_valid(&self) -> bool {
        self.forced_valid
    }
}

/// A single header check
pub trait HeaderValidationRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, ctx: &mut HeaderValidationContext<'_>) -> Result<(), Rejection>;
}

/// Parent must already be indexed
pub struct PreviousHeaderRule;

impl HeaderValidationRule for PreviousHeaderRule {
    fn name(&self) -> &'static str {
        "previous-header"
    }

    fn check(&self, ctx: &mut HeaderValidationContext<'_>) -> Result<(), Rejection> {
        match ctx.chain_state.get(&ctx.header.previous_block_hash) {
            Some(node) => {
                ctx.previous = Some(*node);
                Ok(())
            }
            None => Err(Rejection::new(
                RejectKind::MissingPrevious,
                reasons::PREV_BLK_NOT_FOUND,
                format!("previous header {} not found", ctx.header.previous_block_hash),
            )),
        }
    }
}

/// Headers at checkpoint heights must carry the checkpoint hash
pub struct CheckpointRule;

impl HeaderValidationRule for CheckpointRule {
    fn name(&self) -> &'static str {
        "checkpoint"
    }

    fn check(&self, ctx: &mut HeaderValidationContext<'_>) -> Result<(), Rejection> {
        let Some(height) = ctx.height() else {
            return Ok(());
        };
        match ctx.params.checkpoints.get(&height) {
            Some(expected) if *expected == ctx.header.hash => {
                ctx.force_valid();
                Ok(())
            }
            Some(expected) => Err(Rejection::new(
                RejectKind::Checkpoint,
                reasons::CHECKPOINT_MISMATCH,
                format!("height {} expects {}", height, expected),
            )),
            None => Ok(()),
        }
    }
}

pub struct HeaderVersionRule;

impl HeaderValidationRule for HeaderVersionRule {
    fn name(&self) -> &'static str {
        "header-version"
    }

    fn check(&self, ctx: &mut HeaderValidationContext<'_>) -> Result<(), Rejection> {
        if ctx.header.version < ctx.params.min_header_version {
            return Err(Rejection::new(
                RejectKind::InvalidHeader,
                reasons::BAD_VERSION,
                format!("version 0x{:08x} is obsolete", ctx.header.version),
            ));
        }
        Ok(())
    }
}

/// Timestamp may not run too far ahead of the local clock
pub struct TimeTooNewRule;

impl HeaderValidationRule for TimeTooNewRule {
    fn name(&self) -> &'static str {
        "time-too-new"
    }

    fn check(&self, ctx: &mut HeaderValidationContext<'_>) -> Result<(), Rejection> {
        let limit = ctx.now + ctx.params.max_future_block_time;
        if i64::from(ctx.header.timestamp) > limit {
            return Err(Rejection::new(
                RejectKind::TimeFuture,
                reasons::TIME_TOO_NEW,
                format!("timestamp {} is after {}", ctx.header.timestamp, limit),
            ));
        }
        Ok(())
    }
}

/// Hash must meet the target encoded in `bits`
pub struct ProofOfWorkRule;

impl HeaderValidationRule for ProofOfWorkRule {
    fn name(&self) -> &'static str {
        "proof-of-work"
    }

    fn check(&self, ctx: &mut HeaderValidationContext<'_>) -> Result<(), Rejection> {
        let target = UInt256::from_compact(ctx.header.bits)
            .filter(|target| *target <= ctx.params.pow_limit)
            .ok_or_else(|| {
                Rejection::new(
                    RejectKind::InvalidHeader,
                    reasons::BAD_DIFFBITS,
                    format!("bits 0x{:08x} out of range", ctx.header.bits),
                )
            })?;

        if ctx.header.hash > target {
            return Err(Rejection::new(
                RejectKind::InvalidHeader,
                reasons::HIGH_HASH,
                format!("hash {} above target {}", ctx.header.hash, target),
            ));
        }
        Ok(())
    }
}

/// Ordered header rules
pub struct HeaderRuleSet {
    rules: Vec<Box<dyn HeaderValidationRule>>,
}

impl HeaderRuleSet {
    pub fn new(rules: Vec<Box<dyn HeaderValidationRule>>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> impl Iterator<Item = &dyn HeaderValidationRule> {
        self.rules.iter().map(|rule| rule.as_ref())
    }

    /// Run the rules in order, stopping at the first failure or once a rule
    /// forces the header valid
    pub fn check(&self, ctx: &mut HeaderValidationContext<'_>) -> Result<(), Rejection> {
        for rule in &self.rules {
            rule.check(ctx)?;
            if ctx.is_forced_valid() {
                log::debug!("Header {} forced valid by {}", ctx.header.hash, rule.name());
                break;
            }
        }
        Ok(())
    }
}

impl Default for HeaderRuleSet {
    fn default() -> Self {
        Self::new(vec![
            Box::new(PreviousHeaderRule),
            Box::new(CheckpointRule),
            Box::new(HeaderVersionRule),
            Box::new(TimeTooNewRule),
            Box::new(ProofOfWorkRule),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DoubleSha256;

    /// Grind the nonce until the regtest target is met
    fn mine(mut header: BlockHeader) -> BlockHeader {
        let target = UInt256::from_compact(header.bits).unwrap();
        while header.hash > target {
            header.nonce += 1;
            header.rehash(&DoubleSha256);
        }
        header
    }

    fn child(params: &ConsensusParameters, parent: &BlockHeader) -> BlockHeader {
        mine(BlockHeader::new(
            4,
            parent.hash,
            UInt256::ZERO,
            parent.timestamp + 600,
            params.genesis_header.bits,
            0,
            &DoubleSha256,
        ))
    }

    fn run(params: &ConsensusParameters, state: &ChainState, header: &BlockHeader) -> Result<bool, Rejection> {
        let now = i64::from(params.genesis_header.timestamp) + 3600;
        let mut ctx = HeaderValidationContext::new(header, state, params, now);
        HeaderRuleSet::default().check(&mut ctx)?;
        Ok(ctx.is_forced_valid())
    }

    #[test]
    fn test_connected_header_passes() {
        let params = ConsensusParameters::regtest();
        let state = ChainState::new(params.genesis_header.clone());
        let header = child(&params, &params.genesis_header);

        assert_eq!(run(&params, &state, &header), Ok(false));
    }

    #[test]
    fn test_missing_previous() {
        let params = ConsensusParameters::regtest();
        let state = ChainState::new(params.genesis_header.clone());
        let first = child(&params, &params.genesis_header);
        let second = child(&params, &first);

        let rejection = run(&params, &state, &second).unwrap_err();
        assert_eq!(rejection.kind, RejectKind::MissingPrevious);
        assert_eq!(rejection.reason, reasons::PREV_BLK_NOT_FOUND);
    }

    #[test]
    fn test_time_too_new() {
        let params = ConsensusParameters::regtest();
        let state = ChainState::new(params.genesis_header.clone());
        let mut header = params.genesis_header.clone();
        header.previous_block_hash = params.genesis_hash();
        header.timestamp += 3 * 60 * 60 + 1;
        header.rehash(&DoubleSha256);
        let header = mine(header);

        let rejection = run(&params, &state, &header).unwrap_err();
        assert_eq!(rejection.reason, reasons::TIME_TOO_NEW);
        assert_eq!(rejection.kind, RejectKind::TimeFuture);
    }

    #[test]
    fn test_proof_of_work() {
        let params = ConsensusParameters::regtest();
        let state = ChainState::new(params.genesis_header.clone());
        let mut header = child(&params, &params.genesis_header);

        header.bits = 0x1d00ffff;
        header.rehash(&DoubleSha256);
        assert_eq!(run(&params, &state, &header).unwrap_err().reason, reasons::HIGH_HASH);

        header.bits = 0x2100ffff;
        header.rehash(&DoubleSha256);
        assert_eq!(run(&params, &state, &header).unwrap_err().reason, reasons::BAD_DIFFBITS);
    }

    #[test]
    fn test_bad_version() {
        let params = ConsensusParameters::regtest();
        let state = ChainState::new(params.genesis_header.clone());
        let mut header = child(&params, &params.genesis_header);
        header.version = 0;
        header.rehash(&DoubleSha256);
        let header = mine(header);

        assert_eq!(run(&params, &state, &header).unwrap_err().reason, reasons::BAD_VERSION);
    }

    #[test]
    fn test_checkpoint_forces_valid() {
        let mut params = ConsensusParameters::regtest();
        let state = ChainState::new(params.genesis_header.clone());

        // Not mined: only the checkpoint lets it through
        let header = BlockHeader::new(
            0,
            params.genesis_hash(),
            UInt256::ZERO,
            u32::MAX,
            0x1d00ffff,
            0,
            &DoubleSha256,
        );
        params.checkpoints.insert(1, header.hash);
        assert_eq!(run(&params, &state, &header), Ok(true));

        params.checkpoints.insert(1, UInt256::from_u64(1));
        let rejection = run(&params, &state, &header).unwrap_err();
        assert_eq!(rejection.reason, reasons::CHECKPOINT_MISMATCH);
        assert_eq!(rejection.kind, RejectKind::Checkpoint);
    }
}
