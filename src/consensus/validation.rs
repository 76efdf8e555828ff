//! Validation outcomes shared by transaction, block and header rules

use std::fmt;

/// Reject reason codes as reported to peers and in logs
pub mod reasons {
    pub const BAD_TXNS_VIN_EMPTY: &str = "bad-txns-vin-empty";
    pub const BAD_TXNS_VOUT_EMPTY: &str = "bad-txns-vout-empty";
    pub const BAD_TXNS_OVERSIZE: &str = "bad-txns-oversize";
    pub const BAD_TXNS_VOUT_NEGATIVE: &str = "bad-txns-vout-negative";
    pub const BAD_TXNS_VOUT_TOOLARGE: &str = "bad-txns-vout-toolarge";
    pub const BAD_TXNS_TXOUTTOTAL_TOOLARGE: &str = "bad-txns-txouttotal-toolarge";
    pub const BAD_TXNS_INPUTS_DUPLICATE: &str = "bad-txns-inputs-duplicate";
    pub const BAD_CB_LENGTH: &str = "bad-cb-length";
    pub const BAD_TXNS_PREVOUT_NULL: &str = "bad-txns-prevout-null";

    pub const BAD_TXNMRKLROOT: &str = "bad-txnmrklroot";
    pub const BAD_TXNS_DUPLICATE: &str = "bad-txns-duplicate";
    pub const BAD_BLK_LENGTH: &str = "bad-blk-length";
    pub const BAD_CB_MISSING: &str = "bad-cb-missing";
    pub const BAD_CB_MULTIPLE: &str = "bad-cb-multiple";

    pub const PREV_BLK_NOT_FOUND: &str = "prev-blk-not-found";
    pub const CHECKPOINT_MISMATCH: &str = "checkpoint-mismatch";
    pub const BAD_VERSION: &str = "bad-version";
    pub const TIME_TOO_NEW: &str = "time-too-new";
    pub const BAD_DIFFBITS: &str = "bad-diffbits";
    pub const HIGH_HASH: &str = "high-hash";
}

/// Category of a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectKind {
    /// Breaks a consensus rule
    Consensus,
    /// Data does not match its commitment and may be a corrupted copy of a
    /// valid object
    Mutated,
    InvalidHeader,
    /// Parent is not known yet
    MissingPrevious,
    /// Timestamp is too far ahead; may become valid later
    TimeFuture,
    Checkpoint,
}

/// A failed rule: machine-readable reason plus free-form detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectKind,
    pub reason: &'static str,
    pub debug: String,
}

impl Rejection {
    pub fn new(kind: RejectKind, reason: &'static str, debug: impl Into<String>) -> Self {
        Self {
            kind,
            reason,
            debug: debug.into(),
        }
    }

    pub fn consensus(reason: &'static str, debug: impl Into<String>) -> Self {
        Self::new(RejectKind::Consensus, reason, debug)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.debug.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{} ({})", self.reason, self.debug)
        }
    }
}

/// Outcome of running a rule set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationState {
    Valid,
    Invalid(Rejection),
}

impl ValidationState {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationState::Valid)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            ValidationState::Valid => None,
            ValidationState::Invalid(rejection) => Some(rejection),
        }
    }
}

impl From<Result<(), Rejection>> for ValidationState {
    fn from(result: Result<(), Rejection>) -> Self {
        match result {
            Ok(()) => ValidationState::Valid,
            Err(rejection) => ValidationState::Invalid(rejection),
        }
    }
}
