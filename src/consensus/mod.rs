//! Consensus rules and header validation

pub mod block_rules;
pub mod header_rules;
pub mod header_validator;
pub mod params;
pub mod transaction_rules;
pub mod validation;

pub use block_rules::{BlockRuleSet, BlockValidationContext, BlockValidationRule};
pub use header_rules::{Clock, HeaderRuleSet, HeaderValidationContext, HeaderValidationRule, SystemClock};
pub use header_validator::{
    BestHeaderSelector, FatalErrorHandler, HeaderValidator, HeaderValidatorHandle,
    HeadersToValidate, HighestHeaderSelector, ShutdownOnFatal, ValidatorError,
};
pub use params::{ConsensusParameters, Network, COIN, MAX_MONEY};
pub use transaction_rules::check_transaction;
pub use validation::{reasons, RejectKind, Rejection, ValidationState};
