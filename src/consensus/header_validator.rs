//! Header validator
//!
//! Headers from every peer funnel through one unbounded queue into a
//! single consumer task. Each batch is checked and indexed while holding
//! the chain-state write lock, so all header-index mutation is serialized
//! across peers. Exactly one event is published per batch, after the lock
//! has been released.
//!
//! The consumer loop must never die silently: an error or panic in it is
//! reported to a [`FatalErrorHandler`], which stops the node.

use crate::consensus::header_rules::{Clock, HeaderRuleSet, HeaderValidationContext, SystemClock};
use crate::consensus::params::ConsensusParameters;
use crate::consensus::validation::Rejection;
use crate::core::{BlockHeader, ChainState, ChainStateError, HeaderNode};
use crate::events::{ChainEvent, EventBus, HeaderValidationFailed, HeadersValidated};
use crate::network::peer::PeerContext;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Header validator errors; any of them stops the node
#[derive(Error, Debug)]
pub enum ValidatorError {
    #[error("Header validator is not running")]
    QueueClosed,
    #[error("Chain state error: {0}")]
    ChainState(#[from] ChainStateError),
}

/// Headers received from one peer, in that peer's chain order
#[derive(Debug)]
pub struct HeadersToValidate {
    pub headers: Vec<BlockHeader>,
    pub peer: Arc<PeerContext>,
}

// =============================================================================
// Collaborators
// =============================================================================

/// Decides whether a newly indexed node becomes the best header.
///
/// Called inside the critical section.
pub trait BestHeaderSelector: Send + Sync {
    fn on_new_header(&self, chain: &mut ChainState, node: &HeaderNode);
}

/// Moves the best header to strictly higher nodes; the first header seen
/// at a height wins ties
#[derive(Debug, Default)]
pub struct HighestHeaderSelector;

impl BestHeaderSelector for HighestHeaderSelector {
    fn on_new_header(&self, chain: &mut ChainState, node: &HeaderNode) {
        if node.height > chain.best_header().height {
            chain.set_best_header(node.id);
        }
    }
}

/// Told when the validator loop fails and the node must not go on
pub trait FatalErrorHandler: Send + Sync {
    fn on_fatal(&self, reason: &str);
}

/// Records the failure and cancels the node's shutdown token
#[derive(Debug)]
pub struct ShutdownOnFatal {
    shutdown: CancellationToken,
    failure: Mutex<Option<String>>,
}

impl ShutdownOnFatal {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            failure: Mutex::new(None),
        }
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|failure| failure.clone())
    }
}

impl FatalErrorHandler for ShutdownOnFatal {
    fn on_fatal(&self, reason: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            failure.get_or_insert_with(|| reason.to_string());
        }
        self.shutdown.cancel();
    }
}

// =============================================================================
// Queue
// =============================================================================

/// Producer side of the validation queue
#[derive(Debug, Clone)]
pub struct HeaderValidatorHandle {
    sender: mpsc::UnboundedSender<HeadersToValidate>,
}

impl HeaderValidatorHandle {
    /// Enqueue a batch; never waits
    pub fn request_validation(
        &self,
        headers: Vec<BlockHeader>,
        peer: Arc<PeerContext>,
    ) -> Result<(), ValidatorError> {
        self.sender
            .send(HeadersToValidate { headers, peer })
            .map_err(|_| ValidatorError::QueueClosed)
    }
}

// =============================================================================
// Validator
// =============================================================================

#[derive(Default)]
struct BatchOutcome {
    validated_count: usize,
    new_headers_count: usize,
    last: Option<(BlockHeader, HeaderNode)>,
    failure: Option<(BlockHeader, Rejection)>,
    best: Option<HeaderNode>,
}

/// Consumer side of the validation queue
pub struct HeaderValidator {
    chain_state: Arc<RwLock<ChainState>>,
    params: Arc<ConsensusParameters>,
    events: Arc<EventBus>,
    rules: HeaderRuleSet,
    clock: Arc<dyn Clock>,
    selector: Box<dyn BestHeaderSelector>,
    receiver: mpsc::UnboundedReceiver<HeadersToValidate>,
}

impl HeaderValidator {
    pub fn new(
        chain_state: Arc<RwLock<ChainState>>,
        params: Arc<ConsensusParameters>,
        events: Arc<EventBus>,
    ) -> (Self, HeaderValidatorHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let validator = Self {
            chain_state,
            params,
            events,
            rules: HeaderRuleSet::default(),
            clock: Arc::new(SystemClock),
            selector: Box::new(HighestHeaderSelector),
            receiver,
        };
        (validator, HeaderValidatorHandle { sender })
    }

    pub fn with_rules(mut self, rules: HeaderRuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_selector(mut self, selector: Box<dyn BestHeaderSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Run the loop on its own task, reporting errors and panics to `fatal`
    pub fn spawn(
        self,
        cancel: CancellationToken,
        fatal: Arc<dyn FatalErrorHandler>,
    ) -> JoinHandle<()> {
        let worker = tokio::spawn(self.run(cancel));
        tokio::spawn(async move {
            match worker.await {
                Ok(Ok(())) => log::debug!("Header validator task finished"),
                Ok(Err(e)) => {
                    log::error!("CRITICAL: header validator failed: {}", e);
                    fatal.on_fatal(&e.to_string());
                }
                Err(e) => {
                    let reason = if e.is_panic() {
                        "header validator panicked"
                    } else {
                        "header validator task was aborted"
                    };
                    log::error!("CRITICAL: {}: {}", reason, e);
                    fatal.on_fatal(reason);
                }
            }
        })
    }

    /// Drain the queue until cancelled or every producer is gone
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ValidatorError> {
        log::info!("Header validator started");
        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("Header validator stopping");
                    return Ok(());
                }
                batch = self.receiver.recv() => batch,
            };

            let Some(batch) = batch else {
                log::info!("Header queue closed, validator stopping");
                return Ok(());
            };

            let event = self.validate_batch(batch).await?;
            self.events.publish(event);
        }
    }

    /// Validate and index one batch, returning the event describing it
    pub async fn validate_batch(&self, batch: HeadersToValidate) -> Result<ChainEvent, ValidatorError> {
        let HeadersToValidate { headers, peer } = batch;

        let outcome = {
            let mut chain = self.chain_state.write().await;
            self.process_headers(&mut chain, &headers)?
        };

        if let Some((header, rejection)) = outcome.failure {
            log::warn!(
                "Header {} from {} rejected: {}",
                header.hash,
                peer,
                rejection
            );
            return Ok(ChainEvent::HeaderValidationFailed(HeaderValidationFailed {
                header,
                rejection,
                peer,
            }));
        }

        if outcome.new_headers_count > 0 {
            if let Some(best) = outcome.best {
                log::info!(
                    "Accepted {} new headers from {}, best header {} at height {}",
                    outcome.new_headers_count,
                    peer,
                    best.hash,
                    best.height
                );
            }
        } else {
            log::debug!(
                "Validated {} known headers from {}",
                outcome.validated_count,
                peer
            );
        }

        let (last_header, last_node) = outcome.last.unzip();
        Ok(ChainEvent::HeadersValidated(HeadersValidated {
            validated_count: outcome.validated_count,
            new_headers_count: outcome.new_headers_count,
            last_header,
            last_node,
            peer,
        }))
    }

    /// Critical section: runs with the chain-state write lock held
    fn process_headers(
        &self,
        chain: &mut ChainState,
        headers: &[BlockHeader],
    ) -> Result<BatchOutcome, ValidatorError> {
        let now = self.clock.now();
        let genesis = self.params.genesis_hash();
        let mut outcome = BatchOutcome::default();

        for header in headers {
            if header.hash != genesis {
                let mut ctx = HeaderValidationContext::new(header, chain, &self.params, now);
                if let Err(rejection) = self.rules.check(&mut ctx) {
                    outcome.failure = Some((header.clone(), rejection));
                    break;
                }
            }

            // Known headers, forced-valid ones included, come back as not new
            let (node, is_new) = chain.add_to_block_index(header)?;
            outcome.validated_count += 1;
            if is_new {
                outcome.new_headers_count += 1;
                self.selector.on_new_header(chain, &node);
            }
            outcome.last = Some((header.clone(), node));
        }

        outcome.best = Some(*chain.best_header());
        Ok(outcome)
    }
}
