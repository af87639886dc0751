//! Component-level error taxonomy. These enums classify *how* a call into a collaborator
//! failed; the coordinator crate's `CoreError` maps each variant onto the handler-level outcome
//! (retry, typed failure event, silent ack) appropriate to that failure kind.

use coordinator_integration::error::TransportError;
use thiserror::Error;

/// Errors surfaced by [`crate::store::RunStore`]. Conditional-write predicate failures are NOT
/// represented here - they are a normal race outcome and are returned as `Ok(false)` from the
/// method in question, never as an `Err`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("run {0} already exists")]
    RunAlreadyExists(String),

    #[error("no row found for key {0}")]
    NotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by [`crate::bus::EventBus`].
#[derive(Debug, Error)]
pub enum BusError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("message exhausted {attempts} delivery attempts and was routed to the dead letter sink")]
    DeadLettered { attempts: u32 },

    #[error("bus backend error: {0}")]
    Backend(String),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BusError {
    fn from(error: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::Backend(error.to_string())
    }
}

/// Errors from the broker port. `Transient` is retried per the SELL retry policy;
/// `Terminal` fails the trade immediately regardless of phase.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("broker reported a transient failure: {0}")]
    Transient(String),

    #[error("broker rejected the order: {0}")]
    Terminal(String),
}

/// Errors from the market clock, market-data refresh, or price-lookup ports.
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no price available for {0}")]
    PriceUnavailable(String),
}

/// Errors from the trade ledger and P&L service ports. Failures here are logged/degraded rather
/// than propagated as trade or run failures - this type exists so callers have something concrete
/// to log.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("collaborator call failed: {0}")]
    Failed(String),
}
