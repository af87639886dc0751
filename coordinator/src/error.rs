use coordinator_execution::error::{BrokerError, BusError, CollaboratorError, MarketDataError, StoreError};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `failure_step` discriminant carried on `WorkflowFailed`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize, Display)]
pub enum FailureStep {
    #[display("SELL_PHASE_GUARD")]
    SellPhaseGuard,
    #[display("EQUITY_CIRCUIT_BREAKER")]
    EquityCircuitBreaker,
    #[display("run_lookup")]
    RunLookup,
    #[display("aggregation")]
    Aggregation,
}

/// Top-level error taxonomy a handler (worker, phase coordinator, aggregator) can observe.
/// Every variant maps onto exactly one outcome: a validation-failure ack, a retried broker call,
/// a typed trade failure, or a `WorkflowFailed` with a `FailureStep`. A handler MUST NOT let any
/// of these escape without writing a terminal row or emitting `WorkflowFailed` - that is the
/// contract every call site in `worker`, `phase`, and `aggregator` upholds.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("envelope failed validation: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("run {0} guard tripped at {1}")]
    GuardTrip(String, FailureStep),

    #[error("run {0} not found during {1}")]
    RunLookup(String, FailureStep),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl CoreError {
    /// Maps this error onto the `failure_step` a `WorkflowFailed` event should carry, where one
    /// applies. Validation/market-data/broker errors resolve to a per-trade failure instead and
    /// have no `FailureStep` of their own.
    pub fn failure_step(&self) -> Option<FailureStep> {
        match self {
            CoreError::GuardTrip(_, step) | CoreError::RunLookup(_, step) => Some(*step),
            _ => None,
        }
    }
}
