use derive_more::{Constructor, Display, From};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Opaque identifier for one execution of one rebalance plan.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From, Constructor,
)]
pub struct RunId(pub String);

impl RunId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque identifier for one trade intent, unique within its [`RunId`].
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From, Constructor,
)]
pub struct TradeId(pub String);

impl TradeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier propagated end-to-end through a run: every event and log line carries it so that
/// the full lifecycle of a rebalance can be traced across components.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From, Constructor,
)]
pub struct CorrelationId(pub String);

/// The event or message id that caused this event to be produced. `Root` marks an event with no
/// causal parent (eg/ the first SELL message a planner enqueues).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, From)]
pub enum CausationId {
    Root,
    Event(uuid::Uuid),
}
