#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Coordinator-Integration
//! Low-level framework shared by every component of the distributed execution coordinator:
//! a `Tx`/`Rx` channel abstraction, a generic transport error, and the
//! [`EventEnvelope`] that every published event is wrapped in.
//!
//! This crate carries no trading-domain semantics - it is low-level plumbing shared by every
//! other crate in the workspace.

use chrono::{DateTime, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Defines a [`Tx`](channel::Tx) abstraction over different channel kinds, as well as other
/// channel utilities (eg/ `UnboundedTx`, `ChannelTxDroppable`).
pub mod channel;

/// All [`Error`](std::error::Error)s generated in Coordinator-Integration.
pub mod error;

/// Newtype identifiers shared by every component (`RunId`, `TradeId`, `CorrelationId`, ...).
pub mod ids;

/// Every event published onto the bus carries these fields exactly once,
/// regardless of which component emits it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct EventEnvelope<Payload> {
    /// Unique identifier for this event.
    pub event_id: Uuid,
    /// Discriminant naming the event kind (eg/ "TradeExecuted").
    pub event_type: String,
    /// Propagated end-to-end through a run so every log line and event can be correlated.
    pub correlation_id: ids::CorrelationId,
    /// The event or message that produced this one.
    pub causation_id: ids::CausationId,
    pub timestamp: DateTime<Utc>,
    pub source_module: String,
    pub source_component: String,
    pub payload: Payload,
}

impl<Payload> EventEnvelope<Payload> {
    /// `event_type`/`source_module`/`source_component` are owned rather than `&'static str`
    /// because every envelope is round-tripped through JSON over the wire (Redis Streams, the
    /// in-memory channel's serialised test harness) and deserialised back into this same type -
    /// a borrowed `'static` field cannot be produced by a generic `Deserialize` impl.
    pub fn wrap(
        event_type: impl Into<String>,
        correlation_id: ids::CorrelationId,
        causation_id: ids::CausationId,
        source_module: impl Into<String>,
        source_component: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            correlation_id,
            causation_id,
            timestamp: Utc::now(),
            source_module: source_module.into(),
            source_component: source_component.into(),
            payload,
        }
    }
}
