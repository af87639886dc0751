//! The Event Bus Adapter (C2): at-least-once delivery, unordered, with per-message retry
//! and a dead-letter sink on permanent failure. The core never assumes exactly-once delivery;
//! idempotency is enforced through the run state store instead.

pub mod memory;
pub mod redis;

use crate::error::BusError;
use async_trait::async_trait;
use coordinator_integration::EventEnvelope;
use serde_json::Value;
use std::sync::Arc;

/// Invoked once per delivered envelope by [`EventBus::run_consumer`]. An `Err` triggers a retry
/// up to the bus's configured bound; exhausting retries routes the message to the dead-letter
/// sink rather than blocking the rest of the batch.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, topic: &str, envelope: EventEnvelope<Value>) -> Result<(), BusError>;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Tags `envelope` with the envelope fields exactly once (the caller has already done
    /// this via [`EventEnvelope::wrap`]) and publishes it to `topic`.
    async fn publish(&self, topic: &str, envelope: EventEnvelope<Value>) -> Result<(), BusError>;

    /// Runs the consumer loop for `topic` until the bus is closed. A single poisoned message
    /// never blocks the rest of the batch: each envelope is retried independently up to
    /// `max_retries` times before being routed to the dead-letter sink.
    async fn run_consumer(
        &self,
        topic: &str,
        handler: Arc<dyn EventHandler>,
        max_retries: u32,
    ) -> Result<(), BusError>;
}
