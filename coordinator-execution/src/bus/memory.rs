//! In-process [`EventBus`] over `tokio::sync::mpsc` channels, built on the same `Tx`/`Rx`
//! primitives the rest of the coordinator ecosystem uses for in-process plumbing. Used in tests
//! and for single-process deployments.

use super::{EventBus, EventHandler};
use crate::error::BusError;
use async_trait::async_trait;
use coordinator_integration::channel::UnboundedTx;
use coordinator_integration::EventEnvelope;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, warn};

type Envelope = EventEnvelope<Value>;

struct Topic {
    tx: UnboundedTx<Envelope, BusError>,
    rx: Arc<Mutex<tokio::sync::mpsc::UnboundedReceiver<Envelope>>>,
}

#[derive(Default)]
pub struct InMemoryEventBus {
    topics: RwLock<HashMap<String, Topic>>,
    dead_letters: RwLock<Vec<(String, Envelope)>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, name: &str) -> UnboundedTx<Envelope, BusError> {
        let mut topics = self.topics.write();
        if let Some(topic) = topics.get(name) {
            return topic.tx.clone();
        }
        let (raw_tx, raw_rx) = tokio::sync::mpsc::unbounded_channel::<Envelope>();
        let stored_tx = UnboundedTx::new(raw_tx.clone());
        let returned_tx = UnboundedTx::new(raw_tx);
        topics.insert(
            name.to_owned(),
            Topic {
                tx: stored_tx,
                rx: Arc::new(Mutex::new(raw_rx)),
            },
        );
        returned_tx
    }

    /// Test/diagnostic visibility into messages that exhausted their retry budget.
    pub fn dead_letters(&self) -> Vec<(String, Envelope)> {
        self.dead_letters.read().clone()
    }

    /// Non-blocking drain of the next envelope queued for `topic`, for tests that drive a
    /// component directly rather than through [`EventBus::run_consumer`]'s handler loop.
    pub async fn try_recv(&self, topic: &str) -> Option<Envelope> {
        self.topic(topic);
        let rx = {
            let topics = self.topics.read();
            topics.get(topic).expect("topic created above").rx.clone()
        };
        let mut rx = rx.lock().await;
        rx.try_recv().ok()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, envelope: Envelope) -> Result<(), BusError> {
        // `UnboundedTx`'s blanket `Tx` impl needs `Error: Clone`, which `BusError` cannot be
        // (it embeds `serde_json::Error`) - send through the raw channel instead.
        self.topic(topic).tx.send(envelope).map_err(BusError::from)
    }

    async fn run_consumer(
        &self,
        topic: &str,
        handler: Arc<dyn EventHandler>,
        max_retries: u32,
    ) -> Result<(), BusError> {
        // Ensure the topic exists even if nothing has published to it yet.
        self.topic(topic);
        let rx = {
            let topics = self.topics.read();
            topics.get(topic).expect("topic created above").rx.clone()
        };

        loop {
            let envelope = {
                let mut rx = rx.lock().await;
                match rx.recv().await {
                    Some(envelope) => envelope,
                    None => return Ok(()),
                }
            };

            let mut attempt = 0;
            loop {
                match handler.handle(topic, envelope.clone()).await {
                    Ok(()) => break,
                    Err(err) if attempt < max_retries => {
                        attempt += 1;
                        warn!(topic, attempt, error = %err, "retrying envelope after handler error");
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                    Err(err) => {
                        error!(topic, event_id = %envelope.event_id, error = %err, "routing envelope to dead letter sink");
                        self.dead_letters.write().push((topic.to_owned(), envelope.clone()));
                        break;
                    }
                }
            }
        }
    }
}

/// Fixed inter-retry delay used by in-process consumers that don't provide their own backoff.
pub const RETRY_DELAY: Duration = Duration::from_millis(50);
