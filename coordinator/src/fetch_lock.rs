//! Fetch-Lock Coordinator (C3): collapses concurrent "refresh symbol X" demands into a
//! single real fetch.

use crate::event::{CoreEvent, FetchRequestMessage, MarketDataFetchCompleted};
use coordinator_execution::error::BusError;
use coordinator_execution::ports::MarketDataRefreshPort;
use coordinator_execution::store::fetch_lock::{AcquireResult, FetchLockStore};
use coordinator_integration::ids::{CausationId, CorrelationId};
use std::sync::Arc;
use tracing::{info, warn};

pub struct FetchLockCoordinator<S, R> {
    store: Arc<S>,
    refresh: Arc<R>,
    cooldown_seconds: u64,
}

impl<S, R> FetchLockCoordinator<S, R>
where
    S: FetchLockStore,
    R: MarketDataRefreshPort,
{
    pub fn new(store: Arc<S>, refresh: Arc<R>, cooldown_seconds: u64) -> Self {
        Self {
            store,
            refresh,
            cooldown_seconds,
        }
    }

    /// Runs the fetch-lock admission protocol for one fetch-request message, returning the event
    /// to publish.
    pub async fn handle(&self, request: FetchRequestMessage) -> CoreEvent {
        let now = chrono::Utc::now();
        let cooldown = chrono::Duration::seconds(self.cooldown_seconds as i64);

        let acquired = self
            .store
            .try_acquire(
                &request.symbol,
                &request.requesting_stage,
                &request.requesting_component,
                &request.correlation_id,
                now,
                cooldown,
            )
            .await;

        match acquired {
            Ok(AcquireResult::Denied {
                existing_request_time,
                cooldown_remaining_seconds,
            }) => {
                info!(
                    symbol = %request.symbol,
                    correlation_id = %request.correlation_id,
                    cooldown_remaining_seconds,
                    "fetch-lock denied, deduplicating"
                );
                CoreEvent::MarketDataFetchCompleted(MarketDataFetchCompleted {
                    correlation_id: request.correlation_id,
                    symbol: request.symbol,
                    was_deduplicated: true,
                    bars_fetched: 0,
                    metadata: serde_json::json!({ "existing_request_time": existing_request_time }),
                })
            }
            Ok(AcquireResult::Granted) => match self.refresh.refresh_symbol(&request.symbol).await {
                Ok((success, metadata)) => {
                    if !success {
                        let _ = self.store.release(&request.symbol, &request.correlation_id).await;
                    }
                    CoreEvent::MarketDataFetchCompleted(MarketDataFetchCompleted {
                        correlation_id: request.correlation_id,
                        symbol: request.symbol,
                        was_deduplicated: false,
                        bars_fetched: if success { 1 } else { 0 },
                        metadata,
                    })
                }
                Err(err) => {
                    warn!(symbol = %request.symbol, error = %err, "market-data refresh failed, releasing fetch-lock");
                    let _ = self.store.release(&request.symbol, &request.correlation_id).await;
                    CoreEvent::MarketDataFetchCompleted(MarketDataFetchCompleted {
                        correlation_id: request.correlation_id,
                        symbol: request.symbol,
                        was_deduplicated: false,
                        bars_fetched: 0,
                        metadata: serde_json::json!({ "error": err.to_string() }),
                    })
                }
            },
            Err(err) => {
                warn!(symbol = %request.symbol, error = %err, "fetch-lock store error, treating as dedup");
                CoreEvent::MarketDataFetchCompleted(MarketDataFetchCompleted {
                    correlation_id: request.correlation_id,
                    symbol: request.symbol,
                    was_deduplicated: true,
                    bars_fetched: 0,
                    metadata: serde_json::json!({ "error": err.to_string() }),
                })
            }
        }
    }
}

/// Publishes a [`CoreEvent`] wrapped in the shared envelope, tagging it with the causing
/// correlation id. Shared by every handler in this crate.
pub async fn publish(
    bus: &dyn coordinator_execution::bus::EventBus,
    topic: &str,
    correlation_id: CorrelationId,
    causation_id: CausationId,
    source_component: &'static str,
    event: CoreEvent,
) -> Result<(), BusError> {
    let payload = serde_json::to_value(&event).map_err(|e| BusError::Backend(e.to_string()))?;
    let envelope = coordinator_integration::EventEnvelope::wrap(
        event.event_type(),
        correlation_id,
        causation_id,
        "coordinator",
        source_component,
        payload,
    );
    bus.publish(topic, envelope).await
}
