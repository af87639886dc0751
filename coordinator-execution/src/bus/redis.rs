//! Redis Streams-backed [`EventBus`]. Publishing is a plain `XADD`; consumption uses a consumer
//! group so that multiple worker processes can share one topic's backlog, acknowledging
//! (`XACK`) on success and re-delivering (via `XPENDING`/`XCLAIM` in a full deployment) on
//! failure up to the retry bound before the message is copied onto a `{topic}:dead-letter`
//! stream and acknowledged off the main stream.

use super::{EventBus, EventHandler};
use crate::error::BusError;
use async_trait::async_trait;
use coordinator_integration::EventEnvelope;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

type Envelope = EventEnvelope<Value>;

const PAYLOAD_FIELD: &str = "payload";
const CONSUMER_GROUP: &str = "coordinator";

pub struct RedisEventBus {
    conn: ConnectionManager,
    consumer_name: String,
}

impl RedisEventBus {
    pub fn new(conn: ConnectionManager, consumer_name: impl Into<String>) -> Self {
        Self {
            conn,
            consumer_name: consumer_name.into(),
        }
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    async fn ensure_group(&self, topic: &str) -> Result<(), BusError> {
        let mut conn = self.conn();
        let created: Result<(), redis::RedisError> =
            conn.xgroup_create_mkstream(topic, CONSUMER_GROUP, "0").await;
        // BUSYGROUP is the expected error once the group already exists; anything else is real.
        if let Err(err) = created {
            if !err.to_string().contains("BUSYGROUP") {
                return Err(BusError::Backend(err.to_string()));
            }
        }
        Ok(())
    }

    fn dead_letter_stream(topic: &str) -> String {
        format!("{topic}:dead-letter")
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, topic: &str, envelope: Envelope) -> Result<(), BusError> {
        let payload = serde_json::to_string(&envelope).map_err(|e| BusError::Backend(e.to_string()))?;
        let _: String = self
            .conn()
            .xadd(topic, "*", &[(PAYLOAD_FIELD, payload)])
            .await
            .map_err(|e| BusError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn run_consumer(
        &self,
        topic: &str,
        handler: Arc<dyn EventHandler>,
        max_retries: u32,
    ) -> Result<(), BusError> {
        self.ensure_group(topic).await?;
        let mut conn = self.conn();
        let options = StreamReadOptions::default()
            .group(CONSUMER_GROUP, &self.consumer_name)
            .count(16)
            .block(5_000);

        loop {
            let reply: StreamReadReply = conn
                .xread_options(&[topic], &[">"], &options)
                .await
                .map_err(|e| BusError::Backend(e.to_string()))?;

            if reply.keys.is_empty() {
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }

            for key in reply.keys {
                for stream_id in key.ids {
                    let Some(raw) = stream_id.map.get(PAYLOAD_FIELD) else {
                        let _: i32 = conn.xack(topic, CONSUMER_GROUP, &[&stream_id.id]).await.unwrap_or(0);
                        continue;
                    };
                    let raw: String = redis::from_redis_value(raw).map_err(|e| BusError::Backend(e.to_string()))?;
                    let envelope: Envelope =
                        serde_json::from_str(&raw).map_err(|e| BusError::Backend(e.to_string()))?;

                    let mut attempt = 0;
                    loop {
                        match handler.handle(topic, envelope.clone()).await {
                            Ok(()) => {
                                let _: i32 = conn
                                    .xack(topic, CONSUMER_GROUP, &[&stream_id.id])
                                    .await
                                    .map_err(|e| BusError::Backend(e.to_string()))?;
                                break;
                            }
                            Err(_) if attempt < max_retries => {
                                attempt += 1;
                                tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                            }
                            Err(err) => {
                                let dead_payload = serde_json::to_string(&envelope)
                                    .map_err(|e| BusError::Backend(e.to_string()))?;
                                let _: String = conn
                                    .xadd(
                                        Self::dead_letter_stream(topic),
                                        "*",
                                        &[(PAYLOAD_FIELD, dead_payload.as_str()), ("reason", err.to_string().as_str())],
                                    )
                                    .await
                                    .map_err(|e| BusError::Backend(e.to_string()))?;
                                let _: i32 = conn
                                    .xack(topic, CONSUMER_GROUP, &[&stream_id.id])
                                    .await
                                    .map_err(|e| BusError::Backend(e.to_string()))?;
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}
