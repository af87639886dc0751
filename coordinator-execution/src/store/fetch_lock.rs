//! Per-symbol store backing the Fetch-Lock Coordinator (C3). Kept separate from
//! [`crate::store::RunStore`] because fetch locks are keyed by symbol, not by run - the only
//! piece of state in this system that is shared *across* runs.

use crate::error::StoreError;
use crate::model::FetchRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coordinator_integration::ids::CorrelationId;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;

/// Result of [`FetchLockStore::try_acquire`].
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireResult {
    Granted,
    Denied {
        existing_request_time: DateTime<Utc>,
        cooldown_remaining_seconds: i64,
    },
}

#[async_trait]
pub trait FetchLockStore: Send + Sync {
    /// Conditional put-or-update: succeeds iff no row exists for `symbol`, or the existing row's
    /// `cooldown_until <= now`. On success the row is (re)written with `cooldown_until = now +
    /// cooldown`.
    async fn try_acquire(
        &self,
        symbol: &str,
        stage: &str,
        component: &str,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<AcquireResult, StoreError>;

    /// Best-effort clear; never required for correctness because the cooldown time-bounds the
    /// lock regardless.
    async fn release(&self, symbol: &str, correlation_id: &CorrelationId) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct InMemoryFetchLockStore {
    rows: RwLock<HashMap<String, FetchRequest>>,
}

impl InMemoryFetchLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FetchLockStore for InMemoryFetchLockStore {
    async fn try_acquire(
        &self,
        symbol: &str,
        stage: &str,
        component: &str,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<AcquireResult, StoreError> {
        let mut rows = self.rows.write();
        if let Some(existing) = rows.get(symbol) {
            if existing.cooldown_until > now {
                return Ok(AcquireResult::Denied {
                    existing_request_time: existing.acquired_at,
                    cooldown_remaining_seconds: (existing.cooldown_until - now).num_seconds(),
                });
            }
        }
        rows.insert(
            symbol.to_owned(),
            FetchRequest {
                symbol: symbol.to_owned(),
                requesting_stage: stage.to_owned(),
                requesting_component: component.to_owned(),
                correlation_id: correlation_id.clone(),
                acquired_at: now,
                cooldown_until: now + cooldown,
            },
        );
        Ok(AcquireResult::Granted)
    }

    async fn release(&self, symbol: &str, _correlation_id: &CorrelationId) -> Result<(), StoreError> {
        self.rows.write().remove(symbol);
        Ok(())
    }
}

pub struct RedisFetchLockStore {
    conn: ConnectionManager,
}

impl RedisFetchLockStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn key(symbol: &str) -> String {
        format!("coordinator:fetch-lock:{symbol}")
    }
}

const TRY_ACQUIRE_SCRIPT: &str = r#"
local existing = redis.call("GET", KEYS[1])
if existing then
    local row = cjson.decode(existing)
    if tonumber(row["cooldown_until_epoch"]) > tonumber(ARGV[1]) then
        return existing
    end
end
redis.call("SET", KEYS[1], ARGV[2])
return false
"#;

#[async_trait]
impl FetchLockStore for RedisFetchLockStore {
    async fn try_acquire(
        &self,
        symbol: &str,
        stage: &str,
        component: &str,
        correlation_id: &CorrelationId,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<AcquireResult, StoreError> {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Row {
            requesting_stage: String,
            requesting_component: String,
            correlation_id: String,
            acquired_at_epoch: i64,
            cooldown_until_epoch: i64,
        }

        let new_row = Row {
            requesting_stage: stage.to_owned(),
            requesting_component: component.to_owned(),
            correlation_id: correlation_id.to_string(),
            acquired_at_epoch: now.timestamp(),
            cooldown_until_epoch: (now + cooldown).timestamp(),
        };
        let new_payload = serde_json::to_string(&new_row).map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::Script::new(TRY_ACQUIRE_SCRIPT)
            .key(Self::key(symbol))
            .arg(now.timestamp())
            .arg(new_payload)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        match reply {
            None => Ok(AcquireResult::Granted),
            Some(existing) => {
                let row: Row = serde_json::from_str(&existing).map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(AcquireResult::Denied {
                    existing_request_time: DateTime::from_timestamp(row.acquired_at_epoch, 0).unwrap_or(now),
                    cooldown_remaining_seconds: row.cooldown_until_epoch - now.timestamp(),
                })
            }
        }
    }

    async fn release(&self, symbol: &str, _correlation_id: &CorrelationId) -> Result<(), StoreError> {
        let _: () = self
            .conn
            .clone()
            .del(Self::key(symbol))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
