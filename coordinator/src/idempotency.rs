//! Idempotency key derivation and the in-process duplicate cache that sits ahead of a round trip
//! to the run state store.

use coordinator_execution::model::{Action, TradeStatus};
use coordinator_execution::store::RunStore;
use coordinator_integration::ids::{RunId, TradeId};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::warn;

/// Deterministic digest of `(run_id, trade_id, symbol, action)` - the same four fields always
/// produce the same key, so replays of the same execution message hash identically regardless of
/// which worker or how many times it is delivered.
pub fn idempotency_key(run_id: &RunId, trade_id: &TradeId, symbol: &str, action: Action) -> String {
    let mut hasher = Sha256::new();
    hasher.update(run_id.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(trade_id.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(symbol.as_bytes());
    hasher.update(b":");
    hasher.update(action.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// In-process cache of keys already observed as terminal, checked before ever touching the
/// store. A worker that has already processed a key in this process never round-trips C1 for it
/// again.
#[derive(Default)]
pub struct IdempotencyCache {
    seen: RwLock<HashSet<String>>,
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.read().contains(key)
    }

    pub fn mark_seen(&self, key: String) {
        self.seen.write().insert(key);
    }
}

/// Consults the in-process cache, then the store, to decide whether `(run_id, trade_id)` is
/// already terminal. On a store error this fails open - returns `false` (not a duplicate) -
/// blocking on a false negative here is worse than risking a duplicate the broker will itself
/// reject.
pub async fn is_already_terminal(
    cache: &IdempotencyCache,
    store: &dyn RunStore,
    run_id: &RunId,
    trade_id: &TradeId,
    key: &str,
) -> bool {
    if cache.contains(key) {
        return true;
    }

    match store.get_trade(run_id, trade_id).await {
        Ok(Some(trade)) if trade.status.is_terminal() => {
            cache.mark_seen(key.to_owned());
            true
        }
        Ok(Some(_)) | Ok(None) => false,
        Err(err) => {
            warn!(
                run_id = run_id.as_str(),
                trade_id = trade_id.as_str(),
                error = %err,
                "idempotency check against the store failed - proceeding (fail-open)"
            );
            false
        }
    }
}

/// Narrow helper used once a trade's outcome is durable, so later deliveries of the same message
/// short-circuit on the in-process cache without a store round trip at all.
pub fn mark_terminal(cache: &IdempotencyCache, key: String, status: TradeStatus) {
    if status.is_terminal() {
        cache.mark_seen(key);
    }
}
