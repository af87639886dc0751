//! Redis-backed [`RunStore`]. Rows are stored as JSON strings; every conditional mutation runs
//! as a single [`redis::Script`] so the read-check-write sequence is atomic from Redis's
//! perspective without needing `WATCH`/`MULTI`.

use super::{CreateOutcome, EquityCheckResult, RunStore};
use crate::error::StoreError;
use crate::model::{CompletionSnapshot, Phase, Run, RunStatus, Trade, TradeOutcome, TradeStatus};
use async_trait::async_trait;
use coordinator_integration::ids::{RunId, TradeId};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use rust_decimal::Decimal;

fn run_key(run_id: &RunId) -> String {
    format!("coordinator:run:{{{}}}", run_id.as_str())
}

fn trade_key(run_id: &RunId, trade_id: &TradeId) -> String {
    format!("coordinator:run:{{{}}}:trade:{}", run_id.as_str(), trade_id.as_str())
}

fn trade_index_key(run_id: &RunId) -> String {
    format!("coordinator:run:{{{}}}:trades", run_id.as_str())
}

/// `redis::Script` that performs `SETNX`-then-read, giving us `Created`/`AlreadyExists` in one
/// round trip instead of racing a `GET` against a `SET NX`.
const CREATE_RUN_SCRIPT: &str = r#"
if redis.call("EXISTS", KEYS[1]) == 1 then
    return 0
end
redis.call("SET", KEYS[1], ARGV[1])
return 1
"#;

/// Conditional status transition: only write the new payload if the row's `status` field in the
/// previous JSON blob equalled `ARGV[2]`.
const MARK_TRADE_STARTED_SCRIPT: &str = r#"
local existing = redis.call("GET", KEYS[1])
if not existing then
    return 0
end
local trade = cjson.decode(existing)
if trade["status"] ~= ARGV[2] then
    return 0
end
trade["status"] = "Running"
redis.call("SET", KEYS[1], cjson.encode(trade))
return 1
"#;

const TRANSITION_TO_BUY_PHASE_SCRIPT: &str = r#"
local existing = redis.call("GET", KEYS[1])
if not existing then
    return 0
end
local run = cjson.decode(existing)
if run["phase"] ~= "Sell" then
    return 0
end
run["phase"] = "Buy"
redis.call("SET", KEYS[1], cjson.encode(run))
return 1
"#;

const TRY_CLAIM_AGGREGATION_SCRIPT: &str = r#"
local existing = redis.call("GET", KEYS[1])
if not existing then
    return 0
end
local run = cjson.decode(existing)
if run["aggregation_claimed"] then
    return 0
end
run["aggregation_claimed"] = true
run["status"] = "Aggregating"
redis.call("SET", KEYS[1], cjson.encode(run))
return 1
"#;

/// Compare-and-swap used by [`RedisRunStore::mark_trade_completed`]: the run and trade rows'
/// decimal accumulators are computed in Rust (never in Lua, which would force them through an
/// imprecise `tonumber`), so the script's only job is to apply both writes atomically iff neither
/// key has changed since the caller read them. A mismatch means another worker completed a
/// different trade in the same run concurrently; the caller re-reads and retries.
const CAS_TRADE_AND_RUN_SCRIPT: &str = r#"
local cur_run = redis.call("GET", KEYS[1])
local cur_trade = redis.call("GET", KEYS[2])
if cur_run ~= ARGV[1] or cur_trade ~= ARGV[3] then
    return 0
end
redis.call("SET", KEYS[1], ARGV[2])
redis.call("SET", KEYS[2], ARGV[4])
return 1
"#;

/// Bounds the compare-and-swap retry loop in [`RedisRunStore::mark_trade_completed`]. Contention
/// this deep would mean dozens of workers completing trades for the same run in the same instant;
/// treated as a backend fault rather than looping forever.
const MAX_CAS_ATTEMPTS: u32 = 25;

pub struct RedisRunStore {
    conn: ConnectionManager,
}

impl RedisRunStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl RunStore for RedisRunStore {
    async fn create_run(&self, run: Run) -> Result<CreateOutcome, StoreError> {
        let payload = serde_json::to_string(&run).map_err(|e| StoreError::Backend(e.to_string()))?;
        let created: i32 = Script::new(CREATE_RUN_SCRIPT)
            .key(run_key(&run.run_id))
            .arg(payload)
            .invoke_async(&mut self.conn())
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(if created == 1 {
            CreateOutcome::Created
        } else {
            CreateOutcome::AlreadyExists
        })
    }

    async fn put_trades(&self, run_id: &RunId, trades: Vec<Trade>) -> Result<(), StoreError> {
        let mut conn = self.conn();
        for trade in trades {
            let payload = serde_json::to_string(&trade).map_err(|e| StoreError::Backend(e.to_string()))?;
            let _: () = conn
                .set(trade_key(run_id, &trade.trade_id), payload)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let _: () = conn
                .sadd(trade_index_key(run_id), trade.trade_id.as_str())
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        let raw: Option<String> = self
            .conn()
            .get(run_key(run_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        raw.map(|s| serde_json::from_str(&s).map_err(|e| StoreError::Backend(e.to_string())))
            .transpose()
    }

    async fn get_trade(&self, run_id: &RunId, trade_id: &TradeId) -> Result<Option<Trade>, StoreError> {
        let raw: Option<String> = self
            .conn()
            .get(trade_key(run_id, trade_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        raw.map(|s| serde_json::from_str(&s).map_err(|e| StoreError::Backend(e.to_string())))
            .transpose()
    }

    async fn mark_trade_started(&self, run_id: &RunId, trade_id: &TradeId) -> Result<bool, StoreError> {
        let result: i32 = Script::new(MARK_TRADE_STARTED_SCRIPT)
            .key(trade_key(run_id, trade_id))
            .arg(format!("{:?}", TradeStatus::Running))
            .arg(format!("{:?}", TradeStatus::Pending))
            .invoke_async(&mut self.conn())
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result == 1)
    }

    async fn mark_trade_completed(
        &self,
        run_id: &RunId,
        trade_id: &TradeId,
        outcome: TradeOutcome,
        phase: Phase,
        amount: Decimal,
    ) -> Result<CompletionSnapshot, StoreError> {
        // The run row is shared, mutable state that every trade in the run writes to, so a plain
        // GET-modify-SET would lose updates whenever two workers complete different trades in the
        // same run concurrently - the ordinary case under this coordinator's worker pool. Retry
        // a compare-and-swap until our read of both rows is still current at write time, rather
        // than doing the arithmetic in a Lua script (which would force the decimal accumulators
        // through lossy `tonumber`).
        let mut conn = self.conn();

        for _ in 0..MAX_CAS_ATTEMPTS {
            let raw_trade: Option<String> = conn
                .get(trade_key(run_id, trade_id))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let raw_trade = raw_trade.ok_or_else(|| StoreError::NotFound(trade_id.as_str().to_owned()))?;
            let mut trade: Trade =
                serde_json::from_str(&raw_trade).map_err(|e| StoreError::Backend(e.to_string()))?;

            let raw_run: Option<String> = conn
                .get(run_key(run_id))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let raw_run = raw_run.ok_or_else(|| StoreError::NotFound(run_id.as_str().to_owned()))?;
            let mut run: Run = serde_json::from_str(&raw_run).map_err(|e| StoreError::Backend(e.to_string()))?;

            if trade.status.is_terminal() {
                return Ok(CompletionSnapshot {
                    current_phase: run.phase,
                    sell_total: run.sell_total,
                    sell_completed: run.sell_completed,
                    buy_total: run.buy_total,
                    completed_trades: run.completed_trades,
                    total_trades: run.total_trades,
                    sell_failed_amount: run.sell_failed_amount,
                    sell_succeeded_amount: run.sell_succeeded_amount,
                });
            }

            let is_sell = trade.is_sell();
            let new_status = if outcome.success || outcome.skipped {
                TradeStatus::Completed
            } else {
                TradeStatus::Failed
            };
            trade.status = new_status;
            trade.order_id = outcome.order_id.clone();
            trade.filled_shares = Some(outcome.shares);
            trade.fill_price = outcome.price;
            trade.error_message = outcome.error_message.clone();

            run.completed_trades += 1;
            if outcome.skipped {
                run.skipped_trades += 1;
            } else if new_status == TradeStatus::Completed {
                run.succeeded_trades += 1;
            } else {
                run.failed_trades += 1;
            }

            match phase {
                Phase::Sell => {
                    run.sell_completed += 1;
                    if is_sell {
                        if outcome.success && !outcome.skipped {
                            run.sell_succeeded_amount += amount;
                        } else if !outcome.success {
                            run.sell_failed_amount += amount;
                        }
                    }
                }
                Phase::Buy => {
                    run.buy_completed += 1;
                    if outcome.success {
                        run.buy_succeeded_amount += amount;
                    }
                }
                Phase::All => {
                    if is_sell {
                        run.sell_completed += 1;
                        if outcome.success && !outcome.skipped {
                            run.sell_succeeded_amount += amount;
                        } else if !outcome.success {
                            run.sell_failed_amount += amount;
                        }
                    } else {
                        run.buy_completed += 1;
                        if outcome.success {
                            run.buy_succeeded_amount += amount;
                        }
                    }
                }
            }

            let trade_payload = serde_json::to_string(&trade).map_err(|e| StoreError::Backend(e.to_string()))?;
            let run_payload = serde_json::to_string(&run).map_err(|e| StoreError::Backend(e.to_string()))?;

            let applied: i32 = Script::new(CAS_TRADE_AND_RUN_SCRIPT)
                .key(run_key(run_id))
                .key(trade_key(run_id, trade_id))
                .arg(&raw_run)
                .arg(&run_payload)
                .arg(&raw_trade)
                .arg(&trade_payload)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;

            if applied == 1 {
                return Ok(CompletionSnapshot {
                    current_phase: run.phase,
                    sell_total: run.sell_total,
                    sell_completed: run.sell_completed,
                    buy_total: run.buy_total,
                    completed_trades: run.completed_trades,
                    total_trades: run.total_trades,
                    sell_failed_amount: run.sell_failed_amount,
                    sell_succeeded_amount: run.sell_succeeded_amount,
                });
            }
            // Lost the race against a concurrent writer; re-read and retry.
        }

        Err(StoreError::Backend(format!(
            "mark_trade_completed: exceeded {MAX_CAS_ATTEMPTS} CAS attempts for run {}",
            run_id.as_str()
        )))
    }

    async fn get_pending_buy_trades(&self, run_id: &RunId) -> Result<Vec<Trade>, StoreError> {
        let all = self.get_all_trade_results(run_id).await?;
        Ok(all
            .into_iter()
            .filter(|t| t.is_buy() && t.status == TradeStatus::Buffered)
            .collect())
    }

    async fn mark_buy_trades_pending(&self, run_id: &RunId, trade_ids: &[TradeId]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        for trade_id in trade_ids {
            let raw: Option<String> = conn
                .get(trade_key(run_id, trade_id))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let Some(raw) = raw else { continue };
            let mut trade: Trade = serde_json::from_str(&raw).map_err(|e| StoreError::Backend(e.to_string()))?;
            if trade.status == TradeStatus::Buffered {
                trade.status = TradeStatus::Pending;
                let payload = serde_json::to_string(&trade).map_err(|e| StoreError::Backend(e.to_string()))?;
                let _: () = conn
                    .set(trade_key(run_id, trade_id), payload)
                    .await
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn transition_to_buy_phase(&self, run_id: &RunId) -> Result<bool, StoreError> {
        let result: i32 = Script::new(TRANSITION_TO_BUY_PHASE_SCRIPT)
            .key(run_key(run_id))
            .invoke_async(&mut self.conn())
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result == 1)
    }

    async fn try_claim_aggregation(&self, run_id: &RunId) -> Result<bool, StoreError> {
        let result: i32 = Script::new(TRY_CLAIM_AGGREGATION_SCRIPT)
            .key(run_key(run_id))
            .invoke_async(&mut self.conn())
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result == 1)
    }

    async fn check_equity_circuit_breaker(
        &self,
        run_id: &RunId,
        proposed_buy_value: Decimal,
    ) -> Result<EquityCheckResult, StoreError> {
        let run = self
            .get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(run_id.as_str().to_owned()))?;
        let cumulative = run.buy_succeeded_amount;
        let cap = run.max_equity_limit;
        Ok(EquityCheckResult {
            allowed: cumulative + proposed_buy_value <= cap,
            cumulative_buy_succeeded_value: cumulative,
            max_equity_limit: cap,
        })
    }

    async fn get_all_trade_results(&self, run_id: &RunId) -> Result<Vec<Trade>, StoreError> {
        let mut conn = self.conn();
        let trade_ids: Vec<String> = conn
            .smembers(trade_index_key(run_id))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut trades = Vec::with_capacity(trade_ids.len());
        for id in trade_ids {
            let raw: Option<String> = conn
                .get(trade_key(run_id, &TradeId::new(id.clone())))
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            if let Some(raw) = raw {
                trades.push(serde_json::from_str(&raw).map_err(|e| StoreError::Backend(e.to_string()))?);
            }
        }
        Ok(trades)
    }

    async fn mark_run_completed(&self, run_id: &RunId) -> Result<(), StoreError> {
        self.update_run_status(run_id, RunStatus::Completed).await
    }

    async fn mark_run_failed(&self, run_id: &RunId, reason: String) -> Result<(), StoreError> {
        let mut run = self
            .get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(run_id.as_str().to_owned()))?;
        run.status = RunStatus::Failed;
        run.failure_reason = Some(reason);
        let payload = serde_json::to_string(&run).map_err(|e| StoreError::Backend(e.to_string()))?;
        let _: () = self
            .conn()
            .set(run_key(run_id), payload)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn update_run_status(&self, run_id: &RunId, status: RunStatus) -> Result<(), StoreError> {
        let mut run = self
            .get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(run_id.as_str().to_owned()))?;
        run.status = status;
        let payload = serde_json::to_string(&run).map_err(|e| StoreError::Backend(e.to_string()))?;
        let _: () = self
            .conn()
            .set(run_key(run_id), payload)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
