//! In-process [`RunStore`] backed by a [`parking_lot::RwLock`]. Used in unit and integration
//! tests, and as a viable single-process deployment backend when a Redis cluster is overkill.

use super::{CreateOutcome, EquityCheckResult, RunStore};
use crate::error::StoreError;
use crate::model::{CompletionSnapshot, Phase, Run, RunStatus, Trade, TradeOutcome, TradeStatus};
use async_trait::async_trait;
use coordinator_integration::ids::{RunId, TradeId};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

struct RunRecord {
    run: Run,
    trades: HashMap<String, Trade>,
}

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<String, RunRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create_run(&self, run: Run) -> Result<CreateOutcome, StoreError> {
        let mut runs = self.runs.write();
        if runs.contains_key(run.run_id.as_str()) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        runs.insert(
            run.run_id.as_str().to_owned(),
            RunRecord {
                run,
                trades: HashMap::new(),
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn put_trades(&self, run_id: &RunId, trades: Vec<Trade>) -> Result<(), StoreError> {
        let mut runs = self.runs.write();
        let record = runs
            .get_mut(run_id.as_str())
            .ok_or_else(|| StoreError::NotFound(run_id.as_str().to_owned()))?;
        for trade in trades {
            record.trades.insert(trade.trade_id.as_str().to_owned(), trade);
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        Ok(self.runs.read().get(run_id.as_str()).map(|r| r.run.clone()))
    }

    async fn get_trade(&self, run_id: &RunId, trade_id: &TradeId) -> Result<Option<Trade>, StoreError> {
        Ok(self
            .runs
            .read()
            .get(run_id.as_str())
            .and_then(|r| r.trades.get(trade_id.as_str()))
            .cloned())
    }

    async fn mark_trade_started(&self, run_id: &RunId, trade_id: &TradeId) -> Result<bool, StoreError> {
        let mut runs = self.runs.write();
        let Some(record) = runs.get_mut(run_id.as_str()) else {
            return Ok(false);
        };
        let Some(trade) = record.trades.get_mut(trade_id.as_str()) else {
            return Ok(false);
        };
        if trade.status != TradeStatus::Pending {
            return Ok(false);
        }
        trade.status = TradeStatus::Running;
        Ok(true)
    }

    async fn mark_trade_completed(
        &self,
        run_id: &RunId,
        trade_id: &TradeId,
        outcome: TradeOutcome,
        phase: Phase,
        amount: Decimal,
    ) -> Result<CompletionSnapshot, StoreError> {
        let mut runs = self.runs.write();
        let record = runs
            .get_mut(run_id.as_str())
            .ok_or_else(|| StoreError::NotFound(run_id.as_str().to_owned()))?;
        let trade = record
            .trades
            .get_mut(trade_id.as_str())
            .ok_or_else(|| StoreError::NotFound(trade_id.as_str().to_owned()))?;

        if !trade.status.is_terminal() {
            let is_sell = trade.is_sell();
            let new_status = if outcome.skipped {
                TradeStatus::Completed
            } else if outcome.success {
                TradeStatus::Completed
            } else {
                TradeStatus::Failed
            };

            trade.status = new_status;
            trade.order_id = outcome.order_id.clone();
            trade.filled_shares = Some(outcome.shares);
            trade.fill_price = outcome.price;
            trade.error_message = outcome.error_message.clone();
            if outcome.success {
                trade.filled_at = Some(chrono::Utc::now());
            }

            let run = &mut record.run;
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
        }

        let run = &record.run;
        Ok(CompletionSnapshot {
            current_phase: run.phase,
            sell_total: run.sell_total,
            sell_completed: run.sell_completed,
            buy_total: run.buy_total,
            completed_trades: run.completed_trades,
            total_trades: run.total_trades,
            sell_failed_amount: run.sell_failed_amount,
            sell_succeeded_amount: run.sell_succeeded_amount,
        })
    }

    async fn get_pending_buy_trades(&self, run_id: &RunId) -> Result<Vec<Trade>, StoreError> {
        let runs = self.runs.read();
        let Some(record) = runs.get(run_id.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(record
            .trades
            .values()
            .filter(|t| t.is_buy() && t.status == TradeStatus::Buffered)
            .cloned()
            .collect())
    }

    async fn mark_buy_trades_pending(&self, run_id: &RunId, trade_ids: &[TradeId]) -> Result<(), StoreError> {
        let mut runs = self.runs.write();
        let record = runs
            .get_mut(run_id.as_str())
            .ok_or_else(|| StoreError::NotFound(run_id.as_str().to_owned()))?;
        for trade_id in trade_ids {
            if let Some(trade) = record.trades.get_mut(trade_id.as_str()) {
                if trade.status == TradeStatus::Buffered {
                    trade.status = TradeStatus::Pending;
                }
            }
        }
        Ok(())
    }

    async fn transition_to_buy_phase(&self, run_id: &RunId) -> Result<bool, StoreError> {
        let mut runs = self.runs.write();
        let Some(record) = runs.get_mut(run_id.as_str()) else {
            return Ok(false);
        };
        if record.run.phase != Phase::Sell {
            return Ok(false);
        }
        record.run.phase = Phase::Buy;
        Ok(true)
    }

    async fn try_claim_aggregation(&self, run_id: &RunId) -> Result<bool, StoreError> {
        let mut runs = self.runs.write();
        let Some(record) = runs.get_mut(run_id.as_str()) else {
            return Ok(false);
        };
        if record.run.aggregation_claimed {
            return Ok(false);
        }
        record.run.status = RunStatus::Aggregating;
        record.run.aggregation_claimed = true;
        Ok(true)
    }

    async fn check_equity_circuit_breaker(
        &self,
        run_id: &RunId,
        proposed_buy_value: Decimal,
    ) -> Result<EquityCheckResult, StoreError> {
        let runs = self.runs.read();
        let record = runs
            .get(run_id.as_str())
            .ok_or_else(|| StoreError::NotFound(run_id.as_str().to_owned()))?;
        let cumulative = record.run.buy_succeeded_amount;
        let cap = record.run.max_equity_limit;
        Ok(EquityCheckResult {
            allowed: cumulative + proposed_buy_value <= cap,
            cumulative_buy_succeeded_value: cumulative,
            max_equity_limit: cap,
        })
    }

    async fn get_all_trade_results(&self, run_id: &RunId) -> Result<Vec<Trade>, StoreError> {
        let runs = self.runs.read();
        let Some(record) = runs.get(run_id.as_str()) else {
            return Ok(Vec::new());
        };
        Ok(record.trades.values().cloned().collect())
    }

    async fn mark_run_completed(&self, run_id: &RunId) -> Result<(), StoreError> {
        let mut runs = self.runs.write();
        if let Some(record) = runs.get_mut(run_id.as_str()) {
            record.run.status = RunStatus::Completed;
        }
        Ok(())
    }

    async fn mark_run_failed(&self, run_id: &RunId, reason: String) -> Result<(), StoreError> {
        let mut runs = self.runs.write();
        if let Some(record) = runs.get_mut(run_id.as_str()) {
            record.run.status = RunStatus::Failed;
            record.run.failure_reason = Some(reason);
        }
        Ok(())
    }

    async fn update_run_status(&self, run_id: &RunId, status: RunStatus) -> Result<(), StoreError> {
        let mut runs = self.runs.write();
        if let Some(record) = runs.get_mut(run_id.as_str()) {
            record.run.status = status;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;
    use coordinator_integration::ids::CorrelationId;
    use rust_decimal_macros::dec;

    fn sample_run(run_id: &str) -> Run {
        Run {
            run_id: RunId::new(run_id.to_owned()),
            plan_id: "plan-1".into(),
            correlation_id: CorrelationId::new("corr-1".into()),
            total_trades: 2,
            sell_total: 1,
            buy_total: 1,
            completed_trades: 0,
            sell_completed: 0,
            buy_completed: 0,
            succeeded_trades: 0,
            failed_trades: 0,
            skipped_trades: 0,
            sell_failed_amount: Decimal::ZERO,
            sell_succeeded_amount: Decimal::ZERO,
            buy_succeeded_amount: Decimal::ZERO,
            max_equity_limit: dec!(1_000_000),
            phase: Phase::Sell,
            status: RunStatus::Running,
            aggregation_claimed: false,
            strategy_metadata: serde_json::json!({}),
            data_freshness: serde_json::json!({}),
            plan_summary: serde_json::json!({}),
            created_at: chrono::Utc::now(),
            failure_reason: None,
        }
    }

    fn sample_trade(run_id: &str, trade_id: &str, action: Action, phase: Phase) -> Trade {
        Trade {
            trade_id: TradeId::new(trade_id.to_owned()),
            run_id: RunId::new(run_id.to_owned()),
            symbol: "SPY".into(),
            action,
            phase,
            trade_amount: dec!(1000),
            shares: None,
            estimated_price: None,
            target_weight: Decimal::ZERO,
            is_full_liquidation: false,
            strategy_id: "s1".into(),
            correlation_id: CorrelationId::new("corr-1".into()),
            sequence_number: 0,
            status: TradeStatus::Pending,
            order_id: None,
            filled_shares: None,
            fill_price: None,
            filled_at: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn create_run_is_idempotent() {
        let store = InMemoryRunStore::new();
        let run_id = RunId::new("R1".into());
        assert_eq!(store.create_run(sample_run("R1")).await.unwrap(), CreateOutcome::Created);
        assert_eq!(
            store.create_run(sample_run("R1")).await.unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert!(store.get_run(&run_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mark_trade_started_transitions_only_from_pending() {
        let store = InMemoryRunStore::new();
        let run_id = RunId::new("R1".into());
        let trade_id = TradeId::new("T1".into());
        store.create_run(sample_run("R1")).await.unwrap();
        store
            .put_trades(&run_id, vec![sample_trade("R1", "T1", Action::Sell, Phase::Sell)])
            .await
            .unwrap();

        assert!(store.mark_trade_started(&run_id, &trade_id).await.unwrap());
        assert!(!store.mark_trade_started(&run_id, &trade_id).await.unwrap());
    }

    #[tokio::test]
    async fn mark_trade_completed_advances_counters_once() {
        let store = InMemoryRunStore::new();
        let run_id = RunId::new("R1".into());
        let trade_id = TradeId::new("T1".into());
        store.create_run(sample_run("R1")).await.unwrap();
        store
            .put_trades(&run_id, vec![sample_trade("R1", "T1", Action::Sell, Phase::Sell)])
            .await
            .unwrap();
        store.mark_trade_started(&run_id, &trade_id).await.unwrap();

        let outcome = TradeOutcome {
            success: true,
            order_id: Some("o1".into()),
            shares: dec!(10),
            price: Some(dec!(100)),
            error_message: None,
            skipped: false,
        };
        let snapshot = store
            .mark_trade_completed(&run_id, &trade_id, outcome.clone(), Phase::Sell, dec!(1000))
            .await
            .unwrap();
        assert_eq!(snapshot.sell_completed, 1);
        assert_eq!(snapshot.completed_trades, 1);
        assert_eq!(snapshot.sell_succeeded_amount, dec!(1000));

        // a second completion on an already-terminal row must not double-count
        let snapshot_again = store
            .mark_trade_completed(&run_id, &trade_id, outcome, Phase::Sell, dec!(1000))
            .await
            .unwrap();
        assert_eq!(snapshot_again.sell_completed, 1);
        assert_eq!(snapshot_again.completed_trades, 1);
    }

    #[tokio::test]
    async fn mark_trade_completed_counts_skipped_separately_from_succeeded() {
        let store = InMemoryRunStore::new();
        let run_id = RunId::new("R1".into());
        let trade_id = TradeId::new("T1".into());
        store.create_run(sample_run("R1")).await.unwrap();
        store
            .put_trades(&run_id, vec![sample_trade("R1", "T1", Action::Sell, Phase::Sell)])
            .await
            .unwrap();
        store.mark_trade_started(&run_id, &trade_id).await.unwrap();

        let outcome = TradeOutcome {
            success: true,
            order_id: None,
            shares: Decimal::ZERO,
            price: None,
            error_message: None,
            skipped: true,
        };
        store
            .mark_trade_completed(&run_id, &trade_id, outcome, Phase::Sell, dec!(1000))
            .await
            .unwrap();

        let run = store.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.skipped_trades, 1);
        assert_eq!(run.succeeded_trades, 0);
        assert_eq!(run.sell_succeeded_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn transition_to_buy_phase_succeeds_exactly_once() {
        let store = InMemoryRunStore::new();
        let run_id = RunId::new("R1".into());
        store.create_run(sample_run("R1")).await.unwrap();

        assert!(store.transition_to_buy_phase(&run_id).await.unwrap());
        assert!(!store.transition_to_buy_phase(&run_id).await.unwrap());
    }

    #[tokio::test]
    async fn try_claim_aggregation_succeeds_exactly_once() {
        let store = InMemoryRunStore::new();
        let run_id = RunId::new("R1".into());
        store.create_run(sample_run("R1")).await.unwrap();

        assert!(store.try_claim_aggregation(&run_id).await.unwrap());
        assert!(!store.try_claim_aggregation(&run_id).await.unwrap());
    }
}
