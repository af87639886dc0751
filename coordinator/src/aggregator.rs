//! Run Aggregator: triggered by every `TradeExecuted`, emits exactly one `AllTradesCompleted`
//! per run once every trade has reached a terminal status.

use crate::error::FailureStep;
use crate::event::{AllTradesCompleted, CoreEvent, TradeExecuted, WorkflowFailed};
use crate::fetch_lock::publish;
use coordinator_execution::bus::EventBus;
use coordinator_execution::model::{RunStatus, TradeStatus};
use coordinator_execution::ports::{BrokerPort, PnlServicePort};
use coordinator_execution::store::RunStore;
use coordinator_integration::ids::CausationId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct RunAggregator {
    store: Arc<dyn RunStore>,
    bus: Arc<dyn EventBus>,
    broker: Arc<dyn BrokerPort>,
    pnl: Arc<dyn PnlServicePort>,
    outcome_topic: &'static str,
}

impl RunAggregator {
    pub fn new(
        store: Arc<dyn RunStore>,
        bus: Arc<dyn EventBus>,
        broker: Arc<dyn BrokerPort>,
        pnl: Arc<dyn PnlServicePort>,
        outcome_topic: &'static str,
    ) -> Self {
        Self {
            store,
            bus,
            broker,
            pnl,
            outcome_topic,
        }
    }

    /// Checks whether this run just became fully terminal, claims the right to aggregate it, and
    /// if so publishes the run's single `AllTradesCompleted` summary.
    pub async fn on_trade_executed(&self, event: &TradeExecuted) {
        let run_id = &event.run_id;

        let run = match self.store.get_run(run_id).await {
            Ok(Some(run)) if run.total_trades > 0 => run,
            Ok(_) => {
                warn!(run_id = run_id.as_str(), "aggregation orphan: run row missing or empty");
                self.emit_failure(run_id, FailureStep::RunLookup, serde_json::json!({})).await;
                return;
            }
            Err(err) => {
                warn!(run_id = run_id.as_str(), error = %err, "run lookup failed during aggregation");
                self.emit_failure(run_id, FailureStep::RunLookup, serde_json::json!({ "error": err.to_string() }))
                    .await;
                return;
            }
        };

        if run.completed_trades < run.total_trades {
            return; // wait for more TradeExecuted events
        }

        if run.status == RunStatus::Failed {
            // A guard trip (SELL_PHASE_GUARD or EQUITY_CIRCUIT_BREAKER) already marked the run
            // FAILED and emitted its own WorkflowFailed. Per §4.6 step 7, a FAILED run falls
            // through here rather than also claiming aggregation - a run emits exactly one of
            // AllTradesCompleted or WorkflowFailed, never both.
            return;
        }

        match self.store.try_claim_aggregation(run_id).await {
            Ok(true) => {}
            Ok(false) => return, // another invocation already aggregating
            Err(err) => {
                warn!(run_id = run_id.as_str(), error = %err, "aggregation claim failed");
                return;
            }
        }

        if let Err(err) = self.aggregate_and_emit(run_id).await {
            warn!(run_id = run_id.as_str(), error = %err, "aggregation failed after claiming the run");
            let _ = self.store.mark_run_failed(run_id, err.clone()).await;
            self.emit_failure(run_id, FailureStep::Aggregation, serde_json::json!({ "error": err })).await;
        }
    }

    async fn aggregate_and_emit(&self, run_id: &coordinator_integration::ids::RunId) -> Result<(), String> {
        let run = self
            .store
            .get_run(run_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "run disappeared mid-aggregation".to_owned())?;
        let trades = self.store.get_all_trade_results(run_id).await.map_err(|e| e.to_string())?;

        let mut failed_symbols = Vec::new();
        let mut strategy_counts: HashMap<String, u32> = HashMap::new();
        for trade in &trades {
            if trade.status == TradeStatus::Failed {
                failed_symbols.push(trade.symbol.clone());
            }
            *strategy_counts.entry(trade.strategy_id.clone()).or_insert(0) += 1;
        }

        let portfolio_snapshot = match self.broker.get_positions().await {
            Ok(positions) => serde_json::to_value(positions).unwrap_or(serde_json::Value::Null),
            Err(err) => {
                warn!(run_id = run_id.as_str(), error = %err, "portfolio snapshot unavailable, degrading to empty");
                serde_json::Value::Null
            }
        };

        let pnl = match self.pnl.get_monthly_pnl().await {
            Ok(snapshot) => serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null),
            Err(err) => {
                warn!(run_id = run_id.as_str(), error = %err, "P&L snapshot unavailable, degrading to empty");
                serde_json::Value::Null
            }
        };

        let event = CoreEvent::AllTradesCompleted(AllTradesCompleted {
            run_id: run_id.clone(),
            total_trades: run.total_trades,
            succeeded_trades: run.succeeded_trades,
            failed_trades: run.failed_trades,
            skipped_trades: run.skipped_trades,
            failed_symbols,
            portfolio_snapshot,
            pnl,
            strategy_attribution: serde_json::to_value(strategy_counts).unwrap_or(serde_json::Value::Null),
            timings: serde_json::json!({ "aggregated_at": chrono::Utc::now() }),
        });

        publish(
            self.bus.as_ref(),
            self.outcome_topic,
            run.correlation_id.clone(),
            CausationId::Root,
            "run_aggregator",
            event,
        )
        .await
        .map_err(|e| e.to_string())?;

        self.store.mark_run_completed(run_id).await.map_err(|e| e.to_string())?;
        info!(run_id = run_id.as_str(), "AllTradesCompleted emitted, run marked COMPLETED");
        Ok(())
    }

    async fn emit_failure(
        &self,
        run_id: &coordinator_integration::ids::RunId,
        step: FailureStep,
        error_details: serde_json::Value,
    ) {
        let event = CoreEvent::WorkflowFailed(WorkflowFailed {
            run_id: run_id.clone(),
            failure_step: step,
            error_details,
        });
        if let Err(err) = publish(
            self.bus.as_ref(),
            self.outcome_topic,
            coordinator_integration::ids::CorrelationId::new(run_id.as_str().to_owned()),
            CausationId::Root,
            "run_aggregator",
            event,
        )
        .await
        {
            warn!(run_id = run_id.as_str(), error = %err, "failed to publish aggregation WorkflowFailed");
        }
    }
}
