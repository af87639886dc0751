//! Phase Coordinator (C5): triggered by every trade completion, decides whether the SELL
//! phase has closed out and, if so, whether to guard-trip the run or transition it to BUY.

use crate::error::FailureStep;
use crate::event::{CoreEvent, WorkflowFailed};
use crate::fetch_lock::publish;
use coordinator_execution::bus::EventBus;
use coordinator_execution::model::{CompletionSnapshot, Phase, RunStatus};
use coordinator_execution::store::RunStore;
use coordinator_integration::ids::{CausationId, CorrelationId, RunId, TradeId};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PhaseCoordinator {
    store: Arc<dyn RunStore>,
    bus: Arc<dyn EventBus>,
    sell_failure_threshold: Decimal,
    execution_topic: &'static str,
    outcome_topic: &'static str,
}

impl PhaseCoordinator {
    pub fn new(
        store: Arc<dyn RunStore>,
        bus: Arc<dyn EventBus>,
        sell_failure_threshold: Decimal,
        execution_topic: &'static str,
        outcome_topic: &'static str,
    ) -> Self {
        Self {
            store,
            bus,
            sell_failure_threshold,
            execution_topic,
            outcome_topic,
        }
    }

    /// Decides the outcome of one trade completion. Returns nothing to the caller - every outcome
    /// is either a no-op, a `WorkflowFailed` emission, or a BUY enqueue, and all of those are
    /// handled internally.
    pub async fn on_trade_completed(&self, run_id: &RunId, correlation_id: &CorrelationId, snapshot: CompletionSnapshot) {
        if snapshot.current_phase != Phase::Sell {
            return;
        }
        if !snapshot.sell_phase_complete() {
            return;
        }
        if snapshot.buy_total == 0 {
            return;
        }

        if snapshot.sell_failed_amount > self.sell_failure_threshold {
            self.trip_sell_phase_guard(run_id, correlation_id, snapshot).await;
            return;
        }

        self.transition_to_buy(run_id, correlation_id).await;
    }

    async fn trip_sell_phase_guard(&self, run_id: &RunId, correlation_id: &CorrelationId, snapshot: CompletionSnapshot) {
        if let Err(err) = self.store.update_run_status(run_id, RunStatus::Failed).await {
            warn!(run_id = run_id.as_str(), error = %err, "failed to mark run FAILED after SELL phase guard trip");
        }

        let event = CoreEvent::WorkflowFailed(WorkflowFailed {
            run_id: run_id.clone(),
            failure_step: FailureStep::SellPhaseGuard,
            error_details: serde_json::json!({
                "sell_failed_amount": snapshot.sell_failed_amount.to_string(),
                "buy_trades_blocked": snapshot.buy_total,
            }),
        });

        if let Err(err) = publish(
            self.bus.as_ref(),
            self.outcome_topic,
            correlation_id.clone(),
            CausationId::Root,
            "phase_coordinator",
            event,
        )
        .await
        {
            warn!(run_id = run_id.as_str(), error = %err, "failed to publish SELL_PHASE_GUARD WorkflowFailed");
        }
    }

    async fn transition_to_buy(&self, run_id: &RunId, correlation_id: &CorrelationId) {
        match self.store.transition_to_buy_phase(run_id).await {
            Ok(true) => {}
            Ok(false) => return, // another worker won the race
            Err(err) => {
                warn!(run_id = run_id.as_str(), error = %err, "BUY phase transition failed");
                return;
            }
        }

        let pending = match self.store.get_pending_buy_trades(run_id).await {
            Ok(trades) => trades,
            Err(err) => {
                warn!(run_id = run_id.as_str(), error = %err, "could not read BUFFERED trades for BUY transition");
                return;
            }
        };

        let mut enqueued_ids: Vec<TradeId> = Vec::with_capacity(pending.len());
        for trade in &pending {
            let msg = crate::event::ExecutionMessage {
                run_id: trade.run_id.clone(),
                trade_id: trade.trade_id.clone(),
                plan_id: String::new(),
                correlation_id: trade.correlation_id.clone(),
                symbol: trade.symbol.clone(),
                action: trade.action,
                phase: trade.phase,
                trade_amount: trade.trade_amount,
                shares: trade.shares,
                estimated_price: trade.estimated_price,
                target_weight: trade.target_weight,
                is_full_liquidation: trade.is_full_liquidation,
                strategy_id: trade.strategy_id.clone(),
                sequence_number: trade.sequence_number,
                metadata: serde_json::json!({}),
            };
            let payload = match serde_json::to_value(&msg) {
                Ok(p) => p,
                Err(err) => {
                    warn!(trade_id = trade.trade_id.as_str(), error = %err, "failed to serialise BUY enqueue message");
                    continue;
                }
            };
            let envelope = coordinator_integration::EventEnvelope::wrap(
                "ExecutionMessage",
                trade.correlation_id.clone(),
                CausationId::Root,
                "coordinator",
                "phase_coordinator",
                payload,
            );
            match self.bus.publish(self.execution_topic, envelope).await {
                Ok(()) => enqueued_ids.push(trade.trade_id.clone()),
                Err(err) => warn!(trade_id = trade.trade_id.as_str(), error = %err, "failed to enqueue BUY trade"),
            }
        }

        if let Err(err) = self.store.mark_buy_trades_pending(run_id, &enqueued_ids).await {
            warn!(run_id = run_id.as_str(), error = %err, "failed to mark enqueued BUY trades PENDING");
        }

        info!(
            run_id = run_id.as_str(),
            enqueued = enqueued_ids.len(),
            total_pending = pending.len(),
            "BUY phase transition complete"
        );
    }
}
