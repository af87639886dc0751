//! Trade Execution Worker: a stateless consumer that turns one execution-queue
//! envelope into exactly one outcome event (or none, if deduplicated).

use crate::error::CoreError;
use crate::event::{CoreEvent, ExecutionMessage, TradeExecuted, TradeMetadata};
use crate::fetch_lock::publish;
use crate::idempotency::{idempotency_key, is_already_terminal, mark_terminal, IdempotencyCache};
use crate::phase::PhaseCoordinator;
use crate::settings::Settings;
use coordinator_execution::bus::EventBus;
use coordinator_execution::model::{Action, Phase, TradeOutcome, TradeStatus};
use coordinator_execution::ports::{BrokerPort, MarketClockPort, TradeLedgerPort};
use coordinator_execution::ports::ExecutionQuality;
use coordinator_execution::store::RunStore;
use coordinator_integration::ids::CausationId;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

pub struct TradeExecutionWorker {
    store: Arc<dyn RunStore>,
    bus: Arc<dyn EventBus>,
    broker: Arc<dyn BrokerPort>,
    clock: Arc<dyn MarketClockPort>,
    ledger: Arc<dyn TradeLedgerPort>,
    phase_coordinator: Arc<PhaseCoordinator>,
    cache: Arc<IdempotencyCache>,
    settings: Settings,
    outcome_topic: &'static str,
}

impl TradeExecutionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn RunStore>,
        bus: Arc<dyn EventBus>,
        broker: Arc<dyn BrokerPort>,
        clock: Arc<dyn MarketClockPort>,
        ledger: Arc<dyn TradeLedgerPort>,
        phase_coordinator: Arc<PhaseCoordinator>,
        cache: Arc<IdempotencyCache>,
        settings: Settings,
        outcome_topic: &'static str,
    ) -> Self {
        Self {
            store,
            bus,
            broker,
            clock,
            ledger,
            phase_coordinator,
            cache,
            settings,
            outcome_topic,
        }
    }

    fn validate(msg: &ExecutionMessage) -> Result<(), CoreError> {
        if msg.run_id.as_str().is_empty() || msg.trade_id.as_str().is_empty() {
            return Err(CoreError::Validation("run_id/trade_id must be non-empty".into()));
        }
        if msg.symbol.is_empty() {
            return Err(CoreError::Validation("symbol must be non-empty".into()));
        }
        if msg.trade_amount == Decimal::ZERO {
            return Err(CoreError::Validation("trade_amount must be non-zero".into()));
        }
        Ok(())
    }

    /// Per-envelope execution algorithm. Returns `Ok(())` whether the trade was executed, skipped,
    /// deduplicated, or failed - every branch either writes a terminal row or returns before any
    /// state change, so nothing here needs to bubble up as a retry-the-whole-message error except
    /// genuine store/bus outages.
    pub async fn handle(&self, msg: ExecutionMessage) -> Result<(), CoreError> {
        if let Err(err) = Self::validate(&msg) {
            warn!(trade_id = msg.trade_id.as_str(), error = %err, "validation failure, acking");
            let outcome = TradeOutcome {
                success: false,
                skipped: false,
                order_id: None,
                shares: Decimal::ZERO,
                price: None,
                error_message: Some(err.to_string()),
            };
            return self.emit_trade_executed(&msg, &outcome).await;
        }

        let key = idempotency_key(&msg.run_id, &msg.trade_id, &msg.symbol, msg.action);
        if is_already_terminal(&self.cache, self.store.as_ref(), &msg.run_id, &msg.trade_id, &key).await {
            return Ok(());
        }

        if !self.store.mark_trade_started(&msg.run_id, &msg.trade_id).await? {
            // another worker is ahead of us for this trade
            return Ok(());
        }

        let market_open = self.clock.is_market_open(&msg.correlation_id).await.unwrap_or(true);
        if !market_open {
            let outcome = TradeOutcome {
                success: true,
                skipped: true,
                order_id: None,
                shares: Decimal::ZERO,
                price: None,
                error_message: None,
            };
            return self.complete_and_emit(&msg, outcome, &key).await;
        }

        if msg.phase == Phase::Buy {
            let check = self
                .store
                .check_equity_circuit_breaker(&msg.run_id, msg.trade_amount.abs())
                .await?;
            if !check.allowed {
                return self.trip_equity_guard(&msg, check, &key).await;
            }
        }

        let shares = match self.compute_shares(&msg).await {
            Ok(shares) => shares,
            Err(err) => {
                let outcome = TradeOutcome {
                    success: false,
                    skipped: false,
                    order_id: None,
                    shares: Decimal::ZERO,
                    price: None,
                    error_message: Some(err.to_string()),
                };
                return self.complete_and_emit(&msg, outcome, &key).await;
            }
        };

        let order_result = self.execute_with_retry(&msg, shares).await;

        if order_result.success {
            let quality = ExecutionQuality {
                slippage_bps: order_result.slippage_bps,
                requested_amount: msg.trade_amount.abs(),
                filled_amount: order_result.shares.abs() * order_result.price.unwrap_or(Decimal::ZERO),
            };
            if let Err(err) = self
                .ledger
                .record_filled_order(&order_result, &msg.correlation_id, &msg.strategy_id, &quality)
                .await
            {
                warn!(trade_id = msg.trade_id.as_str(), error = %err, "trade ledger persistence failed (non-fatal)");
            }
        }

        let outcome = TradeOutcome {
            success: order_result.success,
            skipped: false,
            order_id: order_result.order_id,
            shares: order_result.shares,
            price: order_result.price,
            error_message: order_result.error_message,
        };
        self.complete_and_emit(&msg, outcome, &key).await
    }

    async fn trip_equity_guard(
        &self,
        msg: &ExecutionMessage,
        check: coordinator_execution::store::EquityCheckResult,
        key: &str,
    ) -> Result<(), CoreError> {
        let outcome = TradeOutcome {
            success: false,
            skipped: false,
            order_id: None,
            shares: Decimal::ZERO,
            price: None,
            error_message: Some("equity circuit breaker denied the proposed BUY".into()),
        };
        let _snapshot = self
            .store
            .mark_trade_completed(&msg.run_id, &msg.trade_id, outcome.clone(), msg.phase, msg.trade_amount.abs())
            .await?;
        self.store
            .mark_run_failed(&msg.run_id, "equity circuit breaker tripped".into())
            .await?;
        mark_terminal(&self.cache, key.to_owned(), TradeStatus::Failed);

        self.emit_trade_executed(msg, &outcome).await?;

        let failure = CoreEvent::WorkflowFailed(crate::event::WorkflowFailed {
            run_id: msg.run_id.clone(),
            failure_step: crate::error::FailureStep::EquityCircuitBreaker,
            error_details: serde_json::json!({
                "cumulative_buy_succeeded_value": check.cumulative_buy_succeeded_value.to_string(),
                "max_equity_limit_usd": check.max_equity_limit.to_string(),
            }),
        });
        publish(
            self.bus.as_ref(),
            self.outcome_topic,
            msg.correlation_id.clone(),
            CausationId::Root,
            "trade_execution_worker",
            failure,
        )
        .await?;

        Ok(())
    }

    /// Resolves an exact share quantity for this trade.
    async fn compute_shares(&self, msg: &ExecutionMessage) -> Result<Decimal, CoreError> {
        let wants_position_read = msg.action == Action::Sell
            && (msg.is_full_liquidation || msg.target_weight <= Decimal::ZERO);

        let mut shares = if wants_position_read {
            let position = self
                .broker
                .get_position(&msg.symbol)
                .await?
                .map(|p| p.qty)
                .unwrap_or(Decimal::ZERO);
            position
        } else if let Some(explicit) = msg.shares.filter(|s| *s > Decimal::ZERO) {
            explicit
        } else if let Some(price) = msg.estimated_price.filter(|p| *p > Decimal::ZERO) {
            round_shares(msg.trade_amount.abs() / price, self.settings.share_precision)
        } else {
            let price = self
                .broker
                .get_current_price(&msg.symbol)
                .await?
                .filter(|p| *p > Decimal::ZERO)
                .ok_or_else(|| {
                    CoreError::MarketData(coordinator_execution::error::MarketDataError::PriceUnavailable(
                        msg.symbol.clone(),
                    ))
                })?;
            round_shares(msg.trade_amount.abs() / price, self.settings.share_precision)
        };

        if msg.action == Action::Sell {
            if let Ok(Some(position)) = self.broker.get_position(&msg.symbol).await {
                shares = shares.min(position.qty);
            }
        }

        Ok(shares)
    }

    /// SELL trades retry up to `max_sell_retries + 1` attempts; BUY and ALL-phase trades are
    /// single-attempt.
    async fn execute_with_retry(
        &self,
        msg: &ExecutionMessage,
        shares: Decimal,
    ) -> coordinator_execution::ports::OrderResult {
        let attempts = if msg.action == Action::Sell {
            self.settings.max_sell_retries + 1
        } else {
            1
        };

        let mut last_error = None;
        for attempt in 0..attempts {
            let result = self
                .broker
                .place_order(
                    &msg.symbol,
                    msg.action,
                    shares,
                    &msg.correlation_id,
                    msg.is_full_liquidation,
                    msg.trade_amount.abs(),
                    &msg.strategy_id,
                )
                .await;

            match result {
                Ok(order) if order.success => return order,
                Ok(order) => last_error = Some(order.error_message.clone().unwrap_or_default()),
                Err(err) => last_error = Some(err.to_string()),
            }

            if attempt + 1 < attempts {
                info!(trade_id = msg.trade_id.as_str(), attempt, "retrying SELL order");
                tokio::time::sleep(std::time::Duration::from_secs(self.settings.sell_retry_delay_seconds)).await;
            }
        }

        coordinator_execution::ports::OrderResult {
            success: false,
            order_id: None,
            shares: Decimal::ZERO,
            price: None,
            order_type: "market".into(),
            filled_at: None,
            error_message: last_error,
            slippage_bps: None,
        }
    }

    /// Persists the terminal outcome, runs the phase check, and emits `TradeExecuted`.
    async fn complete_and_emit(&self, msg: &ExecutionMessage, outcome: TradeOutcome, key: &str) -> Result<(), CoreError> {
        let snapshot = self
            .store
            .mark_trade_completed(&msg.run_id, &msg.trade_id, outcome.clone(), msg.phase, msg.trade_amount.abs())
            .await?;

        let status = if outcome.success || outcome.skipped {
            TradeStatus::Completed
        } else {
            TradeStatus::Failed
        };
        mark_terminal(&self.cache, key.to_owned(), status);

        self.phase_coordinator
            .on_trade_completed(&msg.run_id, &msg.correlation_id, snapshot)
            .await;

        self.emit_trade_executed(msg, &outcome).await
    }

    async fn emit_trade_executed(&self, msg: &ExecutionMessage, outcome: &TradeOutcome) -> Result<(), CoreError> {
        let event = CoreEvent::TradeExecuted(TradeExecuted {
            run_id: msg.run_id.clone(),
            trade_id: msg.trade_id.clone(),
            symbol: msg.symbol.clone(),
            action: msg.action,
            phase: msg.phase,
            success: outcome.success,
            skipped: outcome.skipped,
            order_id: outcome.order_id.clone(),
            shares_executed: outcome.shares,
            price: outcome.price,
            error_message: outcome.error_message.clone(),
            metadata: TradeMetadata {
                run_id: msg.run_id.clone(),
                trade_id: msg.trade_id.clone(),
                phase: msg.phase,
            },
        });

        if let Err(err) = publish(
            self.bus.as_ref(),
            self.outcome_topic,
            msg.correlation_id.clone(),
            CausationId::Root,
            "trade_execution_worker",
            event,
        )
        .await
        {
            warn!(trade_id = msg.trade_id.as_str(), error = %err, "failed to emit TradeExecuted (state already durable)");
        }
        Ok(())
    }
}

fn round_shares(value: Decimal, precision: u32) -> Decimal {
    value.round_dp(precision)
}
