//! End-to-end scenario tests for the distributed execution coordinator, driving the worker,
//! phase coordinator, and aggregator together against in-memory backends - scenarios S1-S6 and
//! the universal invariants around exactly-once completion, phase ordering, and guard tripping.

use coordinator::aggregator::RunAggregator;
use coordinator::event::{CoreEvent, ExecutionMessage, TradeExecuted};
use coordinator::fetch_lock::FetchLockCoordinator;
use coordinator::idempotency::IdempotencyCache;
use coordinator::phase::PhaseCoordinator;
use coordinator::settings::Settings;
use coordinator::worker::TradeExecutionWorker;
use coordinator_execution::bus::memory::InMemoryEventBus;
use coordinator_execution::bus::EventBus;
use coordinator_execution::model::{Action, Phase, Run, RunStatus, Trade, TradeStatus};
use coordinator_execution::ports::mock::{
    MockBroker, MockMarketClock, MockMarketDataRefresh, MockPnlService, MockTradeLedger,
};
use coordinator_execution::ports::OrderResult;
use coordinator_execution::store::fetch_lock::{AcquireResult, FetchLockStore, InMemoryFetchLockStore};
use coordinator_execution::store::memory::InMemoryRunStore;
use coordinator_execution::store::RunStore;
use coordinator_integration::ids::{CorrelationId, RunId, TradeId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const EXECUTION_TOPIC: &str = "execution";
const OUTCOME_TOPIC: &str = "outcome";

fn default_settings() -> Settings {
    Settings {
        max_sell_retries: 2,
        sell_retry_delay_seconds: 0,
        sell_failure_threshold: dec!(5000),
        max_equity_limit: dec!(1_000_000),
        fetch_cooldown_seconds: 60,
        share_precision: 4,
    }
}

fn sample_run(run_id: &str, sell_total: u32, buy_total: u32, phase: Phase, max_equity_limit: Decimal) -> Run {
    Run {
        run_id: RunId::new(run_id.to_owned()),
        plan_id: "plan-1".into(),
        correlation_id: CorrelationId::new(format!("corr-{run_id}")),
        total_trades: sell_total + buy_total,
        sell_total,
        buy_total,
        completed_trades: 0,
        sell_completed: 0,
        buy_completed: 0,
        succeeded_trades: 0,
        failed_trades: 0,
        skipped_trades: 0,
        sell_failed_amount: Decimal::ZERO,
        sell_succeeded_amount: Decimal::ZERO,
        buy_succeeded_amount: Decimal::ZERO,
        max_equity_limit,
        phase,
        status: RunStatus::Running,
        aggregation_claimed: false,
        strategy_metadata: serde_json::json!({}),
        data_freshness: serde_json::json!({}),
        plan_summary: serde_json::json!({}),
        created_at: chrono::Utc::now(),
        failure_reason: None,
    }
}

#[allow(clippy::too_many_arguments)]
fn sample_trade(
    run_id: &str,
    trade_id: &str,
    symbol: &str,
    action: Action,
    phase: Phase,
    trade_amount: Decimal,
    shares: Option<Decimal>,
    status: TradeStatus,
) -> Trade {
    Trade {
        trade_id: TradeId::new(trade_id.to_owned()),
        run_id: RunId::new(run_id.to_owned()),
        symbol: symbol.to_owned(),
        action,
        phase,
        trade_amount,
        shares,
        estimated_price: None,
        target_weight: dec!(1),
        is_full_liquidation: false,
        strategy_id: "momentum".into(),
        correlation_id: CorrelationId::new(format!("corr-{run_id}")),
        sequence_number: 0,
        status,
        order_id: None,
        filled_shares: None,
        fill_price: None,
        filled_at: None,
        error_message: None,
    }
}

fn execution_message(trade: &Trade) -> ExecutionMessage {
    ExecutionMessage {
        run_id: trade.run_id.clone(),
        trade_id: trade.trade_id.clone(),
        plan_id: "plan-1".into(),
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
    }
}

fn order_result(success: bool, shares: Decimal, price: Decimal, error: Option<&str>) -> Result<OrderResult, coordinator_execution::error::BrokerError> {
    Ok(OrderResult {
        success,
        order_id: if success { Some(format!("order-{shares}-{price}")) } else { None },
        shares: if success { shares } else { Decimal::ZERO },
        price: if success { Some(price) } else { None },
        order_type: "market".into(),
        filled_at: if success { Some(chrono::Utc::now()) } else { None },
        error_message: error.map(str::to_owned),
        slippage_bps: None,
    })
}

/// Wires up one worker + phase coordinator + aggregator against shared in-memory backends.
struct Harness {
    store: Arc<InMemoryRunStore>,
    bus: Arc<InMemoryEventBus>,
    broker: Arc<MockBroker>,
    clock: Arc<MockMarketClock>,
    worker: TradeExecutionWorker,
    aggregator: RunAggregator,
}

impl Harness {
    fn new(settings: Settings) -> Self {
        let store: Arc<InMemoryRunStore> = Arc::new(InMemoryRunStore::new());
        let bus: Arc<InMemoryEventBus> = Arc::new(InMemoryEventBus::new());
        let broker = Arc::new(MockBroker::new());
        let clock = Arc::new(MockMarketClock::new(true));
        let ledger = Arc::new(MockTradeLedger::default());
        let pnl = Arc::new(MockPnlService);

        let phase_coordinator = Arc::new(PhaseCoordinator::new(
            store.clone() as Arc<dyn RunStore>,
            bus.clone() as Arc<dyn EventBus>,
            settings.sell_failure_threshold,
            EXECUTION_TOPIC,
            OUTCOME_TOPIC,
        ));

        let worker = TradeExecutionWorker::new(
            store.clone() as Arc<dyn RunStore>,
            bus.clone() as Arc<dyn EventBus>,
            broker.clone() as Arc<dyn coordinator_execution::ports::BrokerPort>,
            clock.clone() as Arc<dyn coordinator_execution::ports::MarketClockPort>,
            ledger as Arc<dyn coordinator_execution::ports::TradeLedgerPort>,
            phase_coordinator,
            Arc::new(IdempotencyCache::new()),
            settings,
            OUTCOME_TOPIC,
        );

        let aggregator = RunAggregator::new(
            store.clone() as Arc<dyn RunStore>,
            bus.clone() as Arc<dyn EventBus>,
            broker.clone() as Arc<dyn coordinator_execution::ports::BrokerPort>,
            pnl as Arc<dyn coordinator_execution::ports::PnlServicePort>,
            OUTCOME_TOPIC,
        );

        Self {
            store,
            bus,
            broker,
            clock,
            worker,
            aggregator,
        }
    }

    /// Drains every envelope currently queued on `OUTCOME_TOPIC`, parses it back into a
    /// [`CoreEvent`], and - for every `TradeExecuted` - feeds the aggregator, mirroring what a
    /// bus consumer wired to both handlers would do.
    async fn drain_outcomes(&self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Some(envelope) = self.bus.try_recv(OUTCOME_TOPIC).await {
            let event: CoreEvent = serde_json::from_value(envelope.payload).expect("valid CoreEvent payload");
            if let CoreEvent::TradeExecuted(ref trade_executed) = event {
                self.aggregator.on_trade_executed(trade_executed).await;
            }
            events.push(event);
        }
        events
    }

    /// Drains every `ExecutionMessage` the phase coordinator enqueued onto `EXECUTION_TOPIC`
    /// (the buffered BUY trades released on SELL-phase close).
    async fn drain_execution_queue(&self) -> Vec<ExecutionMessage> {
        let mut messages = Vec::new();
        while let Some(envelope) = self.bus.try_recv(EXECUTION_TOPIC).await {
            messages.push(serde_json::from_value(envelope.payload).expect("valid ExecutionMessage payload"));
        }
        messages
    }
}

fn trade_executed<'a>(events: &'a [CoreEvent], symbol: &str) -> &'a TradeExecuted {
    events
        .iter()
        .find_map(|e| match e {
            CoreEvent::TradeExecuted(t) if t.symbol == symbol => Some(t),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no TradeExecuted for {symbol}"))
}

fn all_trades_completed(events: &[CoreEvent]) -> Option<&coordinator::event::AllTradesCompleted> {
    events.iter().find_map(|e| match e {
        CoreEvent::AllTradesCompleted(a) => Some(a),
        _ => None,
    })
}

fn workflow_failed(events: &[CoreEvent]) -> Option<&coordinator::event::WorkflowFailed> {
    events.iter().find_map(|e| match e {
        CoreEvent::WorkflowFailed(w) => Some(w),
        _ => None,
    })
}

/// S1 - happy path, two-phase: one SELL, one BUY, both succeed, run completes cleanly.
#[tokio::test]
async fn s1_happy_path_two_phase() {
    let h = Harness::new(default_settings());
    let run_id = "R1";

    h.store.create_run(sample_run(run_id, 1, 1, Phase::Sell, dec!(1_000_000))).await.unwrap();
    let sell = sample_trade(run_id, "T-SELL", "SPY", Action::Sell, Phase::Sell, dec!(-10_000), Some(dec!(100)), TradeStatus::Pending);
    let buy = sample_trade(run_id, "T-BUY", "QQQ", Action::Buy, Phase::Buy, dec!(10_000), None, TradeStatus::Buffered);
    h.store.put_trades(&RunId::new(run_id.into()), vec![sell.clone(), buy.clone()]).await.unwrap();

    h.broker.push_order_result(order_result(true, dec!(100), dec!(100), None));
    h.worker.handle(execution_message(&sell)).await.unwrap();

    let mut events = h.drain_outcomes().await;
    let sell_event = trade_executed(&events, "SPY");
    assert!(sell_event.success);
    assert!(!sell_event.skipped);

    // the SELL's completion flipped the run to BUY and enqueued the buffered trade
    let enqueued = h.drain_execution_queue().await;
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].symbol, "QQQ");

    h.broker.push_order_result(order_result(true, dec!(200), dec!(50), None));
    h.worker.handle(enqueued.into_iter().next().unwrap()).await.unwrap();

    events.extend(h.drain_outcomes().await);
    let buy_event = trade_executed(&events, "QQQ");
    assert!(buy_event.success);

    let completed = all_trades_completed(&events).expect("AllTradesCompleted must have been emitted");
    assert_eq!(completed.total_trades, 2);
    assert_eq!(completed.succeeded_trades, 2);
    assert_eq!(completed.failed_trades, 0);
    assert!(completed.failed_symbols.is_empty());
    assert!(workflow_failed(&events).is_none());

    let run = h.store.get_run(&RunId::new(run_id.into())).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

/// S2 - SELL failure below threshold: AAPL fails for $2,000 against a $5,000 threshold, so the
/// BUY phase still releases and the run completes with one failed symbol.
#[tokio::test]
async fn s2_sell_failure_below_threshold() {
    let h = Harness::new(default_settings());
    let run_id = "R2";

    h.store.create_run(sample_run(run_id, 3, 1, Phase::Sell, dec!(1_000_000))).await.unwrap();
    let spy = sample_trade(run_id, "T-SPY", "SPY", Action::Sell, Phase::Sell, dec!(-1_000), Some(dec!(10)), TradeStatus::Pending);
    let aapl = sample_trade(run_id, "T-AAPL", "AAPL", Action::Sell, Phase::Sell, dec!(-2_000), Some(dec!(10)), TradeStatus::Pending);
    let msft = sample_trade(run_id, "T-MSFT", "MSFT", Action::Sell, Phase::Sell, dec!(-3_000), Some(dec!(10)), TradeStatus::Pending);
    let buy = sample_trade(run_id, "T-QQQ", "QQQ", Action::Buy, Phase::Buy, dec!(10_000), None, TradeStatus::Buffered);
    h.store
        .put_trades(&RunId::new(run_id.into()), vec![spy.clone(), aapl.clone(), msft.clone(), buy.clone()])
        .await
        .unwrap();

    h.broker.push_order_result(order_result(true, dec!(10), dec!(100), None));
    h.worker.handle(execution_message(&spy)).await.unwrap();

    h.broker.push_order_result(order_result(false, Decimal::ZERO, Decimal::ZERO, Some("rejected")));
    h.worker.handle(execution_message(&aapl)).await.unwrap();

    h.broker.push_order_result(order_result(true, dec!(10), dec!(300), None));
    h.worker.handle(execution_message(&msft)).await.unwrap();

    let mut events = h.drain_outcomes().await;
    assert!(!trade_executed(&events, "AAPL").success);

    // below the $5,000 threshold, the BUY transition still happened
    let enqueued = h.drain_execution_queue().await;
    assert_eq!(enqueued.len(), 1);
    h.broker.push_order_result(order_result(true, dec!(100), dec!(100), None));
    h.worker.handle(enqueued.into_iter().next().unwrap()).await.unwrap();
    events.extend(h.drain_outcomes().await);

    let completed = all_trades_completed(&events).expect("run should complete, not fail");
    assert_eq!(completed.total_trades, 4);
    assert_eq!(completed.succeeded_trades, 3);
    assert_eq!(completed.failed_trades, 1);
    assert_eq!(completed.failed_symbols, vec!["AAPL".to_string()]);
    assert!(workflow_failed(&events).is_none());

    let run = h.store.get_run(&RunId::new(run_id.into())).await.unwrap().unwrap();
    assert_eq!(run.sell_failed_amount, dec!(2000));
}

/// S3 - SELL failure above threshold: a single $2,000 failure trips a $1,000 threshold, the run
/// fails, and the buffered BUY never enqueues.
#[tokio::test]
async fn s3_sell_failure_above_threshold() {
    let mut settings = default_settings();
    settings.sell_failure_threshold = dec!(1_000);
    let h = Harness::new(settings);
    let run_id = "R3";

    h.store.create_run(sample_run(run_id, 1, 1, Phase::Sell, dec!(1_000_000))).await.unwrap();
    let sell = sample_trade(run_id, "T-SELL", "AAPL", Action::Sell, Phase::Sell, dec!(-2_000), Some(dec!(10)), TradeStatus::Pending);
    let buy = sample_trade(run_id, "T-BUY", "QQQ", Action::Buy, Phase::Buy, dec!(10_000), None, TradeStatus::Buffered);
    h.store.put_trades(&RunId::new(run_id.into()), vec![sell.clone(), buy.clone()]).await.unwrap();

    h.broker.push_order_result(order_result(false, Decimal::ZERO, Decimal::ZERO, Some("rejected")));
    h.worker.handle(execution_message(&sell)).await.unwrap();

    let events = h.drain_outcomes().await;
    assert!(all_trades_completed(&events).is_none());
    let failure = workflow_failed(&events).expect("SELL_PHASE_GUARD must fire");
    assert_eq!(failure.failure_step, coordinator::error::FailureStep::SellPhaseGuard);
    assert_eq!(failure.error_details["sell_failed_amount"], "2000");

    // no BUY trade was ever enqueued
    assert!(h.drain_execution_queue().await.is_empty());

    let run = h.store.get_run(&RunId::new(run_id.into())).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

/// S4 - duplicate delivery: the same message handled by three concurrent workers over a shared
/// store still yields exactly one broker submission and exactly one successful outcome.
#[tokio::test(flavor = "multi_thread", worker_threads = 3)]
async fn s4_duplicate_delivery_exactly_once() {
    let h = Harness::new(default_settings());
    let run_id = "R4";

    h.store.create_run(sample_run(run_id, 1, 0, Phase::Sell, dec!(1_000_000))).await.unwrap();
    let sell = sample_trade(run_id, "T1", "SPY", Action::Sell, Phase::Sell, dec!(-1_000), Some(dec!(10)), TradeStatus::Pending);
    h.store.put_trades(&RunId::new(run_id.into()), vec![sell.clone()]).await.unwrap();
    h.broker.push_order_result(order_result(true, dec!(10), dec!(100), None));

    let worker = Arc::new(h.worker);
    let msg = execution_message(&sell);
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let worker = worker.clone();
            let msg = msg.clone();
            tokio::spawn(async move { worker.handle(msg).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let events = h.bus.try_recv(OUTCOME_TOPIC).await;
    assert!(events.is_some(), "expected exactly one TradeExecuted");
    assert!(h.bus.try_recv(OUTCOME_TOPIC).await.is_none(), "only one TradeExecuted should ever be emitted");

    let run = h.store.get_run(&RunId::new(run_id.into())).await.unwrap().unwrap();
    assert_eq!(run.completed_trades, 1);
    assert_eq!(run.succeeded_trades, 1);
}

/// S5 - equity circuit breaker: A succeeds and raises cumulative BUY success to $15,000; B's
/// additional $10,000 would breach the $20,000 cap and is denied, failing the run.
#[tokio::test]
async fn s5_equity_circuit_breaker() {
    let h = Harness::new(default_settings());
    let run_id = "R5";

    h.store.create_run(sample_run(run_id, 0, 2, Phase::Buy, dec!(20_000))).await.unwrap();
    let a = sample_trade(run_id, "T-A", "A", Action::Buy, Phase::Buy, dec!(15_000), Some(dec!(150)), TradeStatus::Pending);
    let b = sample_trade(run_id, "T-B", "B", Action::Buy, Phase::Buy, dec!(10_000), Some(dec!(100)), TradeStatus::Pending);
    h.store.put_trades(&RunId::new(run_id.into()), vec![a.clone(), b.clone()]).await.unwrap();

    h.broker.push_order_result(order_result(true, dec!(150), dec!(100), None));
    h.worker.handle(execution_message(&a)).await.unwrap();
    let events_a = h.drain_outcomes().await;
    assert!(trade_executed(&events_a, "A").success);

    h.worker.handle(execution_message(&b)).await.unwrap();
    let events_b = h.drain_outcomes().await;
    let b_outcome = trade_executed(&events_b, "B");
    assert!(!b_outcome.success);

    let failure = workflow_failed(&events_b).expect("EQUITY_CIRCUIT_BREAKER must fire");
    assert_eq!(failure.failure_step, coordinator::error::FailureStep::EquityCircuitBreaker);
    assert_eq!(failure.error_details["cumulative_buy_succeeded_value"], "15000");
    assert_eq!(failure.error_details["max_equity_limit_usd"], "20000");
    assert!(
        all_trades_completed(&events_b).is_none(),
        "a FAILED run must never also emit AllTradesCompleted"
    );

    let run = h.store.get_run(&RunId::new(run_id.into())).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.buy_succeeded_amount, dec!(15_000));
}

/// S6 - fetch-lock dedup: of three concurrent requests for the same symbol, exactly one is
/// granted and the other two are deduplicated; within the cooldown no further grant succeeds.
#[tokio::test]
async fn s6_fetch_lock_dedup() {
    let store = Arc::new(InMemoryFetchLockStore::new());
    let refresh = Arc::new(MockMarketDataRefresh);
    let fetch_coordinator = FetchLockCoordinator::new(store.clone(), refresh, 60);

    let mut granted = 0;
    let mut deduplicated = 0;
    for correlation in ["c1", "c2", "c3"] {
        let request = coordinator::event::FetchRequestMessage {
            correlation_id: CorrelationId::new(correlation.into()),
            symbol: "SPY".into(),
            requesting_stage: "rebalance".into(),
            requesting_component: "signal-eval".into(),
            lookback_days: 30,
        };
        match fetch_coordinator.handle(request).await {
            CoreEvent::MarketDataFetchCompleted(event) => {
                if event.was_deduplicated {
                    deduplicated += 1;
                    assert_eq!(event.bars_fetched, 0);
                } else {
                    granted += 1;
                }
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(granted, 1);
    assert_eq!(deduplicated, 2);

    // within the cooldown window no further acquisition for the same symbol succeeds
    let now = chrono::Utc::now();
    let result = store
        .try_acquire("SPY", "rebalance", "signal-eval", &CorrelationId::new("c4".into()), now, chrono::Duration::seconds(60))
        .await
        .unwrap();
    assert!(matches!(result, AcquireResult::Denied { .. }));
}

/// Market-hours gate: a trade processed while the market is closed is marked COMPLETED with
/// `skipped=true` and still participates in phase completion.
#[tokio::test]
async fn market_closed_trade_is_skipped_and_still_advances_phase() {
    let h = Harness::new(default_settings());
    h.clock.set_open(false);
    let run_id = "R6";

    h.store.create_run(sample_run(run_id, 1, 1, Phase::Sell, dec!(1_000_000))).await.unwrap();
    let sell = sample_trade(run_id, "T-SELL", "SPY", Action::Sell, Phase::Sell, dec!(-1_000), Some(dec!(10)), TradeStatus::Pending);
    let buy = sample_trade(run_id, "T-BUY", "QQQ", Action::Buy, Phase::Buy, dec!(1_000), None, TradeStatus::Buffered);
    h.store.put_trades(&RunId::new(run_id.into()), vec![sell.clone(), buy.clone()]).await.unwrap();

    h.worker.handle(execution_message(&sell)).await.unwrap();
    let events = h.drain_outcomes().await;
    let event = trade_executed(&events, "SPY");
    assert!(event.success);
    assert!(event.skipped);

    // the phase coordinator still closed out SELL and released the buffered BUY
    let enqueued = h.drain_execution_queue().await;
    assert_eq!(enqueued.len(), 1);

    let run = h.store.get_run(&RunId::new(run_id.into())).await.unwrap().unwrap();
    assert_eq!(run.sell_completed, 1);
    // a skipped trade never executed, so it must not be counted as succeeded dollar volume
    assert_eq!(run.sell_succeeded_amount, Decimal::ZERO);
}

/// For a pure-BUY run (`sell_total == 0`), the run starts in BUY phase directly; the guard never
/// applies since no SELL phase ever closes.
#[tokio::test]
async fn pure_buy_run_skips_sell_guard() {
    let h = Harness::new(default_settings());
    let run_id = "R7";
    h.store.create_run(sample_run(run_id, 0, 1, Phase::Buy, dec!(1_000_000))).await.unwrap();
    let buy = sample_trade(run_id, "T-BUY", "QQQ", Action::Buy, Phase::Buy, dec!(1_000), Some(dec!(10)), TradeStatus::Pending);
    h.store.put_trades(&RunId::new(run_id.into()), vec![buy.clone()]).await.unwrap();

    h.broker.push_order_result(order_result(true, dec!(10), dec!(100), None));
    h.worker.handle(execution_message(&buy)).await.unwrap();
    let events = h.drain_outcomes().await;

    assert!(trade_executed(&events, "QQQ").success);
    let completed = all_trades_completed(&events).expect("single-trade pure-BUY run should complete immediately");
    assert_eq!(completed.total_trades, 1);
    assert!(workflow_failed(&events).is_none());
}

/// A full-liquidation SELL uses the broker's actual held position rather than the planner's
/// estimate, and every SELL caps computed shares at the position actually held.
#[tokio::test]
async fn sell_caps_shares_at_actual_held_position() {
    let h = Harness::new(default_settings());
    let run_id = "R8";
    h.store.create_run(sample_run(run_id, 1, 0, Phase::Sell, dec!(1_000_000))).await.unwrap();
    // planner thinks there are 500 shares; the broker only actually holds 120
    let mut sell = sample_trade(run_id, "T-SELL", "SPY", Action::Sell, Phase::Sell, dec!(-50_000), Some(dec!(500)), TradeStatus::Pending);
    sell.is_full_liquidation = false;
    h.store.put_trades(&RunId::new(run_id.into()), vec![sell.clone()]).await.unwrap();
    h.broker.set_position("SPY", dec!(120));

    h.broker.push_order_result(order_result(true, dec!(120), dec!(100), None));
    h.worker.handle(execution_message(&sell)).await.unwrap();

    let trade = h
        .store
        .get_trade(&RunId::new(run_id.into()), &TradeId::new("T-SELL".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(trade.filled_shares, Some(dec!(120)));
}
