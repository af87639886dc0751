//! Inputs to, and outputs from, the core. Outcome events are modelled as the closed
//! [`CoreEvent`] discriminated union rather than a string-keyed handler registry: dispatch is an
//! exhaustive `match`, so adding an event kind is a compile error everywhere it isn't handled
//! instead of a silent no-op at runtime.

use chrono::{DateTime, Utc};
use coordinator_execution::model::{Action, Phase};
use coordinator_integration::ids::{CorrelationId, RunId, TradeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One trade intent read off the execution queue.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionMessage {
    pub run_id: RunId,
    pub trade_id: TradeId,
    pub plan_id: String,
    pub correlation_id: CorrelationId,
    pub symbol: String,
    pub action: Action,
    pub phase: Phase,
    pub trade_amount: Decimal,
    pub shares: Option<Decimal>,
    pub estimated_price: Option<Decimal>,
    pub target_weight: Decimal,
    pub is_full_liquidation: bool,
    pub strategy_id: String,
    pub sequence_number: u64,
    pub metadata: Value,
}

/// A demand to refresh one symbol's market data.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FetchRequestMessage {
    pub correlation_id: CorrelationId,
    pub symbol: String,
    pub requesting_stage: String,
    pub requesting_component: String,
    pub lookback_days: u32,
}

/// Per-trade metadata carried on [`TradeExecuted`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradeMetadata {
    pub run_id: RunId,
    pub trade_id: TradeId,
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradeExecuted {
    pub run_id: RunId,
    pub trade_id: TradeId,
    pub symbol: String,
    pub action: Action,
    pub phase: Phase,
    pub success: bool,
    pub skipped: bool,
    pub order_id: Option<String>,
    pub shares_executed: Decimal,
    pub price: Option<Decimal>,
    pub error_message: Option<String>,
    pub metadata: TradeMetadata,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AllTradesCompleted {
    pub run_id: RunId,
    pub total_trades: u32,
    pub succeeded_trades: u32,
    pub failed_trades: u32,
    pub skipped_trades: u32,
    pub failed_symbols: Vec<String>,
    pub portfolio_snapshot: Value,
    pub pnl: Value,
    pub strategy_attribution: Value,
    pub timings: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowFailed {
    pub run_id: RunId,
    pub failure_step: crate::error::FailureStep,
    pub error_details: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarketDataFetchCompleted {
    pub correlation_id: CorrelationId,
    pub symbol: String,
    pub was_deduplicated: bool,
    pub bars_fetched: u32,
    pub metadata: Value,
}

/// Every outcome event the core can emit. A run ends in exactly one
/// of `AllTradesCompleted` or `WorkflowFailed`; every terminal trade produces exactly one
/// `TradeExecuted`; every fetch-request produces exactly one `MarketDataFetchCompleted`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event_type")]
pub enum CoreEvent {
    TradeExecuted(TradeExecuted),
    AllTradesCompleted(AllTradesCompleted),
    WorkflowFailed(WorkflowFailed),
    MarketDataFetchCompleted(MarketDataFetchCompleted),
}

impl CoreEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            CoreEvent::TradeExecuted(_) => "TradeExecuted",
            CoreEvent::AllTradesCompleted(_) => "AllTradesCompleted",
            CoreEvent::WorkflowFailed(_) => "WorkflowFailed",
            CoreEvent::MarketDataFetchCompleted(_) => "MarketDataFetchCompleted",
        }
    }

    pub fn run_id(&self) -> Option<&RunId> {
        match self {
            CoreEvent::TradeExecuted(e) => Some(&e.run_id),
            CoreEvent::AllTradesCompleted(e) => Some(&e.run_id),
            CoreEvent::WorkflowFailed(e) => Some(&e.run_id),
            CoreEvent::MarketDataFetchCompleted(_) => None,
        }
    }
}
