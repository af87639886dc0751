//! The data model: [`Run`], [`Trade`], and [`FetchRequest`], plus the small enums that
//! classify them. All financial quantities are [`Decimal`] - never a binary float.

use chrono::{DateTime, Utc};
use coordinator_integration::ids::{CorrelationId, RunId, TradeId};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Either leg of a rebalance trade.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display)]
pub enum Action {
    Buy,
    Sell,
}

/// The phase a [`Trade`] belongs to, or `All` for single-phase (pure-BUY or pure-SELL) runs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display)]
pub enum Phase {
    Sell,
    Buy,
    All,
}

/// Lifecycle status of a [`Run`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display)]
pub enum RunStatus {
    Pending,
    Running,
    Aggregating,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Lifecycle status of a [`Trade`]. `Buffered` is the holding state for BUY trades awaiting
/// phase transition - it never appears on a SELL or ALL-phase trade.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display)]
pub enum TradeStatus {
    Pending,
    Buffered,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TradeStatus {
    /// A trade row, once terminal, is never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Completed | TradeStatus::Failed | TradeStatus::Skipped
        )
    }
}

/// The unit of one rebalance execution.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Run {
    pub run_id: RunId,
    pub plan_id: String,
    pub correlation_id: CorrelationId,

    pub total_trades: u32,
    pub sell_total: u32,
    pub buy_total: u32,

    pub completed_trades: u32,
    pub sell_completed: u32,
    pub buy_completed: u32,
    pub succeeded_trades: u32,
    pub failed_trades: u32,
    pub skipped_trades: u32,

    pub sell_failed_amount: Decimal,
    pub sell_succeeded_amount: Decimal,
    pub buy_succeeded_amount: Decimal,

    /// The BUY cumulative-success cap in effect for this run, copied in at creation time from
    /// `Settings::max_equity_limit` so that `check_equity_circuit_breaker` is a pure
    /// function of the row rather than a second configuration source.
    pub max_equity_limit: Decimal,

    pub phase: Phase,
    pub status: RunStatus,

    /// Set at most once; guarded by [`crate::store::RunStore::try_claim_aggregation`].
    pub aggregation_claimed: bool,

    pub strategy_metadata: Value,
    pub data_freshness: Value,
    pub plan_summary: Value,

    pub created_at: DateTime<Utc>,
    /// Populated once [`RunStatus::is_terminal`] becomes true.
    pub failure_reason: Option<String>,
}

impl Run {
    /// True iff every SELL trade in the run has reached a terminal status.
    pub fn sell_phase_complete(&self) -> bool {
        self.sell_completed == self.sell_total
    }
}

/// One intent to buy or sell one symbol.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub run_id: RunId,
    pub symbol: String,
    pub action: Action,
    pub phase: Phase,

    /// Signed dollar amount; negative for SELL.
    pub trade_amount: Decimal,
    pub shares: Option<Decimal>,
    pub estimated_price: Option<Decimal>,
    pub target_weight: Decimal,
    pub is_full_liquidation: bool,
    pub strategy_id: String,
    pub correlation_id: CorrelationId,
    pub sequence_number: u64,

    pub status: TradeStatus,
    pub order_id: Option<String>,
    pub filled_shares: Option<Decimal>,
    pub fill_price: Option<Decimal>,
    pub filled_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl Trade {
    pub fn is_buy(&self) -> bool {
        matches!(self.action, Action::Buy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self.action, Action::Sell)
    }
}

/// Per-symbol single-writer lock for on-demand market-data refresh.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FetchRequest {
    pub symbol: String,
    pub requesting_stage: String,
    pub requesting_component: String,
    pub correlation_id: CorrelationId,
    pub acquired_at: DateTime<Utc>,
    pub cooldown_until: DateTime<Utc>,
}

/// Outcome of a successfully placed (or failed) order, used to build the terminal fields of a
/// [`Trade`] before it is persisted via `mark_trade_completed`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradeOutcome {
    pub success: bool,
    pub order_id: Option<String>,
    pub shares: Decimal,
    pub price: Option<Decimal>,
    pub error_message: Option<String>,
    pub skipped: bool,
}

/// Snapshot returned by `mark_trade_completed` in the same round trip as the mutation.
/// This is what [`crate::phase::PhaseCoordinator`] (documented in the `coordinator` crate)
/// inspects to decide whether to trigger the BUY phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CompletionSnapshot {
    pub current_phase: Phase,
    pub sell_total: u32,
    pub sell_completed: u32,
    pub buy_total: u32,
    pub completed_trades: u32,
    pub total_trades: u32,
    pub sell_failed_amount: Decimal,
    pub sell_succeeded_amount: Decimal,
}

impl CompletionSnapshot {
    pub fn sell_phase_complete(&self) -> bool {
        self.sell_completed == self.sell_total
    }
}
