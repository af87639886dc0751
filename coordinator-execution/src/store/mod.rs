//! The Run State Store (C1): the single state of record for runs and trades. Every
//! mutating method is conditional or idempotent by construction so that concurrent workers race
//! safely - a predicate failure is a normal outcome (`Ok(false)`), never an `Err`.

pub mod fetch_lock;
pub mod memory;
pub mod redis;

use crate::error::StoreError;
use crate::model::{CompletionSnapshot, Phase, Run, RunStatus, Trade, TradeOutcome};
use async_trait::async_trait;
use coordinator_integration::ids::{RunId, TradeId};
use rust_decimal::Decimal;

/// Result of [`RunStore::create_run`] - creation is idempotent, so a caller racing another
/// `create_run` for the same id observes this rather than an error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Result of [`RunStore::check_equity_circuit_breaker`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EquityCheckResult {
    pub allowed: bool,
    pub cumulative_buy_succeeded_value: Decimal,
    pub max_equity_limit: Decimal,
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Idempotent; returns `AlreadyExists` rather than erroring on a second call for the same id.
    async fn create_run(&self, run: Run) -> Result<CreateOutcome, StoreError>;

    /// Seeds the trade rows belonging to a freshly created run. Not itself part of the trait's
    /// conceptual core, but required for one to exist: the planner (out of scope for this crate)
    /// is the caller, and this is the write path it uses immediately after `create_run`.
    async fn put_trades(&self, run_id: &RunId, trades: Vec<Trade>) -> Result<(), StoreError>;

    async fn get_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError>;

    async fn get_trade(&self, run_id: &RunId, trade_id: &TradeId) -> Result<Option<Trade>, StoreError>;

    /// PENDING -> RUNNING. Returns `false` (not an error) if the row was not PENDING.
    async fn mark_trade_started(&self, run_id: &RunId, trade_id: &TradeId) -> Result<bool, StoreError>;

    /// One transaction: writes outcome fields (only if the row is not already terminal),
    /// increments `completed_trades` and the phase-scoped `{sell|buy}_completed` counter, and for
    /// SELL trades adds `amount` to `sell_{succeeded|failed}_amount` - the trade's *planned*
    /// dollar amount, not a figure derived from filled shares, since a failed order may carry zero
    /// filled shares and zero price. Returns the post-update snapshot the phase coordinator
    /// consumes.
    async fn mark_trade_completed(
        &self,
        run_id: &RunId,
        trade_id: &TradeId,
        outcome: TradeOutcome,
        phase: Phase,
        amount: Decimal,
    ) -> Result<CompletionSnapshot, StoreError>;

    /// Trades currently in `Buffered` status.
    async fn get_pending_buy_trades(&self, run_id: &RunId) -> Result<Vec<Trade>, StoreError>;

    /// BUFFERED -> PENDING for exactly these ids.
    async fn mark_buy_trades_pending(&self, run_id: &RunId, trade_ids: &[TradeId]) -> Result<(), StoreError>;

    /// Conditional SELL -> BUY. Returns `true` to exactly one caller per run.
    async fn transition_to_buy_phase(&self, run_id: &RunId) -> Result<bool, StoreError>;

    /// Conditional `aggregation_claimed` false -> true. Returns `true` to exactly one caller.
    async fn try_claim_aggregation(&self, run_id: &RunId) -> Result<bool, StoreError>;

    async fn check_equity_circuit_breaker(
        &self,
        run_id: &RunId,
        proposed_buy_value: Decimal,
    ) -> Result<EquityCheckResult, StoreError>;

    async fn get_all_trade_results(&self, run_id: &RunId) -> Result<Vec<Trade>, StoreError>;

    async fn mark_run_completed(&self, run_id: &RunId) -> Result<(), StoreError>;

    async fn mark_run_failed(&self, run_id: &RunId, reason: String) -> Result<(), StoreError>;

    async fn update_run_status(&self, run_id: &RunId, status: RunStatus) -> Result<(), StoreError>;
}
