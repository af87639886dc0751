use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Flat configuration record recognised by the core. Deliberately not a pluggable
/// duck-typed config object - see `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    /// Retries beyond the first attempt for SELL orders.
    pub max_sell_retries: u32,
    /// Fixed delay between SELL attempts.
    pub sell_retry_delay_seconds: u64,
    /// Post-SELL guard trip point, in dollars.
    pub sell_failure_threshold: Decimal,
    /// BUY cumulative-success cap, in dollars.
    pub max_equity_limit: Decimal,
    /// Fetch-lock hold window, in seconds.
    pub fetch_cooldown_seconds: u64,
    /// Decimal places for computed share quantities.
    pub share_precision: u32,
}
