//! Collaborator ports: traits the core consumes but does not implement. Production
//! deployments wire in real brokers, ledgers, and clocks; tests wire in the `mock` module below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coordinator_integration::ids::CorrelationId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, CollaboratorError, MarketDataError};
use crate::model::Action;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub qty: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SymbolPosition {
    pub symbol: String,
    pub qty: Decimal,
    pub market_value: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Account {
    pub equity: Decimal,
    pub cash: Decimal,
    pub long_market_value: Decimal,
    pub short_market_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub shares: Decimal,
    pub price: Option<Decimal>,
    pub order_type: String,
    pub filled_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub slippage_bps: Option<Decimal>,
}

/// `place_order`/`get_position`/`get_current_price`/`get_account`/`get_positions`.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    async fn place_order(
        &self,
        symbol: &str,
        side: Action,
        qty: Decimal,
        correlation_id: &CorrelationId,
        is_complete_exit: bool,
        planned_amount: Decimal,
        strategy_id: &str,
    ) -> Result<OrderResult, BrokerError>;

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, BrokerError>;

    async fn get_current_price(&self, symbol: &str) -> Result<Option<Decimal>, MarketDataError>;

    async fn get_account(&self) -> Result<Account, BrokerError>;

    async fn get_positions(&self) -> Result<Vec<SymbolPosition>, BrokerError>;
}

#[async_trait]
pub trait MarketClockPort: Send + Sync {
    async fn is_market_open(&self, correlation_id: &CorrelationId) -> Result<bool, MarketDataError>;
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionQuality {
    pub slippage_bps: Option<Decimal>,
    pub requested_amount: Decimal,
    pub filled_amount: Decimal,
}

#[async_trait]
pub trait TradeLedgerPort: Send + Sync {
    async fn record_filled_order(
        &self,
        result: &OrderResult,
        correlation_id: &CorrelationId,
        strategy_attribution: &str,
        execution_quality: &ExecutionQuality,
    ) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PnlSnapshot {
    pub realized: Decimal,
    pub unrealized: Decimal,
}

#[async_trait]
pub trait PnlServicePort: Send + Sync {
    async fn get_monthly_pnl(&self) -> Result<PnlSnapshot, CollaboratorError>;

    async fn get_period_pnl(&self, period_days: u32) -> Result<PnlSnapshot, CollaboratorError>;
}

#[async_trait]
pub trait MarketDataRefreshPort: Send + Sync {
    async fn refresh_symbol(&self, symbol: &str) -> Result<(bool, serde_json::Value), MarketDataError>;

    async fn seed_initial_data(
        &self,
        symbols: &[String],
        lookback_days: u32,
    ) -> Result<std::collections::HashMap<String, bool>, MarketDataError>;
}

/// Queue-driven fakes for every collaborator port - kept as an ordinary (not `#[cfg(test)]`)
/// module so that downstream crates, not just this crate's own unit tests, can depend on it for
/// integration tests without a `#[cfg(test)]` boundary crossing a crate edge.
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Deterministic, queue-driven [`BrokerPort`] for tests: each call pops the next
    /// pre-programmed response, panicking (loudly, in a test) if the queue runs dry so a test
    /// that under-primes its fixture fails fast rather than silently returning a default.
    #[derive(Default)]
    pub struct MockBroker {
        pub order_responses: Mutex<std::collections::VecDeque<Result<OrderResult, BrokerError>>>,
        pub positions: Mutex<HashMap<String, Decimal>>,
        pub prices: Mutex<HashMap<String, Decimal>>,
        pub account: Mutex<Account>,
    }

    impl MockBroker {
        pub fn new() -> Self {
            Self {
                order_responses: Mutex::new(Default::default()),
                positions: Mutex::new(HashMap::new()),
                prices: Mutex::new(HashMap::new()),
                account: Mutex::new(Account {
                    equity: Decimal::ZERO,
                    cash: Decimal::ZERO,
                    long_market_value: Decimal::ZERO,
                    short_market_value: Decimal::ZERO,
                }),
            }
        }

        pub fn push_order_result(&self, result: Result<OrderResult, BrokerError>) {
            self.order_responses.lock().push_back(result);
        }

        pub fn set_position(&self, symbol: &str, qty: Decimal) {
            self.positions.lock().insert(symbol.to_owned(), qty);
        }

        pub fn set_price(&self, symbol: &str, price: Decimal) {
            self.prices.lock().insert(symbol.to_owned(), price);
        }
    }

    #[async_trait]
    impl BrokerPort for MockBroker {
        async fn place_order(
            &self,
            _symbol: &str,
            _side: Action,
            _qty: Decimal,
            _correlation_id: &CorrelationId,
            _is_complete_exit: bool,
            _planned_amount: Decimal,
            _strategy_id: &str,
        ) -> Result<OrderResult, BrokerError> {
            self.order_responses
                .lock()
                .pop_front()
                .expect("MockBroker: no order response primed for this call")
        }

        async fn get_position(&self, symbol: &str) -> Result<Option<Position>, BrokerError> {
            Ok(self.positions.lock().get(symbol).map(|&qty| Position { qty }))
        }

        async fn get_current_price(&self, symbol: &str) -> Result<Option<Decimal>, MarketDataError> {
            Ok(self.prices.lock().get(symbol).copied())
        }

        async fn get_account(&self) -> Result<Account, BrokerError> {
            Ok(*self.account.lock())
        }

        async fn get_positions(&self) -> Result<Vec<SymbolPosition>, BrokerError> {
            Ok(self
                .positions
                .lock()
                .iter()
                .map(|(symbol, &qty)| SymbolPosition {
                    symbol: symbol.clone(),
                    qty,
                    market_value: Decimal::ZERO,
                })
                .collect())
        }
    }

    pub struct MockMarketClock {
        pub open: Mutex<bool>,
    }

    impl MockMarketClock {
        pub fn new(open: bool) -> Self {
            Self { open: Mutex::new(open) }
        }

        pub fn set_open(&self, open: bool) {
            *self.open.lock() = open;
        }
    }

    #[async_trait]
    impl MarketClockPort for MockMarketClock {
        async fn is_market_open(&self, _correlation_id: &CorrelationId) -> Result<bool, MarketDataError> {
            Ok(*self.open.lock())
        }
    }

    #[derive(Default)]
    pub struct MockTradeLedger {
        pub recorded: Mutex<Vec<OrderResult>>,
    }

    #[async_trait]
    impl TradeLedgerPort for MockTradeLedger {
        async fn record_filled_order(
            &self,
            result: &OrderResult,
            _correlation_id: &CorrelationId,
            _strategy_attribution: &str,
            _execution_quality: &ExecutionQuality,
        ) -> Result<(), CollaboratorError> {
            self.recorded.lock().push(result.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockPnlService;

    #[async_trait]
    impl PnlServicePort for MockPnlService {
        async fn get_monthly_pnl(&self) -> Result<PnlSnapshot, CollaboratorError> {
            Ok(PnlSnapshot {
                realized: Decimal::ZERO,
                unrealized: Decimal::ZERO,
            })
        }

        async fn get_period_pnl(&self, _period_days: u32) -> Result<PnlSnapshot, CollaboratorError> {
            Ok(PnlSnapshot {
                realized: Decimal::ZERO,
                unrealized: Decimal::ZERO,
            })
        }
    }

    #[derive(Default)]
    pub struct MockMarketDataRefresh;

    #[async_trait]
    impl MarketDataRefreshPort for MockMarketDataRefresh {
        async fn refresh_symbol(&self, _symbol: &str) -> Result<(bool, serde_json::Value), MarketDataError> {
            Ok((true, serde_json::json!({})))
        }

        async fn seed_initial_data(
            &self,
            symbols: &[String],
            _lookback_days: u32,
        ) -> Result<HashMap<String, bool>, MarketDataError> {
            Ok(symbols.iter().map(|s| (s.clone(), true)).collect())
        }
    }
}
