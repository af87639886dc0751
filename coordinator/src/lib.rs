#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Coordinator
//! The core of a distributed algorithmic-trading execution coordinator: six collaborating
//! components that turn a planned rebalance into placed orders with strict SELL-before-BUY
//! ordering, idempotent retries, and exactly-one outcome event per trade and per run.
//!
//! * [`worker`] - the Trade Execution Worker (C4), a stateless consumer that turns one
//!   execution-queue envelope into exactly one outcome event.
//! * [`phase`] - the Phase Coordinator (C5), which decides when the SELL phase has closed out and
//!   whether to guard-trip the run or release the buffered BUY trades.
//! * [`aggregator`] - the Run Aggregator (C6), a single-winner claim that emits the terminal
//!   `AllTradesCompleted` event once every trade in a run is done.
//! * [`fetch_lock`] - the Fetch-Lock Coordinator (C3), which collapses concurrent market-data
//!   refresh demands for the same symbol into a single fetch.
//! * [`event`] - the closed [`event::CoreEvent`] union of every event the core can emit, plus the
//!   messages it consumes off the execution and fetch-request queues.
//! * [`idempotency`] - the deterministic digest and duplicate check shared by every component that
//!   must not double-execute a trade.
//! * [`settings`], [`error`], [`logging`], [`shutdown`] - the ambient stack: runtime configuration,
//!   the top-level error taxonomy, structured logging initialisers, and graceful shutdown signals.
//!
//! The Run State Store (C1) and Event Bus Adapter (C2) this core depends on live in the
//! `coordinator-execution` crate, along with the data model and collaborator ports
//! (`BrokerPort`, `MarketClockPort`, `TradeLedgerPort`, `PnlServicePort`, `MarketDataRefreshPort`).

/// The Run Aggregator (C6): single-winner claim and terminal-event emission.
pub mod aggregator;

/// The top-level error taxonomy, wrapping every collaborator error this core can surface.
pub mod error;

/// Inputs to, and outputs from, the core: the closed [`event::CoreEvent`] union.
pub mod event;

/// The Fetch-Lock Coordinator (C3): single-writer admission for market-data refreshes.
pub mod fetch_lock;

/// Deterministic idempotency digest and duplicate-check helpers shared across components.
pub mod idempotency;

/// Structured Tracing logging initialisers.
pub mod logging;

/// The Phase Coordinator (C5): SELL-phase completion, guard trip, BUY-phase release.
pub mod phase;

/// Runtime configuration for every tunable threshold and retry bound the core reads.
pub mod settings;

/// Traits and types related to component shutdowns.
pub mod shutdown;

/// The Trade Execution Worker (C4): one envelope in, exactly one outcome event out.
pub mod worker;
