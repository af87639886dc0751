#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Coordinator-Execution
//! The data model, run state store, event bus, and collaborator port abstractions shared by the
//! execution coordinator's components. Domain semantics live here; the top-level `coordinator`
//! crate wires these pieces into the worker, phase coordinator, fetch-lock, and aggregator.

/// The event bus adapter: [`bus::EventBus`] plus its in-memory and Redis Streams backends.
pub mod bus;

/// Typed errors for every collaborator this crate talks to.
pub mod error;

/// `Run`, `Trade`, `FetchRequest`, and the small enums that classify them.
pub mod model;

/// Collaborator ports (broker, market clock, trade ledger, P&L service, market-data refresh).
pub mod ports;

/// The run state store: [`store::RunStore`] plus its in-memory and Redis backends.
pub mod store;
