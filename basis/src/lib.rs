#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! # Basis
//! The CORE trading engine: orchestrates [`engine::Engine`]'s full loop (refresh positions,
//! compute exposure/risk, ask the active `StrategyManager` for orders, execute and reconcile via
//! [`execution_manager::ExecutionManager`], update P&L, persist) across backtest and live modes.
//!
//! A [`request::Request`] is resolved against a mode's [`config::ModeConfig`] and handed to
//! [`bootstrap::build_backtest_engine`] (or the live equivalent) to produce a scoped
//! [`engine::Engine`] instance; a fresh instance is constructed per request (spec.md §3
//! Lifecycle) and discarded when the request completes.

/// The full error taxonomy every component surfaces (spec.md §7).
pub mod error;

/// Structured logging setup.
pub mod logging;

/// Mode configuration: YAML loading, `config_overrides` deep-merge, environment configuration.
pub mod config;

/// The `run_backtest`/`start_live` request object and its status state machine.
pub mod request;

/// `PositionMonitor`: the two tracked `PositionMap`s and their mutation/refresh lifecycle.
pub mod position_monitor;

/// `PositionUpdateHandler`: converts execution handshakes into deltas and reconciles them.
pub mod position_update_handler;

/// `PnLCalculator`: dual-track P&L with reconciliation and drift alerting.
pub mod pnl;

/// `SettlementCalculator`: scheduled funding/reward/AAVE-accrual deltas and their attribution.
pub mod settlement;

/// `ExecutionManager`: the tight loop driving execute/reconcile/retry per order.
pub mod execution_manager;

/// `EventLogger`: append-only structured event sink.
pub mod event_logger;

/// `ResultsStore`: per-timestep result rows and the terminal summary.
pub mod results_store;

/// `Engine`: owns the current-`T` clock and the full-loop orchestration.
pub mod engine;

/// Wires a `Request` and `ModeConfig` into a fully constructed `Engine`.
pub mod bootstrap;

pub use engine::Engine;
pub use error::EngineError;
pub use request::{Request, RequestStatus};
