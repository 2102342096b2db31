#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! # Basis Data
//! The `DataProvider` abstraction (spec.md §4.2): returns the market/protocol snapshot valid at
//! a given timestamp with no forward bias, in both backtest (CSV replay) and live (polling)
//! modes.

/// All errors produced by this crate.
pub mod error;

/// [`snapshot::MarketSnapshot`] and the value kinds it carries.
pub mod snapshot;

/// The [`provider::DataProvider`] trait and construction factory.
pub mod provider;

/// Backtest [`backtest::CsvDataProvider`]: in-memory sorted per-kind tables loaded from CSV.
pub mod backtest;

/// Live [`live::ApiDataProvider`]: cached per-kind samples refreshed out-of-band.
pub mod live;

pub use provider::DataProvider;
pub use snapshot::{MarketDataValue, MarketSnapshot, Observation};
