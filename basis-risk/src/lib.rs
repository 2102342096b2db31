#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! # Basis Risk
//! [`exposure::ExposureMonitor`] (spec.md §4.5): converts a `PositionMap` into share-class
//! denominated exposures and net deltas. [`risk::RiskMonitor`] (spec.md §4.6): computes the
//! enabled risk types from exposure and market data, rolling up to an overall severity.

/// All errors produced by this crate.
pub mod error;

/// [`exposure::ExposureMonitor`] and its conversion methods.
pub mod exposure;

/// [`risk::RiskMonitor`] and the five risk types it can compute.
pub mod risk;

pub use error::RiskError;
pub use exposure::ExposureMonitor;
pub use risk::RiskMonitor;
