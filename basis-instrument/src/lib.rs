#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::too_many_arguments, clippy::type_complexity)]

//! # Basis Instrument
//! Core data model for the Basis yield-engine: [`PositionKey`], [`Delta`], [`Order`],
//! [`ExecutionHandshake`], [`Exposure`], [`RiskAssessment`], [`PnLRecord`] and [`Event`].
//!
//! This crate has no I/O and no async dependency; it is the shared vocabulary every other
//! Basis crate builds on.

use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};

/// Venue identification.
pub mod venue;

/// [`PositionKey`], [`PositionType`] and the [`PositionMap`] alias.
pub mod position;

/// The unified position-mutation primitive, [`delta::Delta`].
pub mod delta;

/// [`order::Order`] and related enums produced by `StrategyManager`, consumed by
/// `ExecutionManager`.
pub mod order;

/// [`execution::ExecutionHandshake`], the result of a single venue execution.
pub mod execution;

/// [`exposure::Exposure`] and totals produced by `ExposureMonitor`.
pub mod exposure;

/// [`risk::RiskAssessment`] and [`risk::RiskStatus`] produced by `RiskMonitor`.
pub mod risk;

/// [`pnl::PnLRecord`] produced by `PnLCalculator`.
pub mod pnl;

/// [`event::Event`], the structured record appended by `EventLogger`.
pub mod event;

/// Decimal scale helpers for share-class/asset-denominated amounts.
pub mod scale;

/// Monotonically non-decreasing instant used as the sole `Engine` clock output.
///
/// In backtest this is drawn from a finite sorted sequence of historical timestamps; in live
/// it is produced by the wall clock. No component other than `Engine` constructs one directly.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Accounting currency of a request.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum ShareClass {
    #[display("USDT")]
    Usdt,
    #[display("ETH")]
    Eth,
}

impl ShareClass {
    /// Decimal scale (number of fractional digits) used for this currency's amounts.
    ///
    /// USDT is scaled to 6 d.p., ETH-denominated units to 18 d.p., matching the on-chain/venue
    /// native precision so rate math does not drift (see `scale` module).
    pub fn decimal_scale(&self) -> u32 {
        match self {
            ShareClass::Usdt => 6,
            ShareClass::Eth => 18,
        }
    }
}

/// A value paired with the [`Timestamp`] it was observed/produced at.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Timed<T> {
    pub value: T,
    pub time: Timestamp,
}
