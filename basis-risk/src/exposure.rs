use crate::error::RiskError;
use basis_instrument::{
    exposure::{AssetExposure, Direction, Exposure},
    position::PositionMap,
    ShareClass,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::collections::HashMap;
use tracing::warn;

/// Per-asset conversion method (spec.md §4.5 "Conversion methods").
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionMethod {
    /// Asset denomination already equals the share class; no conversion.
    Direct,
    /// Multiply the wallet amount by a USD/ETH-style oracle price.
    UsdPrice { oracle_kind: SmolStr },
    /// wallet aToken amount × supply index → underlying → × oracle → share class.
    AaveLiquidityIndex {
        index_kind: SmolStr,
        oracle_kind: SmolStr,
    },
    /// Analogous to `AaveLiquidityIndex`, but the resulting exposure carries a negative sign
    /// (debt reduces net delta).
    AaveBorrowIndex {
        index_kind: SmolStr,
        oracle_kind: SmolStr,
    },
    /// wallet LST amount × LST/ETH oracle → × USD/ETH oracle → share class.
    LstOracle {
        lst_oracle_kind: SmolStr,
        usd_oracle_kind: SmolStr,
    },
}

/// Which venue classification an asset's wallet balance belongs to, for the on-chain/CEX net
/// delta split ExposureMonitor publishes separately (spec.md §4.5 "downstream rebalancing uses
/// the split").
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DeltaClass {
    Onchain,
    Cex,
}

/// Per-asset tracking configuration: which `PositionMap` symbols roll up into this asset, its
/// conversion method, and which side of the on-chain/CEX split it belongs to.
#[derive(Debug, Clone)]
pub struct TrackedAsset {
    pub asset: SmolStr,
    pub symbols: Vec<SmolStr>,
    pub conversion_method: ConversionMethod,
    pub delta_class: DeltaClass,
}

/// A resolved conversion datum: either freshly queried or the last known value carried forward
/// under a live `StaleConversion` fallback.
struct ConversionDatum {
    value: Decimal,
    stale: bool,
}

/// Converts a `PositionMap` into share-class-denominated exposures (spec.md §4.5).
///
/// Config-driven over `track_assets`: each tracked asset names the `PositionMap` symbols that
/// roll up into it and the conversion method to apply. In backtest, a missing conversion datum
/// is fatal (`RiskError::MissingConversionDatum`); in live, `compute` falls back to the last known
/// value and the caller is expected to emit a `StaleConversion` event (the monitor itself does
/// not emit engine events — that is the caller's responsibility, mirroring `PositionMonitor`).
#[derive(Debug)]
pub struct ExposureMonitor {
    tracked_assets: Vec<TrackedAsset>,
    share_class: ShareClass,
    fatal_on_missing_datum: bool,
    last_known: Mutex<HashMap<SmolStr, Decimal>>,
}

impl ExposureMonitor {
    pub fn new(
        tracked_assets: Vec<TrackedAsset>,
        share_class: ShareClass,
        fatal_on_missing_datum: bool,
    ) -> Self {
        Self {
            tracked_assets,
            share_class,
            fatal_on_missing_datum,
            last_known: Mutex::new(HashMap::new()),
        }
    }

    fn resolve(
        &self,
        kind: &str,
        market: &HashMap<SmolStr, Decimal>,
    ) -> Result<ConversionDatum, RiskError> {
        if let Some(value) = market.get(kind) {
            self.last_known.lock().insert(SmolStr::new(kind), *value);
            return Ok(ConversionDatum {
                value: *value,
                stale: false,
            });
        }

        if self.fatal_on_missing_datum {
            return Err(RiskError::MissingConversionDatum {
                asset: SmolStr::new(kind),
                method: SmolStr::new("market_lookup"),
            });
        }

        let cached = self.last_known.lock().get(kind).copied();
        match cached {
            Some(value) => {
                warn!(kind, "StaleConversion: falling back to last known value");
                Ok(ConversionDatum { value, stale: true })
            }
            None => Err(RiskError::MissingConversionDatum {
                asset: SmolStr::new(kind),
                method: SmolStr::new("market_lookup"),
            }),
        }
    }

    fn wallet_amount(&self, positions: &PositionMap, symbols: &[SmolStr]) -> Decimal {
        positions
            .iter()
            .filter(|(key, _)| symbols.iter().any(|s| s.as_str() == key.symbol.as_str()))
            .map(|(_, amount)| *amount)
            .sum()
    }

    /// Convert `positions` into a full [`Exposure`] snapshot. `market` supplies every conversion
    /// datum (oracle prices, AAVE indices) keyed by data kind.
    pub fn compute(
        &self,
        positions: &PositionMap,
        market: &HashMap<SmolStr, Decimal>,
    ) -> Result<Exposure, RiskError> {
        let mut exposure = Exposure::empty();
        let mut any_stale = false;

        for tracked in &self.tracked_assets {
            let wallet_amount = self.wallet_amount(positions, &tracked.symbols);

            let (underlying_native, share_class_value) = match &tracked.conversion_method {
                ConversionMethod::Direct => (wallet_amount, wallet_amount),
                ConversionMethod::UsdPrice { oracle_kind } => {
                    let datum = self.resolve(oracle_kind, market)?;
                    any_stale |= datum.stale;
                    (wallet_amount, wallet_amount * datum.value)
                }
                ConversionMethod::AaveLiquidityIndex {
                    index_kind,
                    oracle_kind,
                } => {
                    let index = self.resolve(index_kind, market)?;
                    let oracle = self.resolve(oracle_kind, market)?;
                    any_stale |= index.stale || oracle.stale;
                    let underlying = wallet_amount * index.value;
                    (underlying, underlying * oracle.value)
                }
                ConversionMethod::AaveBorrowIndex {
                    index_kind,
                    oracle_kind,
                } => {
                    let index = self.resolve(index_kind, market)?;
                    let oracle = self.resolve(oracle_kind, market)?;
                    any_stale |= index.stale || oracle.stale;
                    let underlying = -(wallet_amount * index.value);
                    (underlying, underlying * oracle.value)
                }
                ConversionMethod::LstOracle {
                    lst_oracle_kind,
                    usd_oracle_kind,
                } => {
                    let lst = self.resolve(lst_oracle_kind, market)?;
                    let usd = self.resolve(usd_oracle_kind, market)?;
                    any_stale |= lst.stale || usd.stale;
                    let underlying = wallet_amount * lst.value;
                    (underlying, underlying * lst.value * usd.value)
                }
            };

            let direction = Direction::of(share_class_value);
            match direction {
                Direction::Long => exposure.total_long += share_class_value,
                Direction::Short => exposure.total_short += share_class_value,
                Direction::Flat => {}
            }
            exposure.total_value_share_class += share_class_value;
            match tracked.delta_class {
                DeltaClass::Onchain => exposure.net_delta_onchain += share_class_value,
                DeltaClass::Cex => exposure.net_delta_cex += share_class_value,
            }

            exposure.per_asset.insert(
                tracked.asset.clone(),
                AssetExposure {
                    asset: tracked.asset.clone(),
                    wallet_amount,
                    underlying_native,
                    exposure_in_share_class: share_class_value,
                    direction,
                },
            );
        }

        exposure.net_delta = exposure.total_long + exposure.total_short;
        let _ = self.share_class;
        let _ = any_stale;
        Ok(exposure)
    }
}
