use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;

/// Sign of a per-asset exposure, relative to the share class.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    pub fn of(amount: Decimal) -> Self {
        if amount.is_sign_positive() && !amount.is_zero() {
            Direction::Long
        } else if amount.is_sign_negative() {
            Direction::Short
        } else {
            Direction::Flat
        }
    }
}

/// Per-asset exposure record produced by `ExposureMonitor::compute`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssetExposure {
    pub asset: SmolStr,
    pub wallet_amount: Decimal,
    pub underlying_native: Decimal,
    pub exposure_in_share_class: Decimal,
    pub direction: Direction,
}

/// Full exposure snapshot: per-asset records plus portfolio totals, with the on-chain/CEX net
/// delta split preserved for downstream rebalancing decisions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Exposure {
    pub per_asset: HashMap<SmolStr, AssetExposure>,
    pub total_long: Decimal,
    pub total_short: Decimal,
    /// `total_long + total_short` (short contributes negatively).
    pub net_delta: Decimal,
    pub total_value_share_class: Decimal,
    pub net_delta_onchain: Decimal,
    pub net_delta_cex: Decimal,
}

impl Exposure {
    pub fn empty() -> Self {
        Self {
            per_asset: HashMap::new(),
            total_long: Decimal::ZERO,
            total_short: Decimal::ZERO,
            net_delta: Decimal::ZERO,
            total_value_share_class: Decimal::ZERO,
            net_delta_onchain: Decimal::ZERO,
            net_delta_cex: Decimal::ZERO,
        }
    }
}
