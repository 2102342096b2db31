use crate::position::PositionKey;
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Provenance of a [`Delta`], used by `PnLCalculator` to attribute period P&L and by
/// `PositionMonitor`/`PositionUpdateHandler` to distinguish execution-driven mutations from
/// scheduled settlements.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum DeltaSource {
    /// Produced from an [`crate::execution::ExecutionHandshake`].
    Trade,
    /// A wallet/CEX transfer (rebalancing between venues).
    Transfer,
    /// AAVE/perp funding accrual, applied at scheduled settlement boundaries.
    Funding,
    /// Staking or liquidity-mining reward distribution.
    Reward,
    /// Initial capital seeding at request start.
    Initial,
}

/// The sole position-mutation primitive. Every change to a [`crate::position::PositionMap`]
/// is expressed as one or more `Delta`s and applied via [`crate::position::apply_delta`].
///
/// Sign convention: positive `delta_amount` increases the position, negative decreases it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Delta {
    pub position_key: PositionKey,
    pub delta_amount: Decimal,
    pub source: DeltaSource,
    pub price: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub metadata: Option<JsonValue>,
}

impl Delta {
    pub fn new(position_key: PositionKey, delta_amount: Decimal, source: DeltaSource) -> Self {
        Self {
            position_key,
            delta_amount,
            source,
            price: None,
            fee: None,
            metadata: None,
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_fee(mut self, fee: Decimal) -> Self {
        self.fee = Some(fee);
        self
    }
}
