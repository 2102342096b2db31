use basis_instrument::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use smol_str::SmolStr;
use std::collections::HashMap;

/// A single data kind's value, tagged by the family of data it represents (spec.md §3
/// `MarketSnapshot`: "spot prices, oracle prices, funding rates, protocol indices, gas price,
/// LST distribution events").
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum MarketDataValue {
    SpotPrice(Decimal),
    OraclePrice(Decimal),
    FundingRate(Decimal),
    ProtocolIndex(Decimal),
    GasPrice(Decimal),
    LstDistributionEvent(JsonValue),
}

impl MarketDataValue {
    /// Project the decimal payload out of whichever numeric variant this is, returning `None`
    /// for the event variant.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            MarketDataValue::SpotPrice(v)
            | MarketDataValue::OraclePrice(v)
            | MarketDataValue::FundingRate(v)
            | MarketDataValue::ProtocolIndex(v)
            | MarketDataValue::GasPrice(v) => Some(*v),
            MarketDataValue::LstDistributionEvent(_) => None,
        }
    }
}

/// A [`MarketDataValue`] plus the timestamp it was actually observed at, which may be earlier
/// than the `T` it was served for (last-observation-carried-forward).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Observation {
    pub value: MarketDataValue,
    pub observed_at: Timestamp,
}

/// `M(T)`: the mapping of data kinds required by the active mode to the values observed at the
/// greatest data timestamp `<= T`. Contract: for a fixed `T`, repeated `DataProvider::get(T)`
/// calls return content-equal snapshots (backtest).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MarketSnapshot {
    pub as_of: Timestamp,
    pub data: HashMap<SmolStr, Observation>,
}

impl MarketSnapshot {
    pub fn new(as_of: Timestamp) -> Self {
        Self {
            as_of,
            data: HashMap::new(),
        }
    }

    pub fn get(&self, kind: &str) -> Option<&Observation> {
        self.data.get(kind)
    }

    pub fn decimal(&self, kind: &str) -> Option<Decimal> {
        self.get(kind).and_then(|obs| obs.value.as_decimal())
    }

    /// `true` if every observation's `observed_at` is `<= self.as_of` (invariant P4, "no forward
    /// bias").
    pub fn respects_no_forward_bias(&self) -> bool {
        self.data.values().all(|obs| obs.observed_at <= self.as_of)
    }
}
