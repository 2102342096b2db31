use crate::venue::VenueId;
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;

/// Kind of position tracked at a `(venue, symbol)` pair.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum PositionType {
    /// A wallet-held base token (eg/ native ETH, a spot CEX balance).
    BaseToken,
    /// An AAVE-style interest-bearing supply token (eg/ aWETH, weETH receipt).
    AToken,
    /// An AAVE-style interest-bearing debt token (eg/ debtWETH).
    DebtToken,
    /// A CEX perpetual futures position.
    Perp,
    /// A CEX spot balance.
    Spot,
}

/// Unique key identifying a tracked position: `venue:position_type:symbol`.
///
/// Keys are unique within a run and are the sole addressing scheme for [`PositionMap`]; a
/// [`crate::delta::Delta`] whose key was not registered in `PositionMonitor`'s
/// `position_subscriptions` at construction is a programming error (`UnknownPositionKey`).
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub struct PositionKey {
    pub venue: VenueId,
    pub position_type: PositionType,
    pub symbol: SmolStr,
}

impl PositionKey {
    pub fn new(venue: impl Into<VenueId>, position_type: PositionType, symbol: impl Into<SmolStr>) -> Self {
        Self {
            venue: venue.into(),
            position_type,
            symbol: symbol.into(),
        }
    }
}

impl std::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.venue, self.position_type, self.symbol)
    }
}

impl std::str::FromStr for PositionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BaseToken" => Ok(PositionType::BaseToken),
            "AToken" => Ok(PositionType::AToken),
            "DebtToken" => Ok(PositionType::DebtToken),
            "Perp" => Ok(PositionType::Perp),
            "Spot" => Ok(PositionType::Spot),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for PositionKey {
    type Err = ();

    /// Inverse of `Display`: `venue:position_type:symbol`. Used by `PositionUpdateHandler` to
    /// recover the key an `ExecutionHandshake`'s `position_deltas` map was populated under.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let venue = parts.next().ok_or(())?;
        let position_type = parts.next().ok_or(())?.parse()?;
        let symbol = parts.next().ok_or(())?;
        Ok(PositionKey {
            venue: VenueId::from(venue),
            position_type,
            symbol: SmolStr::new(symbol),
        })
    }
}

/// Mapping from [`PositionKey`] to a signed decimal amount.
///
/// `PositionMonitor` maintains two of these (`simulated_positions`, `real_positions`); neither
/// is mutated directly by any other component, only via the unified delta applier.
pub type PositionMap = HashMap<PositionKey, Decimal>;

/// Apply a single signed `delta_amount` to a [`PositionMap`] entry, creating it at zero first if
/// absent.
///
/// This is the sole in-process mutation primitive referenced by invariant P1 (delta
/// applicative law): applying `[d1, d2, ..., dn]` in sequence via repeated calls to this function
/// is equal to applying their per-key sums in any order, because decimal addition over a fixed
/// key is commutative and associative.
pub fn apply_delta(positions: &mut PositionMap, key: &PositionKey, delta_amount: Decimal) {
    let entry = positions.entry(key.clone()).or_insert(Decimal::ZERO);
    *entry += delta_amount;
}
