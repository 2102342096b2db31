use crate::venue::VenueId;
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use smol_str::SmolStr;

/// Venue-side operation an [`Order`] requests.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum Operation {
    SpotTrade,
    PerpTrade,
    Supply,
    Withdraw,
    Borrow,
    Repay,
    Stake,
    Unstake,
    Transfer,
    /// A nested sequence of sub-operations dispatched as a single `execute` and reconciled once;
    /// all-or-nothing semantics are the venue's responsibility.
    FlashAtomic,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum OrderType {
    Market,
    Limit,
}

/// A single sub-operation nested inside a [`Operation::FlashAtomic`] order's `metadata`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AtomicStep {
    pub operation: Operation,
    pub pair: Option<SmolStr>,
    pub side: Option<Side>,
    pub amount: Decimal,
}

/// Produced by `StrategyManager`, consumed by `ExecutionManager`. Orders are processed strictly
/// sequentially within one timestep; a `Vec<Order>` preserves the strategy's intended execution
/// order end to end.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub venue: VenueId,
    pub operation: Operation,
    pub pair: Option<SmolStr>,
    pub side: Option<Side>,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub order_type: OrderType,
    pub metadata: Option<JsonValue>,
}

impl Order {
    pub fn new(venue: impl Into<VenueId>, operation: Operation, amount: Decimal, order_type: OrderType) -> Self {
        Self {
            venue: venue.into(),
            operation,
            pair: None,
            side: None,
            amount,
            price: None,
            order_type,
            metadata: None,
        }
    }

    /// `true` for orders whose `operation` requires reconciliation to not be skipped even on a
    /// venue-reported failure (execution engine `required` flag referenced in §4.10).
    pub fn is_required(&self) -> bool {
        !matches!(self.operation, Operation::Transfer)
    }

    /// The nested sub-operations of a [`Operation::FlashAtomic`] order, if present in metadata.
    pub fn atomic_steps(&self) -> Option<Vec<AtomicStep>> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.get("atomic_steps"))
            .and_then(|steps| serde_json::from_value(steps.clone()).ok())
    }
}
