use crate::error::ExecutionError;
use basis_data::MarketDataValue;
use basis_instrument::{
    execution::ExecutionHandshake, order::Order, position::PositionKey, venue::VenueId, Timestamp,
};
use std::collections::HashMap;

/// One `VenueInterface` per venue (spec.md §4.9). Exposes the three interaction modes a venue
/// offers the engine: private order execution, private position queries, and public market data.
///
/// Backtest implementations are fully simulated against a `DataProvider`; live implementations
/// wrap a real exchange/chain client. Both sides of that split implement this same trait so
/// `VenueInterfaceManager` and `ExecutionManager` never need to know which mode is active.
pub trait VenueInterface: Send + Sync {
    fn venue(&self) -> &VenueId;

    /// Advance this venue's notion of "now" to `t`. A no-op for live venues (wall-clock time is
    /// authoritative); backtest venues use this to price fills and answer queries off `t` rather
    /// than wall-clock time, preserving determinism (invariant P3) and no-forward-bias (P4).
    fn advance_to(&self, _t: Timestamp) {}

    /// Submit `order` to this venue and return the authoritative result of doing so.
    fn execute(&self, order: &Order) -> Result<ExecutionHandshake, ExecutionError>;

    /// Query this venue's authoritative (real) balances for the given position keys.
    fn query_positions(
        &self,
        keys: &[PositionKey],
    ) -> Result<HashMap<PositionKey, rust_decimal::Decimal>, ExecutionError>;

    /// Query this venue's authoritative market data for the given data kinds.
    fn query_market(
        &self,
        kinds: &[String],
    ) -> Result<HashMap<String, MarketDataValue>, ExecutionError>;
}
