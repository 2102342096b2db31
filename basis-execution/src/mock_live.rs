use crate::{error::ExecutionError, interface::VenueInterface};
use basis_data::MarketDataValue;
use basis_instrument::{
    execution::{ExecutionHandshake, ExecutionStatus},
    order::Order,
    position::PositionKey,
    venue::VenueId,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Mock live `VenueInterface` used to drive the reconciliation retry scenarios (spec.md §8 S3,
/// S4): `execute` always succeeds immediately, but `query_positions` returns stale data for the
/// first `stale_reconciliation_count` calls before returning the correct (post-execution) value,
/// or forever if `stale_reconciliation_count` is `u32::MAX`.
#[derive(Debug)]
pub struct MockLiveVenue {
    venue: VenueId,
    stale_reconciliation_count: u32,
    query_calls: Mutex<u32>,
    fee_rate_bps: u32,
}

impl MockLiveVenue {
    pub fn new(venue: VenueId, stale_reconciliation_count: u32, fee_rate_bps: u32) -> Self {
        Self {
            venue,
            stale_reconciliation_count,
            query_calls: Mutex::new(0),
            fee_rate_bps,
        }
    }

    /// Convenience constructor for S4: never converges.
    pub fn always_stale(venue: VenueId) -> Self {
        Self::new(venue, u32::MAX, 0)
    }
}

impl VenueInterface for MockLiveVenue {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    fn execute(&self, order: &Order) -> Result<ExecutionHandshake, ExecutionError> {
        let fee = order.amount * Decimal::from(self.fee_rate_bps) / Decimal::from(10_000u32);
        let pair = order
            .pair
            .clone()
            .unwrap_or_else(|| smol_str::SmolStr::new("unknown"));

        let mut position_deltas = HashMap::new();
        position_deltas.insert(pair.clone(), order.amount);

        Ok(ExecutionHandshake {
            order: order.clone(),
            status: ExecutionStatus::Executed,
            executed_amount: order.amount,
            executed_price: order.price,
            position_deltas,
            fee_amount: fee,
            fee_currency: pair,
            trade_id: None,
            error_code: None,
            error_message: None,
        })
    }

    /// Returns a zeroed (stale) map for the first `stale_reconciliation_count` calls, then the
    /// value supplied by the caller-visible `keys` themselves is irrelevant: the mock always
    /// reports zero while stale and `Decimal::ONE` once converged, letting the caller compare
    /// against the expected post-execution amount.
    fn query_positions(
        &self,
        keys: &[PositionKey],
    ) -> Result<HashMap<PositionKey, Decimal>, ExecutionError> {
        let mut calls = self.query_calls.lock();
        let call_index = *calls;
        *calls += 1;

        let converged = call_index >= self.stale_reconciliation_count;
        let value = if converged { Decimal::ONE } else { Decimal::ZERO };

        Ok(keys.iter().map(|key| (key.clone(), value)).collect())
    }

    fn query_market(
        &self,
        _kinds: &[String],
    ) -> Result<HashMap<String, MarketDataValue>, ExecutionError> {
        Ok(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis_instrument::position::PositionType;
    use rust_decimal_macros::dec;

    #[test]
    fn converges_after_stale_count() {
        let venue = MockLiveVenue::new(VenueId::from("binance"), 2, 10);
        let key = PositionKey::new(VenueId::from("binance"), PositionType::Spot, "BTCUSDT");

        let first = venue.query_positions(&[key.clone()]).unwrap();
        let second = venue.query_positions(&[key.clone()]).unwrap();
        let third = venue.query_positions(&[key.clone()]).unwrap();

        assert_eq!(first[&key], dec!(0));
        assert_eq!(second[&key], dec!(0));
        assert_eq!(third[&key], dec!(1));
    }

    #[test]
    fn always_stale_never_converges() {
        let venue = MockLiveVenue::always_stale(VenueId::from("binance"));
        let key = PositionKey::new(VenueId::from("binance"), PositionType::Spot, "BTCUSDT");

        for _ in 0..10 {
            let result = venue.query_positions(&[key.clone()]).unwrap();
            assert_eq!(result[&key], dec!(0));
        }
    }
}
