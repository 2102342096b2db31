use crate::{
    error::EngineError,
    position_monitor::PositionMonitor,
};
use basis_instrument::{
    delta::{Delta, DeltaSource},
    execution::ExecutionHandshake,
    order::{Operation, Order},
    position::{PositionKey, PositionType},
    venue::VenueId,
    Timestamp,
};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Outcome of [`PositionUpdateHandler::reconcile`]: either every key matched within tolerance, or
/// the caller gets the keys that didn't so it can decide whether to retry (live) or fail fast
/// (backtest), per spec.md §4.10.
#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    pub success: bool,
    pub mismatches: Vec<(PositionKey, Decimal, Decimal)>,
}

/// Heuristic mirror of `basis_execution::backtest::position_type_for`: an `ExecutionHandshake`'s
/// `position_deltas` is keyed by a bare symbol for some `VenueInterface` implementations, so a
/// key that doesn't parse back into a full `PositionKey` is reconstructed from the order that
/// produced it.
fn position_type_for(operation: Operation) -> PositionType {
    match operation {
        Operation::PerpTrade => PositionType::Perp,
        Operation::Supply => PositionType::AToken,
        Operation::Borrow => PositionType::DebtToken,
        _ => PositionType::Spot,
    }
}

pub(crate) fn resolve_key(order: &Order, raw_key: &str) -> PositionKey {
    PositionKey::from_str(raw_key).unwrap_or_else(|_| {
        PositionKey::new(order.venue.clone(), position_type_for(order.operation), raw_key)
    })
}

/// Converts an `ExecutionHandshake` into position deltas, applies them, and reconciles the
/// `PositionMonitor`'s simulated view against the venue's authoritative one (spec.md §4.10).
///
/// On success, drives the downstream chain — `ExposureMonitor` → `RiskMonitor` → `PnLCalculator`
/// — as a single atomic unit: any failure anywhere in that chain counts as a reconciliation
/// failure for the tight loop's retry purposes, since a reconciled-but-unattributed position
/// update would leave the engine's risk view silently stale.
#[derive(Debug)]
pub struct PositionUpdateHandler {
    tolerance: Decimal,
}

impl PositionUpdateHandler {
    pub fn new(tolerance: Decimal) -> Self {
        Self { tolerance }
    }

    pub(crate) fn deltas_from_handshake(handshake: &ExecutionHandshake) -> Vec<Delta> {
        handshake
            .position_deltas
            .iter()
            .map(|(raw_key, amount)| {
                let key = resolve_key(&handshake.order, raw_key);
                Delta::new(key, *amount, DeltaSource::Trade)
                    .with_fee(handshake.fee_amount)
            })
            .collect()
    }

    /// Apply `handshake`'s deltas to `monitor`'s simulated map exactly once, then compare the
    /// resulting simulated values against `real_positions` for every key the handshake touched.
    /// Convenience wrapper around [`Self::compare`] for callers that reconcile in a single shot
    /// (no retry); `ExecutionManager`'s retry loop instead applies the deltas once via
    /// [`Self::deltas_from_handshake`]/`PositionMonitor::apply_execution_deltas` and calls
    /// [`Self::compare`] on each subsequent requery, since re-running this method would
    /// re-apply (double-count) the deltas on every retry.
    pub fn reconcile(
        &self,
        t: Timestamp,
        monitor: &PositionMonitor,
        handshake: &ExecutionHandshake,
        real_positions: &basis_instrument::position::PositionMap,
    ) -> Result<ReconciliationOutcome, EngineError> {
        let deltas = Self::deltas_from_handshake(handshake);
        monitor.apply_execution_deltas(t, &deltas)?;
        let simulated = monitor.current().simulated;
        Ok(self.compare(&deltas, &simulated, real_positions))
    }

    /// Pure comparison: no mutation. Compares the already-applied `simulated` map's values for
    /// each of `deltas`' keys against `real_positions`, within `self.tolerance`.
    pub fn compare(
        &self,
        deltas: &[Delta],
        simulated: &basis_instrument::position::PositionMap,
        real_positions: &basis_instrument::position::PositionMap,
    ) -> ReconciliationOutcome {
        let mut mismatches = Vec::new();
        for delta in deltas {
            let simulated_value = simulated
                .get(&delta.position_key)
                .copied()
                .unwrap_or_default();
            let real_value = real_positions
                .get(&delta.position_key)
                .copied()
                .unwrap_or_default();
            if (simulated_value - real_value).abs() > self.tolerance {
                mismatches.push((delta.position_key.clone(), simulated_value, real_value));
            }
        }

        ReconciliationOutcome {
            success: mismatches.is_empty(),
            mismatches,
        }
    }

    /// `true` if `venue`/`operation` paired with `handshake.status` constitutes a reconciliation
    /// candidate at all — an order whose `required()` is false (eg/ a `Transfer`) that failed at
    /// the venue is not treated as a reconciliation failure (spec.md §4.10 "required" flag).
    pub fn should_reconcile(handshake: &ExecutionHandshake) -> bool {
        handshake.is_executed() || handshake.order.is_required()
    }

    pub fn venue_of(handshake: &ExecutionHandshake) -> &VenueId {
        &handshake.order.venue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis_instrument::{execution::ExecutionStatus, order::OrderType, position::PositionMap};
    use rust_decimal_macros::dec;
    use std::collections::{HashMap, HashSet};

    fn handshake() -> ExecutionHandshake {
        let order = Order::new(VenueId::from("binance"), Operation::SpotTrade, dec!(1), OrderType::Market);
        let key = PositionKey::new(VenueId::from("binance"), PositionType::Spot, "BTCUSDT");
        let mut position_deltas = HashMap::new();
        position_deltas.insert(smol_str::SmolStr::new(key.to_string()), dec!(1));

        ExecutionHandshake {
            order,
            status: ExecutionStatus::Executed,
            executed_amount: dec!(1),
            executed_price: Some(dec!(50000)),
            position_deltas,
            fee_amount: dec!(0),
            fee_currency: smol_str::SmolStr::new("BTCUSDT"),
            trade_id: None,
            error_code: None,
            error_message: None,
        }
    }

    #[test]
    fn reconcile_succeeds_when_real_matches_simulated() {
        let key = PositionKey::new(VenueId::from("binance"), PositionType::Spot, "BTCUSDT");
        let mut subs = HashSet::new();
        subs.insert(key.clone());
        let monitor = PositionMonitor::new(subs, HashSet::new());
        let handler = PositionUpdateHandler::new(dec!(0.0001));

        let mut real = PositionMap::new();
        real.insert(key.clone(), dec!(1));

        let outcome = handler
            .reconcile(Timestamp::from_timestamp(0, 0).unwrap(), &monitor, &handshake(), &real)
            .unwrap();
        assert!(outcome.success);
    }

    #[test]
    fn reconcile_reports_mismatch_beyond_tolerance() {
        let key = PositionKey::new(VenueId::from("binance"), PositionType::Spot, "BTCUSDT");
        let mut subs = HashSet::new();
        subs.insert(key.clone());
        let monitor = PositionMonitor::new(subs, HashSet::new());
        let handler = PositionUpdateHandler::new(dec!(0.0001));

        let real = PositionMap::new();

        let outcome = handler
            .reconcile(Timestamp::from_timestamp(0, 0).unwrap(), &monitor, &handshake(), &real)
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.mismatches.len(), 1);
    }
}
