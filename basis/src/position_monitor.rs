use crate::error::EngineError;
use basis_instrument::{
    delta::Delta,
    position::{self, PositionKey, PositionMap},
    Timestamp,
};
use parking_lot::Mutex;
use std::collections::HashSet;

/// A read-only snapshot of both tracked position maps at a given `T` (spec.md §4.2 `current(T)`).
#[derive(Debug, Clone)]
pub struct PositionSnapshot {
    pub simulated: PositionMap,
    pub real: PositionMap,
}

/// What triggered a call to [`PositionMonitor::refresh`]: the engine's per-timestep tick, or the
/// tight loop re-querying after a reconciliation mismatch.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RefreshTrigger {
    Timestep,
    ReconciliationRetry,
}

/// Owns the two position maps every other component reads from (spec.md §4.2): `simulated`
/// (what the engine's own bookkeeping believes is true, mutated only via deltas) and `real`
/// (what backtest settlement or a live venue query reports as authoritative). Both maps are
/// addressed exclusively by [`PositionKey`], and a key not present in `position_subscriptions`
/// at construction is a programming error (`UnknownPositionKey`), per `apply_delta`'s doc comment
/// on invariant P1.
#[derive(Debug)]
pub struct PositionMonitor {
    simulated_positions: Mutex<PositionMap>,
    real_positions: Mutex<PositionMap>,
    position_subscriptions: HashSet<PositionKey>,
    /// Keys for which a negative resulting balance is rejected rather than applied (spec.md
    /// §4.2 "optional `NegativeBalanceProhibited` per-key configuration").
    negative_balance_prohibited: HashSet<PositionKey>,
}

impl PositionMonitor {
    pub fn new(
        position_subscriptions: HashSet<PositionKey>,
        negative_balance_prohibited: HashSet<PositionKey>,
    ) -> Self {
        Self {
            simulated_positions: Mutex::new(PositionMap::new()),
            real_positions: Mutex::new(PositionMap::new()),
            position_subscriptions,
            negative_balance_prohibited,
        }
    }

    fn check_subscribed(&self, key: &PositionKey) -> Result<(), EngineError> {
        if !self.position_subscriptions.contains(key) {
            return Err(EngineError::UnknownPositionKey(key.clone()));
        }
        Ok(())
    }

    /// Seed `simulated_positions` (and, in backtest, `real_positions`) with the request's initial
    /// capital delta before the first timestep runs (spec.md §4.1 "Initial capital seeding").
    pub fn seed(&self, deltas: &[Delta], is_backtest: bool) -> Result<(), EngineError> {
        self.apply(&mut self.simulated_positions.lock(), deltas)?;
        if is_backtest {
            self.apply(&mut self.real_positions.lock(), deltas)?;
        }
        Ok(())
    }

    fn apply(&self, positions: &mut PositionMap, deltas: &[Delta]) -> Result<(), EngineError> {
        for delta in deltas {
            self.check_subscribed(&delta.position_key)?;
            let projected =
                positions.get(&delta.position_key).copied().unwrap_or_default() + delta.delta_amount;
            if projected.is_sign_negative()
                && self.negative_balance_prohibited.contains(&delta.position_key)
            {
                return Err(EngineError::NegativeBalanceProhibited(
                    delta.position_key.clone(),
                ));
            }
            position::apply_delta(positions, &delta.position_key, delta.delta_amount);
        }
        Ok(())
    }

    /// Apply execution-driven deltas to `simulated_positions`. Called from
    /// `PositionUpdateHandler::reconcile` before settlement deltas for the same `T`, per the
    /// ordering invariant documented on [`Self::refresh`].
    pub fn apply_execution_deltas(
        &self,
        _t: Timestamp,
        deltas: &[Delta],
    ) -> Result<(), EngineError> {
        self.apply(&mut self.simulated_positions.lock(), deltas)
    }

    /// Apply scheduled settlement deltas (funding, staking rewards, AAVE accrual) due at `t`
    /// (spec.md §4.2). In backtest `real_positions` is then overwritten with
    /// `simulated_positions` in full, since there is no independent authoritative source; in live
    /// mode `real_positions` is left untouched here and is instead refreshed by
    /// [`Self::refresh`]'s venue-query path.
    ///
    /// Ordering within one `T` is load-bearing: execution deltas (via
    /// [`Self::apply_execution_deltas`]) must land before settlement deltas applied here, so a
    /// trade placed at `T` is reflected before that same `T`'s accruals compound on top of it.
    pub fn apply_settlements(
        &self,
        settlement_deltas: &[Delta],
        is_backtest: bool,
    ) -> Result<(), EngineError> {
        self.apply(&mut self.simulated_positions.lock(), settlement_deltas)?;
        if is_backtest {
            let simulated = self.simulated_positions.lock().clone();
            *self.real_positions.lock() = simulated;
        }
        Ok(())
    }

    /// In live mode, overwrite `real_positions` with freshly queried venue balances. Backtest has
    /// no independent authoritative source, so this is a no-op there (`real_positions` tracks
    /// `simulated_positions` via [`Self::apply_settlements`] instead).
    pub fn refresh_from_venues(&self, queried: PositionMap) {
        *self.real_positions.lock() = queried;
    }

    /// Read-only snapshot of both maps. Never mutated in place by the caller.
    pub fn current(&self) -> PositionSnapshot {
        PositionSnapshot {
            simulated: self.simulated_positions.lock().clone(),
            real: self.real_positions.lock().clone(),
        }
    }

    pub fn subscriptions(&self) -> &HashSet<PositionKey> {
        &self.position_subscriptions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis_instrument::{delta::DeltaSource, position::PositionType, venue::VenueId};
    use rust_decimal_macros::dec;

    fn key() -> PositionKey {
        PositionKey::new(VenueId::from("wallet"), PositionType::BaseToken, "ETH")
    }

    #[test]
    fn unknown_key_is_rejected() {
        let monitor = PositionMonitor::new(HashSet::new(), HashSet::new());
        let delta = Delta::new(key(), dec!(1), DeltaSource::Initial);
        let err = monitor.seed(&[delta], true).unwrap_err();
        assert!(matches!(err, EngineError::UnknownPositionKey(_)));
    }

    #[test]
    fn seed_populates_both_maps_in_backtest() {
        let mut subs = HashSet::new();
        subs.insert(key());
        let monitor = PositionMonitor::new(subs, HashSet::new());
        let delta = Delta::new(key(), dec!(10), DeltaSource::Initial);
        monitor.seed(&[delta], true).unwrap();

        let snapshot = monitor.current();
        assert_eq!(snapshot.simulated.get(&key()), Some(&dec!(10)));
        assert_eq!(snapshot.real.get(&key()), Some(&dec!(10)));
    }

    #[test]
    fn negative_balance_prohibited_key_rejects_overdraft() {
        let mut subs = HashSet::new();
        subs.insert(key());
        let mut prohibited = HashSet::new();
        prohibited.insert(key());
        let monitor = PositionMonitor::new(subs, prohibited);

        let err = monitor
            .seed(&[Delta::new(key(), dec!(-5), DeltaSource::Initial)], true)
            .unwrap_err();
        assert!(matches!(err, EngineError::NegativeBalanceProhibited(_)));
    }

    #[test]
    fn settlements_copy_simulated_into_real_in_backtest() {
        let mut subs = HashSet::new();
        subs.insert(key());
        let monitor = PositionMonitor::new(subs, HashSet::new());
        monitor
            .apply_execution_deltas(
                Timestamp::from_timestamp(0, 0).unwrap(),
                &[Delta::new(key(), dec!(5), DeltaSource::Trade)],
            )
            .unwrap();
        monitor
            .apply_settlements(&[Delta::new(key(), dec!(1), DeltaSource::Funding)], true)
            .unwrap();

        let snapshot = monitor.current();
        assert_eq!(snapshot.simulated.get(&key()), Some(&dec!(6)));
        assert_eq!(snapshot.real.get(&key()), Some(&dec!(6)));
    }
}
