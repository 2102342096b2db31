use crate::{error::ExecutionError, interface::VenueInterface};
use basis_data::{DataProvider, MarketDataValue, MarketSnapshot};
use basis_instrument::{
    execution::{ExecutionHandshake, ExecutionStatus},
    order::{Operation, Order},
    position::{self, PositionKey, PositionMap},
    venue::VenueId,
    Timestamp,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::{collections::HashMap, sync::Arc};

/// Fully simulated venue for backtest (spec.md §4.9: "in backtest all three [interaction modes]
/// are fully simulated against `DataProvider`").
///
/// `execute` fills at the `DataProvider`-derived market price for `order.pair`, applies the
/// resulting delta to an internally tracked [`PositionMap`], and reports it back in the
/// handshake's `position_deltas`. `query_positions` simply reads that same map, so reconciliation
/// against it always succeeds immediately in backtest (no network, no staleness).
pub struct SimulatedVenue {
    venue: VenueId,
    data: Arc<dyn DataProvider>,
    fee_rate: Decimal,
    positions: Mutex<PositionMap>,
    current_t: Mutex<Timestamp>,
}

impl std::fmt::Debug for SimulatedVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedVenue")
            .field("venue", &self.venue)
            .field("fee_rate", &self.fee_rate)
            .finish()
    }
}

impl SimulatedVenue {
    pub fn new(venue: VenueId, data: Arc<dyn DataProvider>, fee_rate: Decimal, initial_t: Timestamp) -> Self {
        Self {
            venue,
            data,
            fee_rate,
            positions: Mutex::new(PositionMap::new()),
            current_t: Mutex::new(initial_t),
        }
    }

    fn snapshot_at(&self, _order: &Order) -> Result<MarketSnapshot, ExecutionError> {
        let t = *self.current_t.lock();
        self.data
            .get(t)
            .map_err(|e| ExecutionError::VenueExecutionFailed {
                venue: self.venue.clone(),
                message: e.to_string(),
            })
    }

    fn price_for(&self, order: &Order) -> Result<Decimal, ExecutionError> {
        if let Some(price) = order.price {
            return Ok(price);
        }
        let pair = order
            .pair
            .as_ref()
            .ok_or_else(|| ExecutionError::VenueExecutionFailed {
                venue: self.venue.clone(),
                message: "order has no pair and no explicit price".into(),
            })?;

        let snapshot = self.snapshot_at(order)?;
        let kind = format!("spot_price.{pair}");
        snapshot
            .decimal(&kind)
            .ok_or_else(|| ExecutionError::VenueExecutionFailed {
                venue: self.venue.clone(),
                message: format!("no spot price for pair '{pair}'"),
            })
    }

    /// Apply a `FlashAtomic` order's nested `atomic_steps` (spec.md §8 S5). Only the
    /// `Supply`/`Withdraw`/`Borrow`/`Repay` legs touch a lasting `AToken`/`DebtToken` position;
    /// the `SpotTrade` legs in between exist purely to convert the flash-borrowed principal and
    /// are never reflected in the wallet, exactly like a real flash loan that never leaves the
    /// transaction. No wallet leg is booked either: the flash-borrowed leg is backed entirely by
    /// the loan itself, not the caller's own balance.
    fn apply_flash_atomic(
        &self,
        order: &Order,
    ) -> Result<HashMap<SmolStr, Decimal>, ExecutionError> {
        let steps = order.atomic_steps().ok_or_else(|| ExecutionError::VenueExecutionFailed {
            venue: self.venue.clone(),
            message: "flash_atomic order missing atomic_steps metadata".into(),
        })?;

        let mut position_deltas: HashMap<SmolStr, Decimal> = HashMap::new();
        let mut positions = self.positions.lock();
        for step in &steps {
            if !matches!(
                step.operation,
                Operation::Supply | Operation::Withdraw | Operation::Borrow | Operation::Repay
            ) {
                continue;
            }

            let pair = step.pair.clone().unwrap_or_else(|| SmolStr::new("unknown"));
            let leg = Order::new(self.venue.clone(), step.operation, step.amount, order.order_type);
            let key = PositionKey::new(self.venue.clone(), position_type_for(&leg), pair);
            let signed_amount = signed_amount_for(&leg);

            position::apply_delta(&mut positions, &key, signed_amount);
            *position_deltas.entry(SmolStr::new(key.to_string())).or_insert(Decimal::ZERO) +=
                signed_amount;
        }

        Ok(position_deltas)
    }
}

impl VenueInterface for SimulatedVenue {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    fn advance_to(&self, t: Timestamp) {
        *self.current_t.lock() = t;
    }

    fn execute(&self, order: &Order) -> Result<ExecutionHandshake, ExecutionError> {
        let price = self.price_for(order)?;
        let fee = order.amount * price * self.fee_rate;
        let pair = order.pair.clone().unwrap_or_else(|| SmolStr::new("unknown"));

        let position_deltas = if order.operation == Operation::FlashAtomic {
            self.apply_flash_atomic(order)?
        } else {
            let key = PositionKey::new(self.venue.clone(), position_type_for(order), pair.clone());
            let signed_amount = signed_amount_for(order);

            let mut position_deltas = HashMap::new();
            let mut positions = self.positions.lock();
            position::apply_delta(&mut positions, &key, signed_amount);
            position_deltas.insert(SmolStr::new(key.to_string()), signed_amount);

            // Single-asset moves between a wallet balance and a venue receipt/debt token are
            // booked as two legs so `ExposureMonitor`'s per-symbol wallet sum doesn't double-count
            // the same economic unit under both position types.
            if let Some(wallet_delta) = wallet_offset_for(order.operation, signed_amount) {
                let wallet_key = PositionKey::new(self.venue.clone(), position::PositionType::BaseToken, pair.clone());
                position::apply_delta(&mut positions, &wallet_key, wallet_delta);
                position_deltas.insert(SmolStr::new(wallet_key.to_string()), wallet_delta);
            }
            position_deltas
        };

        Ok(ExecutionHandshake {
            order: order.clone(),
            status: ExecutionStatus::Executed,
            executed_amount: order.amount,
            executed_price: Some(price),
            position_deltas,
            fee_amount: fee,
            fee_currency: pair,
            trade_id: None,
            error_code: None,
            error_message: None,
        })
    }

    fn query_positions(
        &self,
        keys: &[PositionKey],
    ) -> Result<HashMap<PositionKey, Decimal>, ExecutionError> {
        let positions = self.positions.lock();
        Ok(keys
            .iter()
            .map(|key| (key.clone(), positions.get(key).copied().unwrap_or_default()))
            .collect())
    }

    fn query_market(
        &self,
        kinds: &[String],
    ) -> Result<HashMap<String, MarketDataValue>, ExecutionError> {
        let t = *self.current_t.lock();
        let snapshot = self
            .data
            .get(t)
            .map_err(|e| ExecutionError::MarketQueryFailed {
                venue: self.venue.clone(),
                message: e.to_string(),
            })?;

        Ok(kinds
            .iter()
            .filter_map(|kind| {
                snapshot
                    .get(kind)
                    .map(|obs| (kind.clone(), obs.value.clone()))
            })
            .collect())
    }
}

fn position_type_for(order: &Order) -> basis_instrument::position::PositionType {
    use basis_instrument::{order::Operation, position::PositionType};
    match order.operation {
        Operation::PerpTrade => PositionType::Perp,
        Operation::Supply | Operation::Withdraw => PositionType::AToken,
        Operation::Borrow | Operation::Repay => PositionType::DebtToken,
        _ => PositionType::Spot,
    }
}

/// Supply/Borrow/Stake increase the receipt or debt leg; Withdraw/Repay/Unstake decrease it.
/// `Side` only governs direction for two-sided trades (`SpotTrade`/`PerpTrade`).
fn signed_amount_for(order: &Order) -> Decimal {
    use basis_instrument::order::Operation;
    match order.operation {
        Operation::Withdraw | Operation::Repay | Operation::Unstake => -order.amount,
        Operation::Supply | Operation::Borrow | Operation::Stake => order.amount,
        _ => match order.side {
            Some(basis_instrument::order::Side::Sell) => -order.amount,
            _ => order.amount,
        },
    }
}

/// The wallet-balance (`BaseToken`) leg a single-asset venue move implies, opposite in sign to
/// `signed_amount`: supplying/staking/borrowing moves funds out of (or into) the wallet balance
/// for the same symbol. `None` for two-sided trades, which already settle against a counterparty
/// rather than a same-symbol wallet balance.
fn wallet_offset_for(operation: basis_instrument::order::Operation, signed_amount: Decimal) -> Option<Decimal> {
    use basis_instrument::order::Operation;
    match operation {
        Operation::Supply | Operation::Withdraw | Operation::Stake | Operation::Unstake => {
            Some(-signed_amount)
        }
        Operation::Borrow | Operation::Repay => Some(signed_amount),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis_instrument::order::{OrderType, Side};
    use rust_decimal_macros::dec;

    struct FixedProvider(Decimal);

    impl DataProvider for FixedProvider {
        fn get(&self, t: basis_instrument::Timestamp) -> Result<MarketSnapshot, basis_data::error::DataError> {
            let mut snapshot = MarketSnapshot::new(t);
            snapshot.data.insert(
                SmolStr::new("spot_price.BTCUSDT"),
                basis_data::Observation {
                    value: MarketDataValue::SpotPrice(self.0),
                    observed_at: t,
                },
            );
            Ok(snapshot)
        }

        fn validate_requirements(&self, _required_kinds: &[String]) -> Result<(), basis_data::error::DataError> {
            Ok(())
        }
    }

    #[test]
    fn execute_fills_at_market_price_and_tracks_position() {
        let venue = SimulatedVenue::new(
            VenueId::from("binance"),
            Arc::new(FixedProvider(dec!(50000))),
            dec!(0.001),
            Timestamp::from_timestamp(0, 0).unwrap(),
        );
        let mut order = Order::new(VenueId::from("binance"), basis_instrument::order::Operation::SpotTrade, dec!(1), OrderType::Market);
        order.pair = Some(SmolStr::new("BTCUSDT"));
        order.side = Some(Side::Buy);

        let handshake = venue.execute(&order).unwrap();
        assert_eq!(handshake.executed_price, Some(dec!(50000)));
        assert_eq!(handshake.status, ExecutionStatus::Executed);

        let key = PositionKey::new(VenueId::from("binance"), basis_instrument::position::PositionType::Spot, "BTCUSDT");
        let queried = venue.query_positions(&[key.clone()]).unwrap();
        assert_eq!(queried.get(&key), Some(&dec!(1)));
    }

    #[test]
    fn supply_debits_wallet_balance_and_credits_the_receipt_token() {
        let venue = SimulatedVenue::new(
            VenueId::from("aave"),
            Arc::new(FixedProvider(dec!(1))),
            Decimal::ZERO,
            Timestamp::from_timestamp(0, 0).unwrap(),
        );
        let mut order = Order::new(VenueId::from("aave"), basis_instrument::order::Operation::Supply, dec!(100), OrderType::Market);
        order.pair = Some(SmolStr::new("USDT"));

        let handshake = venue.execute(&order).unwrap();
        assert_eq!(handshake.position_deltas.len(), 2);

        let a_token_key = PositionKey::new(VenueId::from("aave"), basis_instrument::position::PositionType::AToken, "USDT");
        let base_token_key = PositionKey::new(VenueId::from("aave"), basis_instrument::position::PositionType::BaseToken, "USDT");
        let queried = venue
            .query_positions(&[a_token_key.clone(), base_token_key.clone()])
            .unwrap();
        assert_eq!(queried.get(&a_token_key), Some(&dec!(100)));
        assert_eq!(queried.get(&base_token_key), Some(&dec!(-100)));
    }

    #[test]
    fn withdraw_reverses_a_prior_supply() {
        let venue = SimulatedVenue::new(
            VenueId::from("aave"),
            Arc::new(FixedProvider(dec!(1))),
            Decimal::ZERO,
            Timestamp::from_timestamp(0, 0).unwrap(),
        );
        let mut supply = Order::new(VenueId::from("aave"), basis_instrument::order::Operation::Supply, dec!(100), OrderType::Market);
        supply.pair = Some(SmolStr::new("USDT"));
        venue.execute(&supply).unwrap();

        let mut withdraw = Order::new(VenueId::from("aave"), basis_instrument::order::Operation::Withdraw, dec!(100), OrderType::Market);
        withdraw.pair = Some(SmolStr::new("USDT"));
        venue.execute(&withdraw).unwrap();

        let a_token_key = PositionKey::new(VenueId::from("aave"), basis_instrument::position::PositionType::AToken, "USDT");
        let base_token_key = PositionKey::new(VenueId::from("aave"), basis_instrument::position::PositionType::BaseToken, "USDT");
        let queried = venue
            .query_positions(&[a_token_key.clone(), base_token_key.clone()])
            .unwrap();
        assert_eq!(queried.get(&a_token_key), Some(&dec!(0)));
        assert_eq!(queried.get(&base_token_key), Some(&dec!(0)));
    }

    /// S5 (spec.md §8): a 6-step flash-loan bundle nets to a supply leg and a debt leg only — the
    /// intermediate borrow/repay/swap legs used to fund the atomic transaction leave no trace.
    #[test]
    fn flash_atomic_applies_only_the_net_supply_and_debt_legs() {
        use basis_instrument::order::{AtomicStep, Operation, Side};

        let venue = SimulatedVenue::new(
            VenueId::from("aave"),
            Arc::new(FixedProvider(dec!(1))),
            Decimal::ZERO,
            Timestamp::from_timestamp(0, 0).unwrap(),
        );

        let supply_amount = dec!(90);
        let debt_amount = dec!(80);
        let principal = supply_amount - debt_amount;
        let steps = vec![
            AtomicStep {
                operation: Operation::Borrow,
                pair: Some(SmolStr::new("weETH")),
                side: None,
                amount: principal,
            },
            AtomicStep {
                operation: Operation::SpotTrade,
                pair: Some(SmolStr::new("weETH")),
                side: Some(Side::Buy),
                amount: principal,
            },
            AtomicStep {
                operation: Operation::Supply,
                pair: Some(SmolStr::new("weETH")),
                side: None,
                amount: supply_amount,
            },
            AtomicStep {
                operation: Operation::Borrow,
                pair: Some(SmolStr::new("weETH")),
                side: None,
                amount: debt_amount,
            },
            AtomicStep {
                operation: Operation::SpotTrade,
                pair: Some(SmolStr::new("weETH")),
                side: Some(Side::Sell),
                amount: debt_amount,
            },
            AtomicStep {
                operation: Operation::Repay,
                pair: Some(SmolStr::new("weETH")),
                side: None,
                amount: principal,
            },
        ];

        let mut order = Order::new(VenueId::from("aave"), Operation::FlashAtomic, supply_amount, OrderType::Market);
        order.pair = Some(SmolStr::new("weETH"));
        order.metadata = Some(serde_json::json!({ "atomic_steps": steps }));

        let handshake = venue.execute(&order).unwrap();
        assert_eq!(handshake.status, ExecutionStatus::Executed);

        let a_token_key = PositionKey::new(VenueId::from("aave"), basis_instrument::position::PositionType::AToken, "weETH");
        let debt_token_key = PositionKey::new(VenueId::from("aave"), basis_instrument::position::PositionType::DebtToken, "weETH");
        let spot_key = PositionKey::new(VenueId::from("aave"), basis_instrument::position::PositionType::Spot, "weETH");
        let queried = venue
            .query_positions(&[a_token_key.clone(), debt_token_key.clone(), spot_key.clone()])
            .unwrap();
        assert_eq!(queried.get(&a_token_key), Some(&supply_amount));
        assert_eq!(queried.get(&debt_token_key), Some(&debt_amount));
        assert_eq!(queried.get(&spot_key), Some(&dec!(0)));
    }
}
