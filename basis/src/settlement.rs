use basis_instrument::{
    delta::{Delta, DeltaSource},
    pnl::attribution,
    position::{PositionKey, PositionMap, PositionType},
    venue::VenueId,
    Timestamp,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::collections::HashMap;

const SECONDS_PER_YEAR: i64 = 365 * 24 * 3600;

/// What [`SettlementCalculator::compute`] produces for one tick: the position deltas to apply via
/// `PositionMonitor::apply_settlements`, and the attribution components those same deltas are
/// worth (spec.md §4.7 "each component is derived from the scheduled settlement deltas ... accrued
/// since the previous `T`"). Every amount here already has the right sign to add directly into
/// equity, so `Engine::step` needs no further scaling before handing `attribution` to
/// `PnLCalculator::update`.
#[derive(Debug, Default)]
pub struct SettlementOutcome {
    pub deltas: Vec<Delta>,
    pub attribution: HashMap<SmolStr, Decimal>,
}

impl SettlementOutcome {
    fn add(&mut self, component: &'static str, value: Decimal) {
        if value.is_zero() {
            return;
        }
        *self
            .attribution
            .entry(SmolStr::new(component))
            .or_insert(Decimal::ZERO) += value;
    }
}

#[derive(Debug, Default)]
struct State {
    previous_t: Option<Timestamp>,
}

/// Computes the scheduled settlement deltas due at a tick (spec.md §4.1 step 2, §4.2) — AAVE
/// supply/borrow interest accrual, staking rewards, and perp funding — each scaled by the period
/// elapsed since the previous `T` and read off the `protocol_index.*`/`funding_rate.*` market data
/// keys `basis_data::backtest::parse_typed_value` recognises. Which components run is gated by the
/// same mode flags `ModeConfig` already carries (`lending_enabled`, `borrowing_enabled`,
/// `staking_enabled`, `basis_trade_enabled`); an asset or venue the active mode never enables is
/// simply never queried.
///
/// One calculator is scoped to a single request, exactly like `PositionMonitor` and
/// `PnLCalculator` — `previous_t` resets only by constructing a new instance.
#[derive(Debug)]
pub struct SettlementCalculator {
    asset: SmolStr,
    lst_symbol: Option<SmolStr>,
    onchain_venue: VenueId,
    hedge_venues: Vec<VenueId>,
    lending_enabled: bool,
    staking_enabled: bool,
    borrowing_enabled: bool,
    basis_trade_enabled: bool,
    state: Mutex<State>,
}

impl SettlementCalculator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        asset: SmolStr,
        lst_symbol: Option<SmolStr>,
        onchain_venue: VenueId,
        hedge_venues: Vec<VenueId>,
        lending_enabled: bool,
        staking_enabled: bool,
        borrowing_enabled: bool,
        basis_trade_enabled: bool,
    ) -> Self {
        Self {
            asset,
            lst_symbol,
            onchain_venue,
            hedge_venues,
            lending_enabled,
            staking_enabled,
            borrowing_enabled,
            basis_trade_enabled,
            state: Mutex::new(State::default()),
        }
    }

    /// Compute this tick's settlement deltas and attribution against `positions` (the simulated
    /// map just after execution deltas have landed, per the ordering invariant documented on
    /// [`crate::position_monitor::PositionMonitor::apply_settlements`]) and `market` (the tick's
    /// decimal-valued market data). The first call on a fresh calculator accrues nothing — `dt` is
    /// undefined without a previous `T` — mirroring `PnLCalculator`'s own first-period convention.
    pub fn compute(
        &self,
        t: Timestamp,
        positions: &PositionMap,
        market: &HashMap<SmolStr, Decimal>,
    ) -> SettlementOutcome {
        let mut outcome = SettlementOutcome::default();

        let dt_years = {
            let mut state = self.state.lock();
            let dt = match state.previous_t {
                Some(previous) => {
                    Decimal::from((t - previous).num_seconds()) / Decimal::from(SECONDS_PER_YEAR)
                }
                None => Decimal::ZERO,
            };
            state.previous_t = Some(t);
            dt
        };

        if dt_years.is_zero() {
            return outcome;
        }

        if self.lending_enabled {
            self.accrue_supply(positions, market, dt_years, &mut outcome);
        }
        if self.borrowing_enabled {
            self.accrue_borrow(positions, market, dt_years, &mut outcome);
        }
        if self.staking_enabled {
            self.accrue_staking_rewards(positions, market, dt_years, &mut outcome);
        }
        if self.basis_trade_enabled {
            self.accrue_funding(positions, market, dt_years, &mut outcome);
        }

        outcome
    }

    /// AAVE-style supply interest: `aToken` balance compounds in place at the venue's
    /// `protocol_index.<venue>.supply.<asset>` annualised rate (spec.md §8 S1).
    fn accrue_supply(
        &self,
        positions: &PositionMap,
        market: &HashMap<SmolStr, Decimal>,
        dt_years: Decimal,
        outcome: &mut SettlementOutcome,
    ) {
        let key = PositionKey::new(self.onchain_venue.clone(), PositionType::AToken, self.asset.clone());
        let balance = positions.get(&key).copied().unwrap_or_default();
        if balance.is_zero() {
            return;
        }
        let rate_kind = SmolStr::new(format!("protocol_index.{}.supply.{}", self.onchain_venue, self.asset));
        let Some(rate) = market.get(&rate_kind).copied() else {
            return;
        };
        let accrued = balance * rate * dt_years;
        if accrued.is_zero() {
            return;
        }
        outcome.deltas.push(Delta::new(key, accrued, DeltaSource::Funding));
        outcome.add(attribution::SUPPLY_YIELD, accrued);
    }

    /// AAVE-style borrow interest: `debtToken` balance (tracked as a positive magnitude, per
    /// spec.md S5) grows at `protocol_index.<venue>.borrow.<asset>`; the attribution component is
    /// the negated accrual, since growing debt is a cost to equity.
    fn accrue_borrow(
        &self,
        positions: &PositionMap,
        market: &HashMap<SmolStr, Decimal>,
        dt_years: Decimal,
        outcome: &mut SettlementOutcome,
    ) {
        let key = PositionKey::new(self.onchain_venue.clone(), PositionType::DebtToken, self.asset.clone());
        let balance = positions.get(&key).copied().unwrap_or_default();
        if balance.is_zero() {
            return;
        }
        let rate_kind = SmolStr::new(format!("protocol_index.{}.borrow.{}", self.onchain_venue, self.asset));
        let Some(rate) = market.get(&rate_kind).copied() else {
            return;
        };
        let accrued = balance * rate * dt_years;
        if accrued.is_zero() {
            return;
        }
        outcome.deltas.push(Delta::new(key, accrued, DeltaSource::Funding));
        outcome.add(attribution::BORROW_COST, -accrued);
    }

    /// Rebasing staking rewards: the held LST balance grows in place at
    /// `protocol_index.<venue>.reward.<symbol>`. The price-appreciation variant
    /// (`staking_yield_oracle`) needs no settlement delta — it shows up automatically once the
    /// LST/ETH oracle moves, via `ExposureMonitor`'s mark-to-market — so it is not computed here.
    fn accrue_staking_rewards(
        &self,
        positions: &PositionMap,
        market: &HashMap<SmolStr, Decimal>,
        dt_years: Decimal,
        outcome: &mut SettlementOutcome,
    ) {
        let Some(lst_symbol) = self.lst_symbol.clone() else {
            return;
        };
        let key = PositionKey::new(self.onchain_venue.clone(), PositionType::Spot, lst_symbol.clone());
        let balance = positions.get(&key).copied().unwrap_or_default();
        if balance.is_zero() {
            return;
        }
        let rate_kind = SmolStr::new(format!("protocol_index.{}.reward.{}", self.onchain_venue, lst_symbol));
        let Some(rate) = market.get(&rate_kind).copied() else {
            return;
        };
        let accrued = balance * rate * dt_years;
        if accrued.is_zero() {
            return;
        }
        outcome.deltas.push(Delta::new(key, accrued, DeltaSource::Reward));
        outcome.add(attribution::STAKING_YIELD_REWARDS, accrued);
    }

    /// Perp funding settles in cash against the venue's wallet balance for `asset`, not against
    /// the perp notional itself — a funding payment never changes how much hedge is actually held.
    /// Sign convention: a short hedge (`notional < 0`) collects funding when `rate > 0`, mirroring
    /// real perpetual futures funding paid by longs to shorts.
    fn accrue_funding(
        &self,
        positions: &PositionMap,
        market: &HashMap<SmolStr, Decimal>,
        dt_years: Decimal,
        outcome: &mut SettlementOutcome,
    ) {
        for venue in &self.hedge_venues {
            let perp_key = PositionKey::new(venue.clone(), PositionType::Perp, self.asset.clone());
            let notional = positions.get(&perp_key).copied().unwrap_or_default();
            if notional.is_zero() {
                continue;
            }
            let rate_kind = SmolStr::new(format!("funding_rate.{}.{}", venue, self.asset));
            let Some(rate) = market.get(&rate_kind).copied() else {
                continue;
            };
            let payment = -notional * rate * dt_years;
            if payment.is_zero() {
                continue;
            }
            let cash_key = PositionKey::new(venue.clone(), PositionType::BaseToken, self.asset.clone());
            outcome.deltas.push(Delta::new(cash_key, payment, DeltaSource::Funding));
            outcome.add(attribution::FUNDING_PNL, payment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn calculator() -> SettlementCalculator {
        SettlementCalculator::new(
            SmolStr::new("USDT"),
            None,
            VenueId::from("aave"),
            Vec::new(),
            true,
            false,
            false,
            false,
        )
    }

    fn t(raw: &str) -> Timestamp {
        raw.parse().unwrap()
    }

    /// First call has no `dt` to accrue over — matches `PnLCalculator::update`'s own
    /// first-period-is-zero convention.
    #[test]
    fn first_tick_accrues_nothing() {
        let calc = calculator();
        let mut positions = PositionMap::new();
        positions.insert(
            PositionKey::new(VenueId::from("aave"), PositionType::AToken, "USDT"),
            dec!(100000),
        );
        let mut market = HashMap::new();
        market.insert(SmolStr::new("protocol_index.aave.supply.USDT"), dec!(0.05));

        let outcome = calc.compute(t("2024-01-01T00:00:00Z"), &positions, &market);
        assert!(outcome.deltas.is_empty());
        assert!(outcome.attribution.is_empty());
    }

    /// S1 (spec.md §8): a flat 5%/yr supply rate over one hour accrues `balance * 0.05 * dt`,
    /// booked as a `Funding`-sourced delta on the `aToken` position and as `supply_yield`.
    #[test]
    fn supply_yield_accrues_over_an_hour_at_the_configured_rate() {
        let calc = calculator();
        let key = PositionKey::new(VenueId::from("aave"), PositionType::AToken, "USDT");
        let mut positions = PositionMap::new();
        positions.insert(key.clone(), dec!(100000));
        let mut market = HashMap::new();
        market.insert(SmolStr::new("protocol_index.aave.supply.USDT"), dec!(0.05));

        calc.compute(t("2024-01-01T00:00:00Z"), &positions, &market);
        let outcome = calc.compute(t("2024-01-01T01:00:00Z"), &positions, &market);

        let dt_years = Decimal::from(3600) / Decimal::from(SECONDS_PER_YEAR);
        let expected = dec!(100000) * dec!(0.05) * dt_years;
        assert_eq!(outcome.deltas.len(), 1);
        assert_eq!(outcome.deltas[0].position_key, key);
        assert_eq!(outcome.deltas[0].delta_amount, expected);
        assert_eq!(
            outcome.attribution.get(&SmolStr::new(attribution::SUPPLY_YIELD)),
            Some(&expected)
        );
    }

    #[test]
    fn borrow_cost_is_attributed_as_negative() {
        let calc = SettlementCalculator::new(
            SmolStr::new("WETH"),
            None,
            VenueId::from("aave"),
            Vec::new(),
            false,
            false,
            true,
            false,
        );
        let key = PositionKey::new(VenueId::from("aave"), PositionType::DebtToken, "WETH");
        let mut positions = PositionMap::new();
        positions.insert(key.clone(), dec!(80));
        let mut market = HashMap::new();
        market.insert(SmolStr::new("protocol_index.aave.borrow.WETH"), dec!(0.04));

        calc.compute(t("2024-01-01T00:00:00Z"), &positions, &market);
        let outcome = calc.compute(t("2024-01-01T01:00:00Z"), &positions, &market);

        let dt_years = Decimal::from(3600) / Decimal::from(SECONDS_PER_YEAR);
        let accrued = dec!(80) * dec!(0.04) * dt_years;
        assert_eq!(outcome.deltas[0].delta_amount, accrued);
        assert_eq!(
            outcome.attribution.get(&SmolStr::new(attribution::BORROW_COST)),
            Some(&(-accrued))
        );
    }

    #[test]
    fn missing_rate_data_skips_the_component_without_erroring() {
        let calc = calculator();
        let mut positions = PositionMap::new();
        positions.insert(
            PositionKey::new(VenueId::from("aave"), PositionType::AToken, "USDT"),
            dec!(100000),
        );

        calc.compute(t("2024-01-01T00:00:00Z"), &positions, &HashMap::new());
        let outcome = calc.compute(t("2024-01-01T01:00:00Z"), &positions, &HashMap::new());
        assert!(outcome.deltas.is_empty());
        assert!(outcome.attribution.is_empty());
    }

    /// A short perp hedge collects funding when the rate is positive; the cash lands on the
    /// venue's wallet balance, not the perp notional itself.
    #[test]
    fn short_hedge_collects_positive_funding_as_cash() {
        let calc = SettlementCalculator::new(
            SmolStr::new("ETH"),
            None,
            VenueId::from("aave"),
            vec![VenueId::from("binance")],
            false,
            false,
            false,
            true,
        );
        let perp_key = PositionKey::new(VenueId::from("binance"), PositionType::Perp, "ETH");
        let mut positions = PositionMap::new();
        positions.insert(perp_key, dec!(-10));
        let mut market = HashMap::new();
        market.insert(SmolStr::new("funding_rate.binance.ETH"), dec!(0.01));

        calc.compute(t("2024-01-01T00:00:00Z"), &positions, &market);
        let outcome = calc.compute(t("2024-01-01T01:00:00Z"), &positions, &market);

        let dt_years = Decimal::from(3600) / Decimal::from(SECONDS_PER_YEAR);
        let expected = dec!(10) * dec!(0.01) * dt_years;
        let cash_key = PositionKey::new(VenueId::from("binance"), PositionType::BaseToken, "ETH");
        assert_eq!(outcome.deltas[0].position_key, cash_key);
        assert_eq!(outcome.deltas[0].delta_amount, expected);
        assert_eq!(
            outcome.attribution.get(&SmolStr::new(attribution::FUNDING_PNL)),
            Some(&expected)
        );
    }
}
