use crate::{
    context::{StrategyConfig, StrategyContext},
    dust::{find_dust, sell_dust_orders},
    manager::StrategyManager,
};
use basis_instrument::{
    order::{Operation, Order, OrderType, Side},
    position::PositionType,
};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use tracing::warn;

/// Market-neutral leveraged staking: equity splits by `stake_allocation_eth` into a staked
/// portion (levered at `L = target_ltv / (1 - target_ltv)`) and a CEX-margin remainder. Short
/// perp notional matches the staked ETH exposure, distributed across hedge venues (spec.md §4.8).
#[derive(Debug)]
pub struct MarketNeutralManager {
    pub eth_symbol: SmolStr,
}

impl MarketNeutralManager {
    fn leverage(config: &StrategyConfig) -> Option<Decimal> {
        let denominator = Decimal::ONE - config.target_ltv;
        if denominator.is_zero() || denominator.is_sign_negative() {
            None
        } else {
            Some(config.target_ltv / denominator)
        }
    }
}

impl StrategyManager for MarketNeutralManager {
    fn rebalance(&self, ctx: &StrategyContext, config: &StrategyConfig) -> Vec<Order> {
        if let Err(reason) = config.validate() {
            warn!(reason, "StrategyInfeasible: hedge allocation misconfigured");
            return Vec::new();
        }

        let Some(leverage) = Self::leverage(config) else {
            warn!(
                target_ltv = %config.target_ltv,
                "StrategyInfeasible: target_ltv implies non-positive leverage"
            );
            return Vec::new();
        };

        let dust = find_dust(&ctx.positions, config.dust_delta, &[self.eth_symbol.clone()]);
        let mut orders = sell_dust_orders(&dust);

        let staked_equity = ctx.equity * config.stake_allocation_eth;
        let margin_equity = ctx.equity - staked_equity;
        let target_staked_eth = staked_equity * leverage;

        let supplied: Decimal = ctx
            .positions
            .iter()
            .filter(|(key, _)| {
                key.venue == config.onchain_venue
                    && key.symbol == self.eth_symbol
                    && key.position_type == PositionType::Spot
            })
            .map(|(_, amount)| *amount)
            .sum();

        let deviation = if target_staked_eth.is_zero() {
            Decimal::ZERO
        } else {
            (supplied - target_staked_eth) / target_staked_eth
        };

        if !ctx.should_rebalance(deviation, config) {
            return orders;
        }

        for (venue, allocation) in config.hedge_venues.iter().zip(config.hedge_allocation.iter()) {
            let target_notional = target_staked_eth * allocation;
            let held_notional: Decimal = ctx
                .positions
                .iter()
                .filter(|(key, _)| &key.venue == venue)
                .map(|(_, amount)| *amount)
                .sum();
            let delta = (-target_notional) - held_notional;
            if delta.is_zero() {
                continue;
            }
            let mut order = Order::new(venue.clone(), Operation::PerpTrade, delta.abs(), OrderType::Market);
            order.pair = Some(self.eth_symbol.clone());
            order.side = Some(if delta.is_sign_positive() { Side::Buy } else { Side::Sell });
            orders.push(order);
        }

        let stake_delta = target_staked_eth - supplied;
        if !stake_delta.is_zero() {
            let operation = if stake_delta.is_sign_positive() {
                Operation::Stake
            } else {
                Operation::Unstake
            };
            let mut order = Order::new(config.onchain_venue.clone(), operation, stake_delta.abs(), OrderType::Market);
            order.pair = Some(self.eth_symbol.clone());
            orders.push(order);
        }

        let _ = margin_equity;
        orders
    }
}
