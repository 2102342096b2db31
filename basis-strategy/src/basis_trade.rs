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

/// Basis trade: target long spot = equity (share class == asset), target short perp notional =
/// equity, distributed across `hedge_venues` by `hedge_allocation` (spec.md §4.8). All perp-short
/// orders across hedge venues for one entry are emitted as a single batch, before the spot leg.
#[derive(Debug)]
pub struct BasisTradeManager {
    pub asset_symbol: SmolStr,
}

impl StrategyManager for BasisTradeManager {
    fn rebalance(&self, ctx: &StrategyContext, config: &StrategyConfig) -> Vec<Order> {
        if let Err(reason) = config.validate() {
            warn!(reason, "StrategyInfeasible: hedge allocation misconfigured");
            return Vec::new();
        }

        let dust = find_dust(&ctx.positions, config.dust_delta, &[self.asset_symbol.clone()]);
        let mut orders = sell_dust_orders(&dust);

        let spot_held: Decimal = ctx
            .positions
            .iter()
            .filter(|(key, _)| {
                key.venue == config.onchain_venue
                    && key.symbol == self.asset_symbol
                    && key.position_type == PositionType::Spot
            })
            .map(|(_, amount)| *amount)
            .sum();

        let target_spot = ctx.equity;
        let spot_deviation = if target_spot.is_zero() {
            Decimal::ZERO
        } else {
            (spot_held - target_spot) / target_spot
        };

        if !ctx.should_rebalance(spot_deviation, config) {
            return orders;
        }

        // All perp-short orders across hedge venues at the same T, before the spot leg.
        for (venue, allocation) in config.hedge_venues.iter().zip(config.hedge_allocation.iter()) {
            let target_notional = target_spot * allocation;
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
            order.pair = Some(self.asset_symbol.clone());
            order.side = Some(if delta.is_sign_positive() { Side::Buy } else { Side::Sell });
            orders.push(order);
        }

        let spot_delta = target_spot - spot_held;
        if !spot_delta.is_zero() {
            let mut order = Order::new(
                config.onchain_venue.clone(),
                Operation::SpotTrade,
                spot_delta.abs(),
                OrderType::Market,
            );
            order.pair = Some(self.asset_symbol.clone());
            order.side = Some(if spot_delta.is_sign_positive() { Side::Buy } else { Side::Sell });
            orders.push(order);
        }

        orders
    }
}
