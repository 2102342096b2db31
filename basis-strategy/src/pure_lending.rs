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

/// Target = full equity supplied to the lending venue. No rebalancing on price moves alone: the
/// only triggers are a deposit/withdrawal event or a drift large enough to cross
/// `position_deviation_threshold` against the currently supplied balance (eg/ after yield
/// accrual changes the aToken balance relative to equity).
#[derive(Debug)]
pub struct PureLendingManager {
    pub share_class_symbol: SmolStr,
}

impl StrategyManager for PureLendingManager {
    fn rebalance(&self, ctx: &StrategyContext, config: &StrategyConfig) -> Vec<Order> {
        let dust = find_dust(
            &ctx.positions,
            config.dust_delta,
            &[self.share_class_symbol.clone()],
        );
        let mut orders = sell_dust_orders(&dust);

        let supplied: Decimal = ctx
            .positions
            .iter()
            .filter(|(key, _)| key.venue == config.onchain_venue && key.position_type == PositionType::AToken)
            .map(|(_, amount)| *amount)
            .sum();

        let target = ctx.equity;
        let deviation = if target.is_zero() {
            Decimal::ZERO
        } else {
            (supplied - target) / target
        };

        if !ctx.should_rebalance(deviation, config) {
            return orders;
        }

        let delta = target - supplied;
        if delta.is_zero() {
            return orders;
        }

        if target.is_sign_negative() {
            warn!("StrategyInfeasible: negative target equity for pure lending");
            return orders;
        }

        let operation = if delta.is_sign_positive() {
            Operation::Supply
        } else {
            Operation::Withdraw
        };
        let mut order = Order::new(
            config.onchain_venue.clone(),
            operation,
            delta.abs(),
            OrderType::Market,
        );
        order.pair = Some(self.share_class_symbol.clone());
        order.side = Some(if delta.is_sign_positive() {
            Side::Buy
        } else {
            Side::Sell
        });
        orders.push(order);
        orders
    }
}
