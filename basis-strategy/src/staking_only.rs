use crate::{
    context::{StrategyConfig, StrategyContext},
    dust::{find_dust, sell_dust_orders},
    manager::StrategyManager,
};
use basis_instrument::{
    order::{Operation, Order, OrderType},
    position::PositionType,
};
use rust_decimal::Decimal;
use smol_str::SmolStr;

/// Staking-only: target staked = equity. No hedging (spec.md §4.8).
#[derive(Debug)]
pub struct StakingOnlyManager {
    pub eth_symbol: SmolStr,
}

impl StrategyManager for StakingOnlyManager {
    fn rebalance(&self, ctx: &StrategyContext, config: &StrategyConfig) -> Vec<Order> {
        let dust = find_dust(&ctx.positions, config.dust_delta, &[self.eth_symbol.clone()]);
        let mut orders = sell_dust_orders(&dust);

        let staked: Decimal = ctx
            .positions
            .iter()
            .filter(|(key, _)| {
                key.venue == config.onchain_venue
                    && key.symbol == self.eth_symbol
                    && key.position_type == PositionType::Spot
            })
            .map(|(_, amount)| *amount)
            .sum();

        let target = ctx.equity;
        let deviation = if target.is_zero() {
            Decimal::ZERO
        } else {
            (staked - target) / target
        };

        if !ctx.should_rebalance(deviation, config) {
            return orders;
        }

        let delta = target - staked;
        if delta.is_zero() {
            return orders;
        }

        let operation = if delta.is_sign_positive() {
            Operation::Stake
        } else {
            Operation::Unstake
        };
        let mut order = Order::new(config.onchain_venue.clone(), operation, delta.abs(), OrderType::Market);
        order.pair = Some(self.eth_symbol.clone());
        orders.push(order);
        orders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StrategyContext;
    use basis_instrument::{
        exposure::Exposure, position::PositionKey, risk::RiskAssessment, venue::VenueId,
    };
    use rust_decimal_macros::dec;

    fn config() -> StrategyConfig {
        StrategyConfig {
            target_ltv: Decimal::ZERO,
            stake_allocation_eth: Decimal::ZERO,
            hedge_venues: Vec::new(),
            hedge_allocation: Vec::new(),
            position_deviation_threshold: dec!(0.02),
            dust_delta: dec!(1),
            use_flash_loan: false,
            max_leverage_iterations: 1,
            reserve_ratio: dec!(0.1),
            onchain_venue: VenueId::from("lido"),
        }
    }

    #[test]
    fn unstaked_wallet_eth_does_not_count_as_already_staked() {
        let manager = StakingOnlyManager {
            eth_symbol: SmolStr::new("ETH"),
        };
        let mut positions = basis_instrument::position::PositionMap::new();
        positions.insert(
            PositionKey::new(VenueId::from("lido"), PositionType::BaseToken, "ETH"),
            dec!(10),
        );

        let ctx = StrategyContext {
            exposure: Exposure::empty(),
            risk: RiskAssessment::empty(),
            positions,
            equity: dec!(10),
            pending_deposit_withdrawal: None,
            risk_override_active: false,
        };

        let orders = manager.rebalance(&ctx, &config());
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].operation, Operation::Stake);
        assert_eq!(orders[0].amount, dec!(10));
    }
}
