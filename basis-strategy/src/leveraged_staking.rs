use crate::{
    context::{StrategyConfig, StrategyContext},
    dust::{find_dust, sell_dust_orders},
    manager::StrategyManager,
};
use basis_instrument::order::{AtomicStep, Operation, Order, OrderType, Side};
use rust_decimal::Decimal;
use serde_json::json;
use smol_str::SmolStr;
use tracing::warn;

/// Leveraged (directional) staking: target supply = equity × L, target debt = equity × (L − 1).
/// Entry is a single 6-step atomic flash-loan bundle when `use_flash_loan` is set, otherwise a
/// sequential supply/borrow/stake loop up to `max_leverage_iterations` (spec.md §4.8).
#[derive(Debug)]
pub struct LeveragedStakingManager {
    pub eth_symbol: SmolStr,
}

impl LeveragedStakingManager {
    fn leverage(config: &StrategyConfig) -> Option<Decimal> {
        let denominator = Decimal::ONE - config.target_ltv;
        if denominator.is_zero() || denominator.is_sign_negative() {
            None
        } else {
            Some(config.target_ltv / denominator)
        }
    }

    /// Builds the 6-step bundle: flash-borrow, supply, borrow, repay flash loan, in one atomic
    /// order. The individual steps are carried in `metadata.atomic_steps`; the venue is
    /// responsible for all-or-nothing execution.
    fn flash_loan_order(
        &self,
        config: &StrategyConfig,
        supply_amount: Decimal,
        debt_amount: Decimal,
    ) -> Order {
        let steps = vec![
            AtomicStep {
                operation: Operation::Borrow,
                pair: Some(self.eth_symbol.clone()),
                side: None,
                amount: supply_amount - debt_amount,
            },
            AtomicStep {
                operation: Operation::SpotTrade,
                pair: Some(self.eth_symbol.clone()),
                side: Some(Side::Buy),
                amount: supply_amount - debt_amount,
            },
            AtomicStep {
                operation: Operation::Supply,
                pair: Some(self.eth_symbol.clone()),
                side: None,
                amount: supply_amount,
            },
            AtomicStep {
                operation: Operation::Borrow,
                pair: Some(self.eth_symbol.clone()),
                side: None,
                amount: debt_amount,
            },
            AtomicStep {
                operation: Operation::SpotTrade,
                pair: Some(self.eth_symbol.clone()),
                side: Some(Side::Sell),
                amount: debt_amount,
            },
            AtomicStep {
                operation: Operation::Repay,
                pair: Some(self.eth_symbol.clone()),
                side: None,
                amount: supply_amount - debt_amount,
            },
        ];

        let mut order = Order::new(config.onchain_venue.clone(), Operation::FlashAtomic, supply_amount, OrderType::Market);
        order.pair = Some(self.eth_symbol.clone());
        order.metadata = Some(json!({ "atomic_steps": steps }));
        order
    }

    fn sequential_orders(
        &self,
        config: &StrategyConfig,
        supply_amount: Decimal,
        debt_amount: Decimal,
    ) -> Vec<Order> {
        let iterations = config.max_leverage_iterations.max(1);
        let per_iteration_supply = supply_amount / Decimal::from(iterations);
        let per_iteration_debt = debt_amount / Decimal::from(iterations);

        (0..iterations)
            .flat_map(|_| {
                let mut supply = Order::new(
                    config.onchain_venue.clone(),
                    Operation::Supply,
                    per_iteration_supply,
                    OrderType::Market,
                );
                supply.pair = Some(self.eth_symbol.clone());

                let mut borrow = Order::new(
                    config.onchain_venue.clone(),
                    Operation::Borrow,
                    per_iteration_debt,
                    OrderType::Market,
                );
                borrow.pair = Some(self.eth_symbol.clone());

                vec![supply, borrow]
            })
            .collect()
    }
}

impl StrategyManager for LeveragedStakingManager {
    fn rebalance(&self, ctx: &StrategyContext, config: &StrategyConfig) -> Vec<Order> {
        let Some(leverage) = Self::leverage(config) else {
            warn!(
                target_ltv = %config.target_ltv,
                "StrategyInfeasible: target_ltv implies non-positive leverage"
            );
            return Vec::new();
        };

        let dust = find_dust(&ctx.positions, config.dust_delta, &[self.eth_symbol.clone()]);
        let mut orders = sell_dust_orders(&dust);

        let target_supply = ctx.equity * leverage;
        let target_debt = ctx.equity * (leverage - Decimal::ONE);

        if target_supply.is_sign_negative() || target_debt.is_sign_negative() {
            warn!("StrategyInfeasible: insufficient equity for leveraged staking target");
            return orders;
        }

        let current_supply: Decimal = ctx
            .positions
            .iter()
            .filter(|(key, _)| {
                key.venue == config.onchain_venue
                    && key.position_type == basis_instrument::position::PositionType::AToken
            })
            .map(|(_, amount)| *amount)
            .sum();
        let current_debt: Decimal = ctx
            .positions
            .iter()
            .filter(|(key, _)| {
                key.venue == config.onchain_venue
                    && key.position_type == basis_instrument::position::PositionType::DebtToken
            })
            .map(|(_, amount)| *amount)
            .sum();

        let deviation = if target_supply.is_zero() {
            Decimal::ZERO
        } else {
            (current_supply - target_supply) / target_supply
        };

        if !ctx.should_rebalance(deviation, config) {
            return orders;
        }

        let supply_delta = target_supply - current_supply;
        let debt_delta = (target_debt - current_debt).max(Decimal::ZERO);

        if supply_delta.is_zero() {
            return orders;
        }

        if config.use_flash_loan {
            orders.push(self.flash_loan_order(config, supply_delta, debt_delta));
        } else {
            orders.extend(self.sequential_orders(config, supply_delta, debt_delta));
        }

        orders
    }
}
