use crate::context::{StrategyConfig, StrategyContext};
use basis_instrument::order::Order;

/// Given current exposure, risk, config, and the mode's target model, emit orders implementing
/// one of the five canonical actions (spec.md §4.8).
///
/// `rebalance` never returns `Err`: an infeasible target is not an error, it is an empty order
/// list plus a `StrategyInfeasible` WARNING logged by the implementation.
pub trait StrategyManager: Send + Sync {
    fn rebalance(&self, ctx: &StrategyContext, config: &StrategyConfig) -> Vec<Order>;
}
