use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;

/// P&L reconciliation self-check: the balance-based track and the attribution track must agree
/// to within `tolerance`.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
pub struct Reconciliation {
    pub difference: Decimal,
    pub tolerance: Decimal,
    pub passed: bool,
}

/// Dual-track P&L for a single timestep, produced by `PnLCalculator::update`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PnLRecord {
    pub balance_based_pnl_period: Decimal,
    pub balance_based_pnl_cumulative: Decimal,
    pub attribution: HashMap<SmolStr, Decimal>,
    pub attribution_total_period: Decimal,
    pub attribution_total_cumulative: Decimal,
    pub reconciliation: Reconciliation,
}

impl PnLRecord {
    pub fn zero(tolerance: Decimal) -> Self {
        Self {
            balance_based_pnl_period: Decimal::ZERO,
            balance_based_pnl_cumulative: Decimal::ZERO,
            attribution: HashMap::new(),
            attribution_total_period: Decimal::ZERO,
            attribution_total_cumulative: Decimal::ZERO,
            reconciliation: Reconciliation {
                difference: Decimal::ZERO,
                tolerance,
                passed: true,
            },
        }
    }
}

/// Attribution components, configured per-mode via
/// `component_config.pnl_calculator.attribution_types`.
pub mod attribution {
    pub const SUPPLY_YIELD: &str = "supply_yield";
    pub const STAKING_YIELD_ORACLE: &str = "staking_yield_oracle";
    pub const STAKING_YIELD_REWARDS: &str = "staking_yield_rewards";
    pub const BORROW_COST: &str = "borrow_cost";
    pub const FUNDING_PNL: &str = "funding_pnl";
    pub const DELTA_PNL: &str = "delta_pnl";
    pub const PRICE_CHANGE_PNL: &str = "price_change_pnl";
    pub const TRANSACTION_COSTS: &str = "transaction_costs";
}
