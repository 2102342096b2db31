use crate::{
    basis_trade::BasisTradeManager, leveraged_staking::LeveragedStakingManager,
    manager::StrategyManager, market_neutral::MarketNeutralManager,
    pure_lending::PureLendingManager, staking_only::StakingOnlyManager,
};
use smol_str::SmolStr;

/// The five supported trading modes (spec.md §4.8 "Mode-specific subclasses").
#[derive(Debug, Copy, Clone, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    PureLending,
    BasisTrade,
    MarketNeutralLeveraged,
    StakingOnly,
    LeveragedStaking,
}

/// Construct the `StrategyManager` implementation for `mode`, keyed at request construction
/// (spec.md §4.8 "selected at request construction by a factory keyed on `mode`").
pub fn build_strategy_manager(mode: Mode, share_class_symbol: SmolStr) -> Box<dyn StrategyManager> {
    match mode {
        Mode::PureLending => Box::new(PureLendingManager { share_class_symbol }),
        Mode::BasisTrade => Box::new(BasisTradeManager {
            asset_symbol: share_class_symbol,
        }),
        Mode::MarketNeutralLeveraged => Box::new(MarketNeutralManager {
            eth_symbol: share_class_symbol,
        }),
        Mode::StakingOnly => Box::new(StakingOnlyManager {
            eth_symbol: share_class_symbol,
        }),
        Mode::LeveragedStaking => Box::new(LeveragedStakingManager {
            eth_symbol: share_class_symbol,
        }),
    }
}
