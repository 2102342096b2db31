use basis_instrument::{
    exposure::Exposure, position::PositionMap, risk::RiskAssessment, venue::VenueId,
};
use rust_decimal::Decimal;
use smol_str::SmolStr;

/// The five canonical actions spec.md §4.8 enumerates. Mode-specific managers tag each batch of
/// emitted orders with the action that produced it, for logging and for the priority rule
/// ("dust ahead of normal rebalancing").
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StrategyAction {
    EntryFull,
    EntryPartial,
    ExitPartial,
    ExitFull,
    SellDust,
}

/// Config shared by every mode (spec.md §6 `strategy_manager.*`).
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub target_ltv: Decimal,
    pub stake_allocation_eth: Decimal,
    pub hedge_venues: Vec<VenueId>,
    /// Per-`hedge_venues` allocation ratio; must sum to 1.
    pub hedge_allocation: Vec<Decimal>,
    pub position_deviation_threshold: Decimal,
    pub dust_delta: Decimal,
    pub use_flash_loan: bool,
    pub max_leverage_iterations: u32,
    pub reserve_ratio: Decimal,
    /// Primary on-chain venue (wallet / lending / staking protocol) orders route through.
    pub onchain_venue: VenueId,
}

impl StrategyConfig {
    /// `Err` if `hedge_allocation` does not sum to 1 (within a small epsilon) or its length
    /// mismatches `hedge_venues`.
    pub fn validate(&self) -> Result<(), String> {
        if self.hedge_venues.len() != self.hedge_allocation.len() {
            return Err("hedge_venues and hedge_allocation must be the same length".into());
        }
        if self.hedge_venues.is_empty() {
            return Ok(());
        }
        let sum: Decimal = self.hedge_allocation.iter().copied().sum();
        if (sum - Decimal::ONE).abs() > Decimal::new(1, 6) {
            return Err(format!("hedge_allocation must sum to 1, got {sum}"));
        }
        Ok(())
    }
}

/// Everything a mode-specific `StrategyManager` needs to compute its target and emit orders for
/// one `T`. Built fresh by the caller (`Engine`/`PositionUpdateHandler`) every full-loop pass.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub exposure: Exposure,
    pub risk: RiskAssessment,
    pub positions: PositionMap,
    /// Total equity in share-class units, `exposure.total_value_share_class` net of any pending
    /// deposit/withdrawal already applied.
    pub equity: Decimal,
    pub pending_deposit_withdrawal: Option<Decimal>,
    pub risk_override_active: bool,
}

impl StrategyContext {
    /// `true` if rebalancing should fire this tick: deviation from target exceeds
    /// `position_deviation_threshold`, OR a risk override is active, OR a deposit/withdrawal is
    /// pending (spec.md §4.8).
    pub fn should_rebalance(&self, deviation: Decimal, config: &StrategyConfig) -> bool {
        deviation.abs() > config.position_deviation_threshold
            || self.risk_override_active
            || self.pending_deposit_withdrawal.is_some()
    }
}

/// A token balance the `dust` module flags as eligible for a `sell_dust` order: above
/// `dust_delta` and not the share class, the primary asset, or an LST.
#[derive(Debug, Clone)]
pub struct DustBalance {
    pub symbol: SmolStr,
    pub venue: VenueId,
    pub amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_config() -> StrategyConfig {
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
            onchain_venue: VenueId::from("aave"),
        }
    }

    #[test]
    fn no_hedge_venues_is_valid_with_no_allocation() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut config = base_config();
        config.hedge_venues = vec![VenueId::from("binance")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn hedge_allocation_must_sum_to_one() {
        let mut config = base_config();
        config.hedge_venues = vec![VenueId::from("binance"), VenueId::from("bybit")];
        config.hedge_allocation = vec![dec!(0.5), dec!(0.3)];
        assert!(config.validate().is_err());

        config.hedge_allocation = vec![dec!(0.5), dec!(0.5)];
        assert!(config.validate().is_ok());
    }
}
