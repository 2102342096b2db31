use crate::error::EngineError;
use basis_instrument::{venue::VenueId, ShareClass};
use basis_risk::{
    exposure::{ConversionMethod, DeltaClass, TrackedAsset},
    risk::{RiskTypeConfig, ThresholdDirection},
};
use basis_strategy::Mode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;

/// `risk_monitor.*` (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RiskMonitorConfig {
    pub enabled_risk_types: Vec<String>,
    pub risk_limits: HashMap<String, Decimal>,
}

/// `exposure_monitor.*` (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExposureMonitorConfig {
    pub track_assets: Vec<String>,
    pub conversion_methods: HashMap<String, String>,
}

/// `pnl_calculator.*` (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PnlCalculatorConfig {
    pub attribution_types: Vec<String>,
    pub reconciliation_tolerance: Decimal,
}

/// `strategy_manager.*` (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyManagerConfig {
    pub actions: Vec<String>,
    pub target_ltv: Decimal,
    pub stake_allocation_eth: Decimal,
    pub hedge_venues: Vec<String>,
    pub hedge_allocation: Vec<Decimal>,
    pub position_deviation_threshold: Decimal,
    pub dust_delta: Decimal,
    pub use_flash_loan: bool,
    pub max_leverage_iterations: u32,
    pub reserve_ratio: Decimal,
    pub onchain_venue: String,
}

impl StrategyManagerConfig {
    pub fn to_strategy_config(&self) -> basis_strategy::StrategyConfig {
        basis_strategy::StrategyConfig {
            target_ltv: self.target_ltv,
            stake_allocation_eth: self.stake_allocation_eth,
            hedge_venues: self.hedge_venues.iter().map(|v| VenueId::from(v.as_str())).collect(),
            hedge_allocation: self.hedge_allocation.clone(),
            position_deviation_threshold: self.position_deviation_threshold,
            dust_delta: self.dust_delta,
            use_flash_loan: self.use_flash_loan,
            max_leverage_iterations: self.max_leverage_iterations,
            reserve_ratio: self.reserve_ratio,
            onchain_venue: VenueId::from(self.onchain_venue.as_str()),
        }
    }
}

/// `execution_manager.*` (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionManagerConfig {
    pub supported_operations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    pub risk_monitor: RiskMonitorConfig,
    pub exposure_monitor: ExposureMonitorConfig,
    pub pnl_calculator: PnlCalculatorConfig,
    pub strategy_manager: StrategyManagerConfig,
    pub execution_manager: ExecutionManagerConfig,
}

/// One mode's full configuration, loaded from YAML (spec.md §6 "Mode config (YAML)").
///
/// `deny_unknown_fields` on every nested struct enforces "any key not defined in the mode config
/// is rejected" both for the base file and for `config_overrides` merged over it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModeConfig {
    pub mode: Mode,
    pub share_class: ShareClass,
    pub asset: String,
    pub lst_type: Option<String>,
    pub rewards_mode: Option<String>,
    pub lending_enabled: bool,
    pub staking_enabled: bool,
    pub borrowing_enabled: bool,
    pub basis_trade_enabled: bool,
    pub data_requirements: Vec<String>,
    pub component_config: ComponentConfig,
}

impl ModeConfig {
    /// Parse the base mode config from its YAML source.
    pub fn from_yaml(source: &str) -> Result<Self, EngineError> {
        let config: ModeConfig = serde_yaml::from_str(source)
            .map_err(|e| EngineError::Configuration(format!("mode config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Deep-merge `overrides` (a nested map mirroring the config's own shape) over this config,
    /// rejecting any key the base config does not define (spec.md §6 "any key not defined in the
    /// mode config is rejected").
    pub fn with_overrides(&self, overrides: &serde_json::Value) -> Result<Self, EngineError> {
        let mut base = serde_json::to_value(self)
            .map_err(|e| EngineError::Internal(format!("config serialise: {e}")))?;
        deep_merge_checked(&mut base, overrides)?;

        let merged: ModeConfig = serde_json::from_value(base)
            .map_err(|e| EngineError::Configuration(format!("config_overrides: {e}")))?;
        merged.validate()?;
        Ok(merged)
    }

    /// Validation run both at startup and at request-construction time (spec.md §6), beyond what
    /// `deny_unknown_fields` already enforces structurally.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.component_config.strategy_manager.target_ltv < Decimal::ZERO
            || self.component_config.strategy_manager.target_ltv >= Decimal::ONE
        {
            return Err(EngineError::Configuration(
                "strategy_manager.target_ltv must be in [0, 1)".into(),
            ));
        }
        if self.component_config.strategy_manager.position_deviation_threshold <= Decimal::ZERO {
            return Err(EngineError::Configuration(
                "strategy_manager.position_deviation_threshold must be positive".into(),
            ));
        }
        self.component_config
            .strategy_manager
            .to_strategy_config()
            .validate()
            .map_err(EngineError::Configuration)?;
        if self.data_requirements.is_empty() {
            return Err(EngineError::Configuration(
                "data_requirements must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Build the `RiskMonitor` threshold table from `risk_monitor.enabled_risk_types` and
    /// `.risk_limits`. Key naming convention: `<risk_type>_warn` / `<risk_type>_crit` (only
    /// `aave_health_factor` ships both; the rest are WARNING-only per spec.md §4.6).
    pub fn risk_type_configs(&self) -> Vec<RiskTypeConfig> {
        use basis_instrument::risk::RiskType;

        let limits = &self.component_config.risk_monitor.risk_limits;
        self.component_config
            .risk_monitor
            .enabled_risk_types
            .iter()
            .filter_map(|name| {
                let (risk_type, direction, warn_key, crit_key) = match name.as_str() {
                    "aave_health_factor" => (
                        RiskType::AaveHealthFactor,
                        ThresholdDirection::Below,
                        "hf_warn",
                        Some("hf_crit"),
                    ),
                    "cex_margin_ratio" => (
                        RiskType::CexMarginRatio,
                        ThresholdDirection::Below,
                        "margin_warn",
                        None,
                    ),
                    "delta_drift" => (
                        RiskType::DeltaDrift,
                        ThresholdDirection::Above,
                        "delta_drift_warn",
                        None,
                    ),
                    "funding_cost_trend" => (
                        RiskType::FundingCostTrend,
                        ThresholdDirection::Above,
                        "funding_cost_trend_warn",
                        None,
                    ),
                    "reserve_ratio" => (
                        RiskType::ReserveRatio,
                        ThresholdDirection::Below,
                        "reserve_ratio_floor",
                        None,
                    ),
                    _ => return None,
                };
                Some(RiskTypeConfig {
                    risk_type,
                    warning_threshold: limits.get(warn_key).copied().unwrap_or(Decimal::ZERO),
                    critical_threshold: crit_key.and_then(|key| limits.get(key).copied()),
                    direction,
                })
            })
            .collect()
    }

    /// Build `ExposureMonitor`'s `TrackedAsset` table from `exposure_monitor.track_assets` and
    /// `.conversion_methods`. Each entry in `conversion_methods` is a `:`-separated spec:
    /// `direct`, `usd_price:<oracle_kind>`, `aave_supply:<index_kind>:<oracle_kind>`,
    /// `aave_debt:<index_kind>:<oracle_kind>`, or `lst_oracle:<lst_oracle_kind>:<usd_oracle_kind>`,
    /// optionally prefixed with `cex:` to mark the asset as CEX-side for the net-delta split
    /// (default on-chain).
    pub fn tracked_assets(&self) -> Result<Vec<TrackedAsset>, EngineError> {
        self.component_config
            .exposure_monitor
            .track_assets
            .iter()
            .map(|asset| {
                let spec = self
                    .component_config
                    .exposure_monitor
                    .conversion_methods
                    .get(asset)
                    .ok_or_else(|| {
                        EngineError::Configuration(format!(
                            "exposure_monitor.conversion_methods missing entry for '{asset}'"
                        ))
                    })?;

                let (delta_class, spec) = match spec.strip_prefix("cex:") {
                    Some(rest) => (DeltaClass::Cex, rest),
                    None => (DeltaClass::Onchain, spec.as_str()),
                };

                let parts: Vec<&str> = spec.split(':').collect();
                let conversion_method = match parts.as_slice() {
                    ["direct"] => ConversionMethod::Direct,
                    ["usd_price", oracle_kind] => ConversionMethod::UsdPrice {
                        oracle_kind: SmolStr::new(*oracle_kind),
                    },
                    ["aave_supply", index_kind, oracle_kind] => ConversionMethod::AaveLiquidityIndex {
                        index_kind: SmolStr::new(*index_kind),
                        oracle_kind: SmolStr::new(*oracle_kind),
                    },
                    ["aave_debt", index_kind, oracle_kind] => ConversionMethod::AaveBorrowIndex {
                        index_kind: SmolStr::new(*index_kind),
                        oracle_kind: SmolStr::new(*oracle_kind),
                    },
                    ["lst_oracle", lst_oracle_kind, usd_oracle_kind] => ConversionMethod::LstOracle {
                        lst_oracle_kind: SmolStr::new(*lst_oracle_kind),
                        usd_oracle_kind: SmolStr::new(*usd_oracle_kind),
                    },
                    _ => {
                        return Err(EngineError::Configuration(format!(
                            "unrecognised conversion method spec '{spec}' for '{asset}'"
                        )))
                    }
                };

                Ok(TrackedAsset {
                    asset: SmolStr::new(asset.as_str()),
                    symbols: vec![SmolStr::new(asset.as_str())],
                    conversion_method,
                    delta_class,
                })
            })
            .collect()
    }
}

/// Merge `src` into `dst` in place; errors if `src` names an object key `dst` does not already
/// have (the "unknown override key" rejection).
fn deep_merge_checked(
    dst: &mut serde_json::Value,
    src: &serde_json::Value,
) -> Result<(), EngineError> {
    match (dst, src) {
        (serde_json::Value::Object(dst_map), serde_json::Value::Object(src_map)) => {
            for (key, value) in src_map {
                match dst_map.get_mut(key) {
                    Some(existing) => deep_merge_checked(existing, value)?,
                    None => {
                        return Err(EngineError::Configuration(format!(
                            "config_overrides: unknown key '{key}'"
                        )))
                    }
                }
            }
            Ok(())
        }
        (dst_slot, src_value) => {
            *dst_slot = src_value.clone();
            Ok(())
        }
    }
}

/// `BASIS_EXECUTION_MODE` (spec.md §6).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Backtest,
    Live,
}

/// `BASIS_DATA_MODE` (spec.md §6), independent of `ExecutionMode`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataMode {
    Csv,
    Api,
    Db,
}

/// Process-startup environment configuration (spec.md §6 "Environment configuration"). Loaded
/// once and immutable thereafter.
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub execution_mode: ExecutionMode,
    pub data_mode: DataMode,
    pub data_dir: std::path::PathBuf,
    pub results_dir: std::path::PathBuf,
    pub max_data_age_seconds: i64,
}

impl EnvironmentConfig {
    pub fn from_env() -> Result<Self, EngineError> {
        let execution_mode = match std::env::var("BASIS_EXECUTION_MODE").as_deref() {
            Ok("backtest") => ExecutionMode::Backtest,
            Ok("live") => ExecutionMode::Live,
            _ => {
                return Err(EngineError::Configuration(
                    "BASIS_EXECUTION_MODE must be 'backtest' or 'live'".into(),
                ))
            }
        };
        let data_mode = match std::env::var("BASIS_DATA_MODE").as_deref() {
            Ok("csv") => DataMode::Csv,
            Ok("api") => DataMode::Api,
            Ok("db") => DataMode::Db,
            _ => {
                return Err(EngineError::Configuration(
                    "BASIS_DATA_MODE must be 'csv', 'api', or 'db'".into(),
                ))
            }
        };
        let data_dir = std::env::var("BASIS_DATA_DIR")
            .map_err(|_| EngineError::Configuration("BASIS_DATA_DIR is required".into()))?
            .into();
        let results_dir = std::env::var("BASIS_RESULTS_DIR")
            .map_err(|_| EngineError::Configuration("BASIS_RESULTS_DIR is required".into()))?
            .into();
        let max_data_age_seconds = std::env::var("BASIS_MAX_DATA_AGE_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        Ok(Self {
            execution_mode,
            data_mode,
            data_dir,
            results_dir,
            max_data_age_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
mode: pure_lending
share_class: Usdt
asset: USDT
lst_type: null
rewards_mode: null
lending_enabled: true
staking_enabled: false
borrowing_enabled: false
basis_trade_enabled: false
data_requirements:
  - spot_price.USDTUSD
component_config:
  risk_monitor:
    enabled_risk_types: [reserve_ratio]
    risk_limits:
      reserve_ratio_floor: "0.1"
  exposure_monitor:
    track_assets: [USDT]
    conversion_methods:
      USDT: direct
  pnl_calculator:
    attribution_types: [supply_yield]
    reconciliation_tolerance: "0.001"
  strategy_manager:
    actions: [entry_full]
    target_ltv: "0"
    stake_allocation_eth: "0"
    hedge_venues: []
    hedge_allocation: []
    position_deviation_threshold: "0.02"
    dust_delta: "1"
    use_flash_loan: false
    max_leverage_iterations: 1
    reserve_ratio: "0.1"
    onchain_venue: aave
  execution_manager:
    supported_operations: [supply, withdraw]
"#
    }

    #[test]
    fn parses_a_valid_mode_config() {
        let config = ModeConfig::from_yaml(sample_yaml()).unwrap();
        assert_eq!(config.mode, Mode::PureLending);
    }

    #[test]
    fn rejects_unknown_top_level_key() {
        let bad = format!("{}\nextra_key: 1\n", sample_yaml());
        assert!(ModeConfig::from_yaml(&bad).is_err());
    }

    #[test]
    fn override_merge_rejects_unknown_key() {
        let config = ModeConfig::from_yaml(sample_yaml()).unwrap();
        let overrides = serde_json::json!({ "not_a_real_field": 1 });
        assert!(config.with_overrides(&overrides).is_err());
    }

    #[test]
    fn override_merge_applies_known_nested_key() {
        let config = ModeConfig::from_yaml(sample_yaml()).unwrap();
        let overrides = serde_json::json!({
            "component_config": { "strategy_manager": { "dust_delta": "5" } }
        });
        let merged = config.with_overrides(&overrides).unwrap();
        assert_eq!(
            merged.component_config.strategy_manager.dust_delta,
            Decimal::from(5)
        );
    }
}
