use crate::error::RiskError;
use basis_instrument::risk::{RiskAssessment, RiskMetric, RiskStatus, RiskType};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::collections::HashMap;

/// Which side of a threshold counts as a breach for a given risk type (spec.md §4.6: some types
/// warn below a floor, others above a ceiling).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ThresholdDirection {
    Below,
    Above,
}

/// Per-risk-type configuration: thresholds and the direction a breach is measured in.
/// `critical_threshold` is `None` for types spec.md only defines a WARNING threshold for
/// (`cex_margin_ratio`, `delta_drift`, `funding_cost_trend`, `reserve_ratio`) — those never
/// escalate past WARNING.
#[derive(Debug, Clone)]
pub struct RiskTypeConfig {
    pub risk_type: RiskType,
    pub warning_threshold: Decimal,
    pub critical_threshold: Option<Decimal>,
    pub direction: ThresholdDirection,
}

/// The raw values `RiskMonitor::assess` computes each risk type's formula from, supplied by the
/// caller (`PositionUpdateHandler`) from the latest `Exposure` and market data. Fields are
/// `Option` because only the risk types actually enabled for the active mode need to be
/// populated.
#[derive(Debug, Clone, Default)]
pub struct RiskInputs {
    pub aave_collateral_value: Option<Decimal>,
    pub aave_liquidation_threshold: Option<Decimal>,
    pub aave_debt_value: Option<Decimal>,
    pub cex_balance: Option<Decimal>,
    pub cex_notional_exposure: Option<Decimal>,
    pub net_delta: Option<Decimal>,
    pub target_exposure: Option<Decimal>,
    pub funding_cost_trend: Option<Decimal>,
    pub available_reserve: Option<Decimal>,
    pub total_equity: Option<Decimal>,
}

/// Computes the enabled risk types from exposure and market data (spec.md §4.6), rolling the
/// per-type statuses up into an `overall_status` equal to the maximum severity.
#[derive(Debug)]
pub struct RiskMonitor {
    configs: HashMap<RiskType, RiskTypeConfig>,
    /// Whether each edge-triggered alert (eg/ `ReserveLow`) was already firing as of the previous
    /// `assess` call, so it fires only on the breach transition rather than every tick it holds
    /// (spec.md §8 B3 "exactly once per transition").
    previously_breached: Mutex<HashMap<SmolStr, bool>>,
}

impl RiskMonitor {
    pub fn new(configs: Vec<RiskTypeConfig>) -> Self {
        Self {
            configs: configs
                .into_iter()
                .map(|config| (config.risk_type, config))
                .collect(),
            previously_breached: Mutex::new(HashMap::new()),
        }
    }

    /// `true` only on the `false -> true` transition of `breached` for `alert`, recording the new
    /// state for the next call.
    fn rising_edge(&self, alert: &str, breached: bool) -> bool {
        let mut state = self.previously_breached.lock();
        let was_breached = state.insert(SmolStr::new(alert), breached).unwrap_or(false);
        breached && !was_breached
    }

    fn classify(config: &RiskTypeConfig, value: Decimal) -> RiskStatus {
        let warning_breached = match config.direction {
            ThresholdDirection::Below => value < config.warning_threshold,
            ThresholdDirection::Above => value > config.warning_threshold,
        };
        if !warning_breached {
            return RiskStatus::Safe;
        }

        let critical_breached = config.critical_threshold.is_some_and(|critical| {
            match config.direction {
                ThresholdDirection::Below => value < critical,
                ThresholdDirection::Above => value > critical,
            }
        });

        if critical_breached {
            RiskStatus::Critical
        } else {
            RiskStatus::Warning
        }
    }

    fn metric(&self, risk_type: RiskType, value: Decimal) -> Result<RiskMetric, RiskError> {
        let config = self.configs.get(&risk_type).ok_or_else(|| {
            RiskError::UnconfiguredRiskType {
                risk_type: SmolStr::new(format!("{risk_type:?}")),
            }
        })?;
        Ok(RiskMetric {
            value,
            warning_threshold: config.warning_threshold,
            critical_threshold: config.critical_threshold.unwrap_or(config.warning_threshold),
            status: Self::classify(config, value),
        })
    }

    /// Compute every risk type present both in `self.configs` and with populated inputs in
    /// `inputs`; types enabled in config but missing their required inputs are skipped rather
    /// than erroring, since a mode may enable a risk type only some ticks have data for.
    pub fn assess(&self, inputs: &RiskInputs) -> Result<RiskAssessment, RiskError> {
        let mut assessment = RiskAssessment::empty();

        if let (Some(collateral), Some(threshold), Some(debt)) = (
            inputs.aave_collateral_value,
            inputs.aave_liquidation_threshold,
            inputs.aave_debt_value,
        ) {
            if self.configs.contains_key(&RiskType::AaveHealthFactor) && !debt.is_zero() {
                let value = (collateral * threshold) / debt;
                let metric = self.metric(RiskType::AaveHealthFactor, value)?;
                self.roll_up(&mut assessment, RiskType::AaveHealthFactor, metric);
            }
        }

        if let (Some(balance), Some(notional)) =
            (inputs.cex_balance, inputs.cex_notional_exposure)
        {
            if self.configs.contains_key(&RiskType::CexMarginRatio) && !notional.is_zero() {
                let value = balance / notional;
                let metric = self.metric(RiskType::CexMarginRatio, value)?;
                self.roll_up(&mut assessment, RiskType::CexMarginRatio, metric);
            }
        }

        if let (Some(net_delta), Some(target)) = (inputs.net_delta, inputs.target_exposure) {
            if self.configs.contains_key(&RiskType::DeltaDrift) && !target.is_zero() {
                let value = net_delta.abs() / target;
                let metric = self.metric(RiskType::DeltaDrift, value)?;
                self.roll_up(&mut assessment, RiskType::DeltaDrift, metric);
            }
        }

        if let Some(trend) = inputs.funding_cost_trend {
            if self.configs.contains_key(&RiskType::FundingCostTrend) {
                let metric = self.metric(RiskType::FundingCostTrend, trend)?;
                self.roll_up(&mut assessment, RiskType::FundingCostTrend, metric);
            }
        }

        if let (Some(reserve), Some(equity)) = (inputs.available_reserve, inputs.total_equity) {
            if self.configs.contains_key(&RiskType::ReserveRatio) && !equity.is_zero() {
                let value = reserve / equity;
                let metric = self.metric(RiskType::ReserveRatio, value)?;
                let breached = matches!(metric.status, RiskStatus::Warning | RiskStatus::Critical);
                if self.rising_edge("ReserveLow", breached) {
                    assessment
                        .alerts
                        .push(SmolStr::new("ReserveLow"));
                }
                self.roll_up(&mut assessment, RiskType::ReserveRatio, metric);
            }
        }

        Ok(assessment)
    }

    fn roll_up(&self, assessment: &mut RiskAssessment, risk_type: RiskType, metric: RiskMetric) {
        assessment.overall_status = assessment.overall_status.max(metric.status);
        assessment.metrics.insert(risk_type, metric);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn monitor() -> RiskMonitor {
        RiskMonitor::new(vec![
            RiskTypeConfig {
                risk_type: RiskType::AaveHealthFactor,
                warning_threshold: dec!(1.3),
                critical_threshold: Some(dec!(1.1)),
                direction: ThresholdDirection::Below,
            },
            RiskTypeConfig {
                risk_type: RiskType::DeltaDrift,
                warning_threshold: dec!(0.05),
                critical_threshold: None,
                direction: ThresholdDirection::Above,
            },
            RiskTypeConfig {
                risk_type: RiskType::ReserveRatio,
                warning_threshold: dec!(0.1),
                critical_threshold: None,
                direction: ThresholdDirection::Below,
            },
        ])
    }

    #[test]
    fn health_factor_safe_above_warning() {
        let inputs = RiskInputs {
            aave_collateral_value: Some(dec!(200)),
            aave_liquidation_threshold: Some(dec!(0.8)),
            aave_debt_value: Some(dec!(100)),
            ..Default::default()
        };
        let assessment = monitor().assess(&inputs).unwrap();
        assert_eq!(assessment.overall_status, RiskStatus::Safe);
    }

    #[test]
    fn health_factor_critical_below_crit_threshold() {
        let inputs = RiskInputs {
            aave_collateral_value: Some(dec!(100)),
            aave_liquidation_threshold: Some(dec!(0.8)),
            aave_debt_value: Some(dec!(100)),
            ..Default::default()
        };
        let assessment = monitor().assess(&inputs).unwrap();
        assert_eq!(assessment.overall_status, RiskStatus::Critical);
    }

    #[test]
    fn delta_drift_never_escalates_past_warning() {
        let inputs = RiskInputs {
            net_delta: Some(dec!(-50)),
            target_exposure: Some(dec!(100)),
            ..Default::default()
        };
        let assessment = monitor().assess(&inputs).unwrap();
        assert_eq!(assessment.overall_status, RiskStatus::Warning);
    }

    #[test]
    fn reserve_low_alert_fires_on_breach() {
        let inputs = RiskInputs {
            available_reserve: Some(dec!(5)),
            total_equity: Some(dec!(100)),
            ..Default::default()
        };
        let assessment = monitor().assess(&inputs).unwrap();
        assert!(assessment.alerts.iter().any(|a| a.as_str() == "ReserveLow"));
    }

    /// B3 (spec.md §8): `ReserveLow` fires on the breach but not again on a later tick that is
    /// still below floor, then fires again after a recovery-and-rebreach cycle.
    #[test]
    fn reserve_low_alert_fires_only_on_the_breach_transition() {
        let monitor = monitor();
        let breached = RiskInputs {
            available_reserve: Some(dec!(5)),
            total_equity: Some(dec!(100)),
            ..Default::default()
        };
        let safe = RiskInputs {
            available_reserve: Some(dec!(50)),
            total_equity: Some(dec!(100)),
            ..Default::default()
        };

        let first = monitor.assess(&breached).unwrap();
        assert!(first.alerts.iter().any(|a| a.as_str() == "ReserveLow"));

        let still_breached = monitor.assess(&breached).unwrap();
        assert!(!still_breached.alerts.iter().any(|a| a.as_str() == "ReserveLow"));

        let recovered = monitor.assess(&safe).unwrap();
        assert!(!recovered.alerts.iter().any(|a| a.as_str() == "ReserveLow"));

        let rebreached = monitor.assess(&breached).unwrap();
        assert!(rebreached.alerts.iter().any(|a| a.as_str() == "ReserveLow"));
    }

    #[test]
    fn missing_inputs_skip_the_risk_type() {
        let assessment = monitor().assess(&RiskInputs::default()).unwrap();
        assert!(assessment.metrics.is_empty());
        assert_eq!(assessment.overall_status, RiskStatus::Safe);
    }
}
