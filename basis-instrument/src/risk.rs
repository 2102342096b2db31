use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;

/// Severity roll-up for a single risk type or the whole assessment.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum RiskStatus {
    Safe,
    Warning,
    Critical,
}

impl RiskStatus {
    /// Severity ordering used to compute `overall_status` as the max over enabled risk types.
    fn rank(self) -> u8 {
        match self {
            RiskStatus::Safe => 0,
            RiskStatus::Warning => 1,
            RiskStatus::Critical => 2,
        }
    }

    pub fn max(self, other: Self) -> Self {
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }
}

/// Enumerated risk type identifiers, configured on/off per mode via
/// `component_config.risk_monitor.enabled_risk_types`.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum RiskType {
    AaveHealthFactor,
    CexMarginRatio,
    DeltaDrift,
    FundingCostTrend,
    ReserveRatio,
}

/// Per-risk-type computed value and status.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiskMetric {
    pub value: Decimal,
    pub warning_threshold: Decimal,
    pub critical_threshold: Decimal,
    pub status: RiskStatus,
}

/// Full risk snapshot produced by `RiskMonitor::assess`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiskAssessment {
    pub metrics: HashMap<RiskType, RiskMetric>,
    pub overall_status: RiskStatus,
    pub alerts: Vec<SmolStr>,
}

impl RiskAssessment {
    pub fn empty() -> Self {
        Self {
            metrics: HashMap::new(),
            overall_status: RiskStatus::Safe,
            alerts: Vec::new(),
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self.overall_status, RiskStatus::Critical)
    }
}
