use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// All failures `ExposureMonitor`/`RiskMonitor` can report.
///
/// Per spec.md §4.5: a missing conversion datum is fatal in backtest, WARNING in live (the
/// monitor falls back to the last known value and emits `StaleConversion`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum RiskError {
    #[error("missing conversion datum for asset '{asset}' via method '{method}'")]
    MissingConversionDatum { asset: SmolStr, method: SmolStr },

    #[error("asset '{asset}' has no configured conversion_method")]
    UnconfiguredAsset { asset: SmolStr },

    #[error("risk type '{risk_type}' has no configured thresholds")]
    UnconfiguredRiskType { risk_type: SmolStr },
}
