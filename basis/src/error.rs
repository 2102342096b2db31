use basis_data::error::DataError;
use basis_execution::error::ExecutionError;
use basis_instrument::position::PositionKey;
use basis_instrument::Timestamp;
use basis_risk::error::RiskError;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// The stable, non-zero process exit code `SystemFailure` terminates with (spec.md §6
/// "Operational failure signaling"), distinguishing reconciliation-triggered restarts from other
/// process exits for the external supervisor.
pub const SYSTEM_FAILURE_EXIT_CODE: i32 = 91;

/// Full error taxonomy (spec.md §7). Every component surfaces one of these to its caller; no
/// silent catches. `ExecutionManager` is the sole component that converts a reconciliation
/// failure into `SystemFailure`, and `Engine` is the sole component that terminates the process.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data unavailable/stale: {0}")]
    Data(#[from] DataError),

    #[error("venue execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("risk computation failed: {0}")]
    Risk(#[from] RiskError),

    #[error("reconciliation mismatch at T={at}: {mismatches} key(s) out of tolerance")]
    ReconciliationMismatch { at: Timestamp, mismatches: usize },

    #[error("risk threshold breached: {risk_type} is {status}")]
    RiskThresholdBreached { risk_type: SmolStr, status: SmolStr },

    #[error("P&L drift: balance and attribution tracks diverged for {consecutive_periods} consecutive period(s) (diff {diff})")]
    PnLDriftAlert { consecutive_periods: u32, diff: rust_decimal::Decimal },

    #[error("unknown position key '{0}' referenced by a delta")]
    UnknownPositionKey(PositionKey),

    #[error("negative balance prohibited for position key '{0}'")]
    NegativeBalanceProhibited(PositionKey),

    #[error("system failure: {reason}")]
    SystemFailure { reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// `true` for the error variants spec.md §7 marks fatal in backtest regardless of mode
    /// (`Configuration`, `Internal`, and any `SystemFailure`).
    pub fn is_always_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Configuration(_) | EngineError::Internal(_) | EngineError::SystemFailure { .. }
        )
    }

    /// Promote any error to `SystemFailure`, preserving its original message as the reason.
    pub fn into_system_failure(self) -> EngineError {
        match self {
            EngineError::SystemFailure { .. } => self,
            other => EngineError::SystemFailure {
                reason: other.to_string(),
            },
        }
    }
}
