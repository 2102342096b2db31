use crate::{config::ModeConfig, error::EngineError};
use basis_instrument::{ShareClass, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// `queued → running → (completed | failed | cancelled)` (spec.md §7 "User-visible failure
/// behavior"). `Failed` carries the terminal error code and message.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum RequestStatus {
    Queued,
    Running,
    Completed,
    Failed { code: String, message: String },
    Cancelled,
}

impl RequestStatus {
    /// `true` once a request has reached a terminal state and its driver loop should stop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Failed { .. } | RequestStatus::Cancelled
        )
    }

    /// Only `queued → running`, `running → {completed, failed, cancelled}` are legal; anything
    /// else is a programming error surfaced as `EngineError::Internal`.
    pub fn transition(&mut self, next: RequestStatus) -> Result<(), EngineError> {
        let legal = matches!(
            (&self, &next),
            (RequestStatus::Queued, RequestStatus::Running)
                | (RequestStatus::Running, RequestStatus::Completed)
                | (RequestStatus::Running, RequestStatus::Failed { .. })
                | (RequestStatus::Running, RequestStatus::Cancelled)
        );
        if !legal {
            return Err(EngineError::Internal(format!(
                "illegal request status transition {self:?} -> {next:?}"
            )));
        }
        *self = next;
        Ok(())
    }
}

/// The `run_backtest(request)` / `start_live(request)` request object (spec.md §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Request {
    pub request_id: Uuid,
    pub strategy_name: String,
    pub initial_capital: Decimal,
    pub share_class: ShareClass,
    pub config_overrides: JsonValue,
    pub start_date: Option<Timestamp>,
    pub end_date: Option<Timestamp>,
}

impl Request {
    /// Resolve this request's mode config: load `base` (already parsed from the mode's YAML
    /// file) and deep-merge `config_overrides` over it (spec.md §3 "Config").
    pub fn resolve_config(&self, base: &ModeConfig) -> Result<ModeConfig, EngineError> {
        if self.config_overrides.is_null() {
            return Ok(base.clone());
        }
        base.with_overrides(&self.config_overrides)
    }

    /// `start_date`/`end_date` are required for backtest, absent for live.
    pub fn validate_for_backtest(&self) -> Result<(), EngineError> {
        if self.start_date.is_none() || self.end_date.is_none() {
            return Err(EngineError::Configuration(
                "backtest requests require start_date and end_date".into(),
            ));
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(EngineError::Configuration(
                "initial_capital must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_to_running_is_legal() {
        let mut status = RequestStatus::Queued;
        assert!(status.transition(RequestStatus::Running).is_ok());
    }

    #[test]
    fn queued_to_completed_is_illegal() {
        let mut status = RequestStatus::Queued;
        assert!(status.transition(RequestStatus::Completed).is_err());
    }

    #[test]
    fn terminal_states_are_terminal() {
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::Running.is_terminal());
    }
}
