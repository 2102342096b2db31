use crate::order::Order;
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;

/// Outcome of a single venue `execute` call.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum ExecutionStatus {
    Executed,
    Failed,
}

/// The sole object by which an execution reports its effect. `ExecutionManager` converts this
/// into a `Vec<Delta>` for reconciliation via `PositionUpdateHandler::reconcile`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionHandshake {
    pub order: Order,
    pub status: ExecutionStatus,
    pub executed_amount: Decimal,
    pub executed_price: Option<Decimal>,
    /// Per-symbol signed amount change, keyed by the symbol affected (base asset, quote asset,
    /// AAVE receipt token, etc).
    pub position_deltas: HashMap<SmolStr, Decimal>,
    pub fee_amount: Decimal,
    pub fee_currency: SmolStr,
    pub trade_id: Option<SmolStr>,
    pub error_code: Option<SmolStr>,
    pub error_message: Option<String>,
}

impl ExecutionHandshake {
    pub fn is_executed(&self) -> bool {
        matches!(self.status, ExecutionStatus::Executed)
    }
}
