use crate::{venue::VenueId, Timestamp};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use smol_str::SmolStr;

/// Closed union of event kinds appended by `EventLogger`.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum EventType {
    TradeExecuted,
    TradeFailed,
    PositionRefreshed,
    ReconciliationMismatch,
    SettlementApplied,
    RiskThresholdBreached,
    ReserveLow,
    StrategyInfeasible,
    SystemFailure,
    PnlDriftAlert,
}

/// Events are totally ordered by `(timestamp, order_within_t)`. `order_within_t` is assigned by
/// `EventLogger` from an atomic counter that resets when `timestamp` advances; callers never set
/// it directly (see invariant: "Event `(T, order_within_T)` sequence is strictly increasing").
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Event {
    pub timestamp: Timestamp,
    pub order_within_t: u64,
    pub event_type: EventType,
    pub venue: Option<VenueId>,
    pub token: Option<SmolStr>,
    pub amount: Option<Decimal>,
    pub status: Option<SmolStr>,
    pub purpose: Option<SmolStr>,
    pub wallet_snapshot: Option<JsonValue>,
    pub cex_snapshot: Option<JsonValue>,
    pub aave_snapshot: Option<JsonValue>,
    pub parent_event: Option<u64>,
    pub iteration: Option<u32>,
    pub tx_hash: Option<SmolStr>,
    pub tx_status: Option<SmolStr>,
}

impl Event {
    /// Construct an `Event` with `order_within_t` left at the sentinel zero value; `EventLogger`
    /// overwrites it with the next value from its per-timestamp counter on `log`.
    pub fn new(timestamp: Timestamp, event_type: EventType) -> Self {
        Self {
            timestamp,
            order_within_t: 0,
            event_type,
            venue: None,
            token: None,
            amount: None,
            status: None,
            purpose: None,
            wallet_snapshot: None,
            cex_snapshot: None,
            aave_snapshot: None,
            parent_event: None,
            iteration: None,
            tx_hash: None,
            tx_status: None,
        }
    }

    pub fn with_venue(mut self, venue: VenueId) -> Self {
        self.venue = Some(venue);
        self
    }

    pub fn with_amount(mut self, token: impl Into<SmolStr>, amount: Decimal) -> Self {
        self.token = Some(token.into());
        self.amount = Some(amount);
        self
    }

    pub fn with_status(mut self, status: impl Into<SmolStr>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<SmolStr>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    /// Total ordering key, `(timestamp, order_within_t)`, used to verify invariant P5.
    pub fn order_key(&self) -> (Timestamp, u64) {
        (self.timestamp, self.order_within_t)
    }
}
