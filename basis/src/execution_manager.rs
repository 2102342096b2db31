use crate::{
    error::EngineError,
    position_monitor::PositionMonitor,
    position_update_handler::{resolve_key, PositionUpdateHandler},
};
use basis_execution::manager::VenueInterfaceManager;
use basis_instrument::{execution::ExecutionHandshake, order::Order, position::PositionKey, Timestamp};
use std::{sync::Arc, time::Instant};
use tracing::{error, warn};

/// Seconds to wait before each retry attempt (spec.md §4.10.1): attempt 1 immediate, attempt 2
/// after 1s, attempt 3 after 2s, attempt 4 after 4s.
const BACKOFF_SCHEDULE_SECONDS: [u64; 4] = [0, 1, 2, 4];

/// Hard ceiling on time spent reconciling a single order in live mode before the engine gives up
/// and escalates to `SystemFailure` (spec.md §4.10.1).
const RECONCILE_TIMEOUT_SECONDS: u64 = 120;

/// Maximum retries after the initial attempt (spec.md §4.10.1, P7 "no reconciliation attempt
/// sequence exceeds 4 attempts"). Enforced independently of [`RECONCILE_TIMEOUT_SECONDS`].
const MAX_RETRIES: usize = 3;

/// Drives the tight loop: execute one order, reconcile its effect, and either advance or retry
/// (spec.md §4.1, §4.10). Orders are processed strictly sequentially — each order's handshake is
/// fully resolved (success or `SystemFailure`) before the next order in the batch is dispatched.
#[derive(Clone)]
pub struct ExecutionManager {
    venue_manager: Arc<VenueInterfaceManager>,
    handler: Arc<PositionUpdateHandler>,
    is_backtest: bool,
}

impl ExecutionManager {
    pub fn new(
        venue_manager: Arc<VenueInterfaceManager>,
        handler: Arc<PositionUpdateHandler>,
        is_backtest: bool,
    ) -> Self {
        Self {
            venue_manager,
            handler,
            is_backtest,
        }
    }

    /// Advance every registered venue's notion of "now" to `t`. Called by `Engine` at the start
    /// of every full-loop pass, whether or not the tick ends up emitting orders, so a venue's
    /// next fill always prices off the current `T` rather than whatever `T` it last executed at.
    pub fn advance_to(&self, t: Timestamp) {
        self.venue_manager.advance_all(t);
    }

    /// Re-query every registered venue for `keys`, for `PositionMonitor::refresh_from_venues`'s
    /// live-mode full refresh (spec.md §9).
    pub fn query_all_positions(
        &self,
        keys: &[PositionKey],
    ) -> Result<std::collections::HashMap<PositionKey, rust_decimal::Decimal>, EngineError> {
        Ok(self.venue_manager.query_all_positions(keys)?)
    }

    /// Process `orders` against `monitor` in sequence, returning one handshake per order.
    /// Backtest: any execution failure or reconciliation mismatch is immediately a
    /// `SystemFailure` (a simulated venue is deterministic, so a mismatch signals a logic bug, not
    /// network flakiness). Live: retried per [`BACKOFF_SCHEDULE_SECONDS`] until
    /// [`RECONCILE_TIMEOUT_SECONDS`] elapses, then `SystemFailure`.
    pub async fn process(
        &self,
        t: Timestamp,
        monitor: &PositionMonitor,
        orders: &[Order],
    ) -> Result<Vec<ExecutionHandshake>, EngineError> {
        let mut handshakes = Vec::with_capacity(orders.len());
        for order in orders {
            let handshake = self.process_one(t, monitor, order).await?;
            handshakes.push(handshake);
        }
        Ok(handshakes)
    }

    async fn process_one(
        &self,
        t: Timestamp,
        monitor: &PositionMonitor,
        order: &Order,
    ) -> Result<ExecutionHandshake, EngineError> {
        let interface = self.venue_manager.route(&order.venue, order.operation)?;
        let started = Instant::now();
        let mut attempt: usize = 0;

        let handshake = loop {
            let handshake = interface.execute(order).map_err(EngineError::from)?;
            if handshake.is_executed() {
                break handshake;
            }
            self.give_up_or_retry(
                order,
                started,
                &mut attempt,
                EngineError::SystemFailure {
                    reason: format!(
                        "venue '{}' reported execution failure: {}",
                        order.venue,
                        handshake.error_message.clone().unwrap_or_default()
                    ),
                },
            )
            .await?;
        };

        // Apply the handshake's deltas exactly once: re-running this on every reconciliation
        // retry would double-count the trade against the simulated map.
        let deltas = crate::position_update_handler::PositionUpdateHandler::deltas_from_handshake(&handshake);
        monitor.apply_execution_deltas(t, &deltas)?;

        let keys: Vec<PositionKey> = handshake
            .position_deltas
            .keys()
            .map(|raw_key| resolve_key(order, raw_key))
            .collect();

        loop {
            let real_positions = interface.query_positions(&keys).map_err(EngineError::from)?;
            let simulated = monitor.current().simulated;
            let outcome = self.handler.compare(&deltas, &simulated, &real_positions);
            if outcome.success {
                return Ok(handshake);
            }

            self.give_up_or_retry(
                order,
                started,
                &mut attempt,
                EngineError::ReconciliationMismatch {
                    at: t,
                    mismatches: outcome.mismatches.len(),
                },
            )
            .await?;
        }
    }

    /// Backtest: return the error immediately, promoted to `SystemFailure`. Live: sleep the next
    /// backoff interval and retry unless the hard timeout has elapsed or [`MAX_RETRIES`] has been
    /// exhausted, in which case the error is promoted to `SystemFailure`.
    async fn give_up_or_retry(
        &self,
        order: &Order,
        started: Instant,
        attempt: &mut usize,
        error: EngineError,
    ) -> Result<(), EngineError> {
        if self.is_backtest {
            return Err(error.into_system_failure());
        }

        if started.elapsed().as_secs() >= RECONCILE_TIMEOUT_SECONDS {
            error!(venue = %order.venue, "ExecutionManager: reconciliation timed out, SystemFailure");
            return Err(error.into_system_failure());
        }

        if *attempt >= MAX_RETRIES {
            error!(venue = %order.venue, attempt, "ExecutionManager: retries exhausted, SystemFailure");
            return Err(error.into_system_failure());
        }

        let delay = BACKOFF_SCHEDULE_SECONDS[*attempt % BACKOFF_SCHEDULE_SECONDS.len()];
        *attempt += 1;
        warn!(venue = %order.venue, attempt, delay, "ExecutionManager: retrying after reconciliation failure");
        tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
        Ok(())
    }
}
