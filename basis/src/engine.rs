use crate::{
    config::ModeConfig,
    error::EngineError,
    event_logger::EventLogger,
    execution_manager::ExecutionManager,
    pnl::PnLCalculator,
    position_monitor::PositionMonitor,
    results_store::{ResultRow, ResultsStore, Summary},
    settlement::SettlementCalculator,
};
use basis_data::DataProvider;
use basis_instrument::{
    event::{Event, EventType},
    risk::RiskStatus,
    Timestamp,
};
use basis_risk::{risk::RiskInputs, ExposureMonitor, RiskMonitor};
use basis_strategy::{StrategyConfig, StrategyContext, StrategyManager};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::{collections::HashMap, sync::Arc};
use tracing::{error, info, warn};

/// Owns the current-`T` clock and orchestrates one request's full loop (spec.md §4.1): on every
/// `T`, refresh positions, compute exposure and risk, ask the strategy for orders, execute and
/// reconcile them (tight loop, delegated to `ExecutionManager`), update P&L, then persist.
///
/// A single `Engine` instance is scoped to one request's lifetime (spec.md §3 Lifecycle) — it is
/// never reused across requests.
pub struct Engine {
    mode_config: ModeConfig,
    data_provider: Arc<dyn DataProvider>,
    position_monitor: Arc<PositionMonitor>,
    exposure_monitor: Arc<ExposureMonitor>,
    risk_monitor: Arc<RiskMonitor>,
    strategy_manager: Box<dyn StrategyManager>,
    strategy_config: StrategyConfig,
    execution_manager: ExecutionManager,
    pnl_calculator: Arc<PnLCalculator>,
    settlement_calculator: Arc<SettlementCalculator>,
    event_logger: EventLogger,
    results_store: ResultsStore,
    is_backtest: bool,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode_config: ModeConfig,
        data_provider: Arc<dyn DataProvider>,
        position_monitor: Arc<PositionMonitor>,
        exposure_monitor: Arc<ExposureMonitor>,
        risk_monitor: Arc<RiskMonitor>,
        strategy_manager: Box<dyn StrategyManager>,
        strategy_config: StrategyConfig,
        execution_manager: ExecutionManager,
        pnl_calculator: Arc<PnLCalculator>,
        settlement_calculator: Arc<SettlementCalculator>,
        event_logger: EventLogger,
        results_store: ResultsStore,
        is_backtest: bool,
    ) -> Self {
        Self {
            mode_config,
            data_provider,
            position_monitor,
            exposure_monitor,
            risk_monitor,
            strategy_manager,
            strategy_config,
            execution_manager,
            pnl_calculator,
            settlement_calculator,
            event_logger,
            results_store,
            is_backtest,
        }
    }

    /// Drive every timestamp in `timestamps` (already resolved from the request's
    /// `start_date`/`end_date` via `DataProvider::timestamps`) through one full-loop pass each.
    /// Backtest failure model: any `EngineError` aborts the run immediately (spec.md §7 "Backtest
    /// that fails mid-run still produces a partial results.csv"); the partial `results.csv` and
    /// an error-carrying `summary.json` are still written before returning.
    pub async fn run_backtest(&self, timestamps: &[Timestamp]) -> Result<Summary, EngineError> {
        let start = std::time::Instant::now();
        let mut last_equity = Decimal::ZERO;
        let mut first_equity = None;

        for &t in timestamps {
            match self.step(t).await {
                Ok(equity) => {
                    last_equity = equity;
                    first_equity.get_or_insert(equity);
                }
                Err(e) => {
                    error!(error = %e, "Engine: backtest aborted");
                    let summary = self.partial_summary(start.elapsed(), Some(e.to_string()));
                    self.results_store.finalize(summary.clone());
                    return Err(e);
                }
            }
        }

        let total_return = match first_equity {
            Some(first) if !first.is_zero() => (last_equity - first) / first,
            _ => Decimal::ZERO,
        };
        let summary = Summary {
            total_return,
            annualized_return: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            sharpe_ratio: Decimal::ZERO,
            attribution_breakdown: HashMap::new(),
            min_risk_value: None,
            max_risk_value: None,
            execution_time_seconds: Decimal::from(start.elapsed().as_secs()),
            error: None,
        };
        self.results_store.finalize(summary.clone());
        Ok(summary)
    }

    /// Run a single live tick at `t`. Unlike backtest, a non-`SystemFailure` error is logged and
    /// the tick is skipped rather than aborting the process (spec.md §7 "live: log-and-continue").
    /// A `SystemFailure` is always propagated so the caller can exit with
    /// [`crate::error::SYSTEM_FAILURE_EXIT_CODE`].
    pub async fn run_live_tick(&self, t: Timestamp) -> Result<(), EngineError> {
        match self.step(t).await {
            Ok(_) => Ok(()),
            Err(e @ EngineError::SystemFailure { .. }) => Err(e),
            Err(e) if e.is_always_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, %t, "Engine: live tick failed, continuing");
                Ok(())
            }
        }
    }

    /// One full-loop pass for a single `T` (spec.md §4.1). Returns the resulting equity in
    /// share-class units.
    async fn step(&self, t: Timestamp) -> Result<Decimal, EngineError> {
        self.execution_manager.advance_to(t);

        let snapshot = self.position_monitor.current();
        let positions = if self.is_backtest {
            snapshot.simulated
        } else {
            snapshot.real
        };

        let market = self.market_data_as_decimals(t)?;
        let exposure = self.exposure_monitor.compute(&positions, &market)?;

        let risk_inputs = self.risk_inputs_from(&exposure, &market);
        let risk = self.risk_monitor.assess(&risk_inputs)?;
        if risk.is_critical() {
            self.event_logger.log(
                Event::new(t, EventType::RiskThresholdBreached).with_status(SmolStr::new("Critical")),
            );
        }

        let ctx = StrategyContext {
            exposure: exposure.clone(),
            risk: risk.clone(),
            positions: positions.clone(),
            equity: exposure.total_value_share_class,
            pending_deposit_withdrawal: None,
            risk_override_active: matches!(risk.overall_status, RiskStatus::Critical),
        };

        let orders = self.strategy_manager.rebalance(&ctx, &self.strategy_config);
        if !orders.is_empty() {
            let handshakes = self
                .execution_manager
                .process(t, &self.position_monitor, &orders)
                .await?;
            for handshake in &handshakes {
                self.event_logger.log(
                    Event::new(t, EventType::TradeExecuted)
                        .with_venue(handshake.order.venue.clone())
                        .with_status(SmolStr::new(format!("{:?}", handshake.status))),
                );
            }
        }

        // Settlement always runs, whether or not this tick emitted orders, and strictly after
        // execution deltas per the ordering invariant on `PositionMonitor::apply_settlements`.
        let post_execution = self.position_monitor.current().simulated;
        let settlement = self.settlement_calculator.compute(t, &post_execution, &market);
        self.position_monitor.apply_settlements(&settlement.deltas, self.is_backtest)?;

        if !self.is_backtest {
            let keys: Vec<_> = self.position_monitor.subscriptions().iter().cloned().collect();
            let queried = self.execution_manager.query_all_positions(&keys)?;
            self.position_monitor.refresh_from_venues(queried);
        }

        let post_exposure = self
            .exposure_monitor
            .compute(&self.position_monitor.current().simulated, &market)?;
        let pnl = self.pnl_calculator.update(
            post_exposure.total_value_share_class,
            Decimal::ZERO,
            &settlement.attribution,
        )?;

        self.results_store.append(ResultRow {
            timestamp: t,
            equity_share_class: post_exposure.total_value_share_class,
            balance_pnl_period: pnl.balance_based_pnl_period,
            balance_pnl_cumulative: pnl.balance_based_pnl_cumulative,
            attribution_total_cumulative: pnl.attribution_total_cumulative,
            reconciliation_diff: pnl.reconciliation.difference,
            overall_risk_status: SmolStr::new(format!("{:?}", risk.overall_status)),
            net_delta: post_exposure.net_delta,
        });

        Ok(post_exposure.total_value_share_class)
    }

    fn market_data_as_decimals(&self, t: Timestamp) -> Result<HashMap<SmolStr, Decimal>, EngineError> {
        let snapshot = self.data_provider.get(t)?;
        Ok(snapshot
            .data
            .iter()
            .filter_map(|(kind, obs)| obs.value.as_decimal().map(|v| (kind.clone(), v)))
            .collect())
    }

    /// Map the configured enabled risk types' raw inputs out of `exposure`/`market`. Only a
    /// best-effort mapping: a mode that enables a risk type this engine cannot derive inputs for
    /// from `Exposure` alone simply leaves those fields `None`, and `RiskMonitor::assess` skips
    /// that type for the tick (spec.md §4.6).
    fn risk_inputs_from(
        &self,
        exposure: &basis_instrument::exposure::Exposure,
        market: &HashMap<SmolStr, Decimal>,
    ) -> RiskInputs {
        RiskInputs {
            net_delta: Some(exposure.net_delta),
            target_exposure: Some(exposure.total_value_share_class),
            available_reserve: market.get("reserve.available").copied(),
            total_equity: Some(exposure.total_value_share_class),
            ..Default::default()
        }
    }

    fn partial_summary(&self, elapsed: std::time::Duration, error: Option<String>) -> Summary {
        Summary {
            total_return: Decimal::ZERO,
            annualized_return: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            sharpe_ratio: Decimal::ZERO,
            attribution_breakdown: HashMap::new(),
            min_risk_value: None,
            max_risk_value: None,
            execution_time_seconds: Decimal::from(elapsed.as_secs()),
            error,
        }
    }

    pub async fn close(self) {
        self.event_logger.close().await;
        self.results_store.close().await;
    }

    pub fn mode_config(&self) -> &ModeConfig {
        &self.mode_config
    }
}
