use crate::{
    config::{EnvironmentConfig, ExecutionMode, ModeConfig},
    engine::Engine,
    error::EngineError,
    event_logger::EventLogger,
    execution_manager::ExecutionManager,
    pnl::PnLCalculator,
    position_monitor::PositionMonitor,
    position_update_handler::PositionUpdateHandler,
    request::Request,
    results_store::ResultsStore,
    settlement::SettlementCalculator,
};
use basis_data::provider::DataProviderFactory;
use basis_execution::{backtest::SimulatedVenue, manager::VenueInterfaceManager};
use basis_instrument::{
    delta::{Delta, DeltaSource},
    order::Operation,
    position::{PositionKey, PositionType},
    venue::VenueId,
    Timestamp,
};
use basis_risk::{exposure::ExposureMonitor, risk::RiskMonitor};
use basis_strategy::build_strategy_manager;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::{collections::HashSet, sync::Arc};

const ONCHAIN_OPERATIONS: [Operation; 7] = [
    Operation::Supply,
    Operation::Withdraw,
    Operation::Borrow,
    Operation::Repay,
    Operation::Stake,
    Operation::Unstake,
    Operation::FlashAtomic,
];
const HEDGE_OPERATIONS: [Operation; 2] = [Operation::SpotTrade, Operation::PerpTrade];
const FEE_RATE_BPS: u32 = 5;

/// Every `PositionKey` this request's positions are allowed to touch. Derived from the mode's
/// configured venues (`onchain_venue`, `hedge_venues`) crossed with every `PositionType`, for the
/// mode's asset and share-class symbols — a conservative superset rather than an exact
/// per-strategy enumeration, since a mode's full symbol universe is otherwise only known once its
/// orders are generated.
fn position_subscriptions(mode_config: &ModeConfig) -> HashSet<PositionKey> {
    let strategy = &mode_config.component_config.strategy_manager;
    let mut venues = vec![VenueId::from(strategy.onchain_venue.as_str())];
    venues.extend(strategy.hedge_venues.iter().map(|v| VenueId::from(v.as_str())));

    let mut symbols = vec![mode_config.asset.clone()];
    if let Some(lst) = &mode_config.lst_type {
        symbols.push(lst.clone());
    }
    symbols.push(format!("{:?}", mode_config.share_class));

    let position_types = [
        PositionType::BaseToken,
        PositionType::AToken,
        PositionType::DebtToken,
        PositionType::Spot,
        PositionType::Perp,
    ];

    venues
        .iter()
        .flat_map(|venue| {
            position_types.iter().flat_map(move |position_type| {
                symbols
                    .iter()
                    .map(move |symbol| PositionKey::new(venue.clone(), *position_type, symbol.as_str()))
            })
        })
        .collect()
}

/// Build a fully wired [`Engine`] for a backtest request: a [`SimulatedVenue`] per configured
/// venue sharing one [`basis_data::backtest::CsvDataProvider`], seeded with `request`'s initial
/// capital.
pub fn build_backtest_engine(
    request: &Request,
    mode_config: &ModeConfig,
    env: &EnvironmentConfig,
    run_id: &str,
) -> Result<Engine, EngineError> {
    request.validate_for_backtest()?;
    if !matches!(env.execution_mode, ExecutionMode::Backtest) {
        return Err(EngineError::Configuration(
            "build_backtest_engine called outside BASIS_EXECUTION_MODE=backtest".into(),
        ));
    }

    let data_provider: Arc<dyn basis_data::DataProvider> = DataProviderFactory::Backtest {
        data_dir: env.data_dir.clone(),
    }
    .build(&mode_config.data_requirements)?
    .into();

    let initial_t = request.start_date.unwrap_or_else(|| Timestamp::from_timestamp(0, 0).unwrap());

    let strategy = &mode_config.component_config.strategy_manager;
    let mut venue_manager = VenueInterfaceManager::new();

    let onchain_venue = VenueId::from(strategy.onchain_venue.as_str());
    let onchain_interface = Arc::new(SimulatedVenue::new(
        onchain_venue.clone(),
        data_provider.clone(),
        Decimal::new(FEE_RATE_BPS as i64, 4),
        initial_t,
    ));
    venue_manager.register(onchain_interface, &ONCHAIN_OPERATIONS);

    let hedge_venues: Vec<VenueId> = strategy.hedge_venues.iter().map(|v| VenueId::from(v.as_str())).collect();
    for hedge_venue in &hedge_venues {
        let interface = Arc::new(SimulatedVenue::new(
            hedge_venue.clone(),
            data_provider.clone(),
            Decimal::new(FEE_RATE_BPS as i64, 4),
            initial_t,
        ));
        venue_manager.register(interface, &HEDGE_OPERATIONS);
    }

    let subscriptions = position_subscriptions(mode_config);
    let position_monitor = Arc::new(PositionMonitor::new(subscriptions, HashSet::new()));

    let initial_capital_key = PositionKey::new(
        onchain_venue.clone(),
        PositionType::BaseToken,
        mode_config.asset.as_str(),
    );
    position_monitor.seed(
        &[Delta::new(
            initial_capital_key,
            request.initial_capital,
            DeltaSource::Initial,
        )],
        true,
    )?;

    let exposure_monitor = Arc::new(ExposureMonitor::new(
        mode_config.tracked_assets()?,
        mode_config.share_class,
        true,
    ));
    let risk_monitor = Arc::new(RiskMonitor::new(mode_config.risk_type_configs()));

    let strategy_manager = build_strategy_manager(mode_config.mode, SmolStr::new(mode_config.asset.as_str()));
    let strategy_config = strategy.to_strategy_config();

    let handler = Arc::new(PositionUpdateHandler::new(
        mode_config.component_config.pnl_calculator.reconciliation_tolerance,
    ));
    let execution_manager = ExecutionManager::new(Arc::new(venue_manager), handler, true);

    let pnl_calculator = Arc::new(PnLCalculator::new(
        mode_config
            .component_config
            .pnl_calculator
            .attribution_types
            .iter()
            .map(|s| SmolStr::new(s.as_str()))
            .collect(),
        mode_config.component_config.pnl_calculator.reconciliation_tolerance,
    ));

    let settlement_calculator = Arc::new(SettlementCalculator::new(
        SmolStr::new(mode_config.asset.as_str()),
        mode_config.lst_type.as_ref().map(|lst| SmolStr::new(lst.as_str())),
        onchain_venue,
        hedge_venues,
        mode_config.lending_enabled,
        mode_config.staking_enabled,
        mode_config.borrowing_enabled,
        mode_config.basis_trade_enabled,
    ));

    let request_dir = env.results_dir.join(run_id);
    std::fs::create_dir_all(&request_dir)
        .map_err(|e| EngineError::Internal(format!("creating results dir: {e}")))?;
    let event_logger = EventLogger::spawn(request_dir.join("events.jsonl"));
    let results_store = ResultsStore::spawn(request_dir)
        .map_err(|e| EngineError::Internal(format!("opening results store: {e}")))?;

    Ok(Engine::new(
        mode_config.clone(),
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
        true,
    ))
}

/// Backtest timestamps for `request`, resolved from its `start_date`/`end_date` against the
/// already-constructed `Engine`'s `DataProvider`.
pub fn resolve_backtest_timestamps(
    request: &Request,
    data_provider: &dyn basis_data::DataProvider,
) -> Result<Vec<Timestamp>, EngineError> {
    let start = request
        .start_date
        .ok_or_else(|| EngineError::Configuration("start_date required for backtest".into()))?;
    let end = request
        .end_date
        .ok_or_else(|| EngineError::Configuration("end_date required for backtest".into()))?;
    Ok(data_provider.timestamps(start, end)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis_instrument::ShareClass;

    #[test]
    fn position_subscriptions_cover_onchain_and_hedge_venues() {
        let mut mode_config = sample_mode_config();
        mode_config.component_config.strategy_manager.hedge_venues = vec!["binance".into()];
        mode_config.component_config.strategy_manager.hedge_allocation = vec![Decimal::ONE];
        let subs = position_subscriptions(&mode_config);
        assert!(subs
            .iter()
            .any(|key| key.venue == VenueId::from("aave") && key.position_type == PositionType::AToken));
        assert!(subs
            .iter()
            .any(|key| key.venue == VenueId::from("binance") && key.position_type == PositionType::Perp));
    }

    fn sample_mode_config() -> ModeConfig {
        let yaml = r#"
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
"#;
        let config = ModeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.share_class, ShareClass::Usdt);
        config
    }
}
