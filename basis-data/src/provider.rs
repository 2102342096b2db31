use crate::{error::DataError, snapshot::MarketSnapshot};
use basis_instrument::Timestamp;

/// Execution mode, mirrored from `BASIS_EXECUTION_MODE` (spec.md §6). Picks the concrete
/// `DataProvider` implementation at construction time via [`DataProviderFactory`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ExecutionMode {
    Backtest,
    Live,
}

/// Returns the market/protocol snapshot valid at a given timestamp, with no forward bias.
///
/// Implementations are constructed fresh per request (spec.md §3 Lifecycle) and never share
/// in-memory state across requests.
pub trait DataProvider: Send + Sync {
    /// Return data with observed timestamp `<= t`. Fails with
    /// [`DataError::DataUnavailable`]/[`DataError::DataStale`] if required data cannot be
    /// supplied.
    fn get(&self, t: Timestamp) -> Result<MarketSnapshot, DataError>;

    /// Sorted, unique timestamps in `[start, end]` for which every required data kind has at
    /// least one observation `<=` each element. Backtest only.
    fn timestamps(&self, start: Timestamp, end: Timestamp) -> Result<Vec<Timestamp>, DataError> {
        let _ = (start, end);
        Err(DataError::TimestampsUnsupported)
    }

    /// Fail fast if any `required_kinds` entry is unsupplied by this provider's configuration.
    fn validate_requirements(&self, required_kinds: &[String]) -> Result<(), DataError>;
}

/// Constructs the concrete [`DataProvider`] for a request, by [`ExecutionMode`]. Each request
/// gets a freshly constructed provider (spec.md §3 Lifecycle); providers are never reused or
/// shared across requests.
#[derive(Debug, Clone)]
pub enum DataProviderFactory {
    Backtest {
        data_dir: std::path::PathBuf,
    },
    Live {
        max_data_age_seconds: i64,
    },
}

impl DataProviderFactory {
    pub fn build(
        &self,
        required_kinds: &[String],
    ) -> Result<Box<dyn DataProvider>, DataError> {
        let provider: Box<dyn DataProvider> = match self {
            DataProviderFactory::Backtest { data_dir } => Box::new(
                crate::backtest::CsvDataProvider::load(data_dir, required_kinds)?,
            ),
            DataProviderFactory::Live {
                max_data_age_seconds,
            } => Box::new(crate::live::ApiDataProvider::new(
                required_kinds.to_vec(),
                *max_data_age_seconds,
            )),
        };
        provider.validate_requirements(required_kinds)?;
        Ok(provider)
    }
}
