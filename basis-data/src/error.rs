use basis_instrument::Timestamp;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// All failures the `DataProvider` abstraction can report.
///
/// Per spec.md §7: `DataUnavailable`/`DataStale` are fatal in backtest; in live the caller skips
/// the tick and WARNs, escalating to CRITICAL only if the condition persists beyond a configured
/// threshold. `Configuration` is always fatal at startup/request construction.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum DataError {
    #[error("data kind '{kind}' is not supplied by this DataProvider configuration")]
    DataUnavailable { kind: SmolStr },

    #[error("data kind '{kind}' sample is stale: age {age_seconds}s exceeds max_data_age_seconds")]
    DataStale { kind: SmolStr, age_seconds: i64 },

    #[error("required data kind '{kind}' has no observation at or before {at}")]
    NoObservationAtOrBefore { kind: SmolStr, at: Timestamp },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("timestamps() is only supported by backtest DataProviders")]
    TimestampsUnsupported,

    #[error("csv source error for kind '{kind}': {message}")]
    CsvSource { kind: SmolStr, message: String },
}
