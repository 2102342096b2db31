use basis_instrument::venue::VenueId;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// All failures the `VenueInterface`/`VenueInterfaceManager` abstraction can report.
///
/// Per spec.md §7: `VenueExecutionFailed` is fatal in backtest, retried per §4.10.1 in live.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
pub enum ExecutionError {
    #[error("no VenueInterface configured for venue '{venue}' operation '{operation}'")]
    NoVenueConfigured { venue: VenueId, operation: SmolStr },

    #[error("venue '{venue}' execution failed: {message}")]
    VenueExecutionFailed { venue: VenueId, message: String },

    #[error("venue '{venue}' position query failed: {message}")]
    PositionQueryFailed { venue: VenueId, message: String },

    #[error("venue '{venue}' market query failed: {message}")]
    MarketQueryFailed { venue: VenueId, message: String },
}
