use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Identifies a venue (CEX, lending protocol, staking protocol, chain) by its configured name.
///
/// Kept as an interned string rather than a closed enum: new venues are added purely through
/// mode config (`strategy_manager.hedge_venues`, etc.), never through a code change, so a
/// closed union would force a release for every new venue onboarded.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[display("{_0}")]
pub struct VenueId(pub SmolStr);

impl VenueId {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }
}

impl From<&str> for VenueId {
    fn from(value: &str) -> Self {
        Self(SmolStr::new(value))
    }
}
