use crate::{
    error::DataError,
    snapshot::{MarketDataValue, MarketSnapshot, Observation},
};
use basis_instrument::Timestamp;
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::collections::HashMap;

/// Live `DataProvider`: serves the most recently cached sample per data kind, refreshed
/// out-of-band (venue pollers write into the cache via [`ApiDataProvider::publish`]). `get(T)`
/// compares the cached sample's age against `T` and fails with [`DataError::DataStale`] if it
/// exceeds `max_data_age_seconds`.
#[derive(Debug)]
pub struct ApiDataProvider {
    cache: RwLock<HashMap<SmolStr, Observation>>,
    max_data_age_seconds: i64,
    required_kinds: Vec<SmolStr>,
}

impl ApiDataProvider {
    pub fn new(required_kinds: Vec<String>, max_data_age_seconds: i64) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_data_age_seconds,
            required_kinds: required_kinds.into_iter().map(SmolStr::new).collect(),
        }
    }

    /// Overwrite the cached sample for `kind`. Called by venue pollers as fresh data arrives;
    /// never called from within [`DataProvider::get`] itself (invariant: `get` never performs
    /// I/O, spec.md §4.2).
    pub fn publish(&self, kind: &str, value: MarketDataValue, observed_at: Timestamp) {
        self.cache.write().insert(
            SmolStr::new(kind),
            Observation { value, observed_at },
        );
    }
}

impl crate::provider::DataProvider for ApiDataProvider {
    fn get(&self, t: Timestamp) -> Result<MarketSnapshot, DataError> {
        let cache = self.cache.read();
        let mut snapshot = MarketSnapshot::new(t);

        for kind in &self.required_kinds {
            let obs = cache
                .get(kind)
                .ok_or_else(|| DataError::DataUnavailable { kind: kind.clone() })?;

            let age_seconds = (t - obs.observed_at).num_seconds();
            if age_seconds > self.max_data_age_seconds {
                return Err(DataError::DataStale {
                    kind: kind.clone(),
                    age_seconds,
                });
            }

            snapshot.data.insert(kind.clone(), obs.clone());
        }

        Ok(snapshot)
    }

    fn validate_requirements(&self, required_kinds: &[String]) -> Result<(), DataError> {
        for kind in required_kinds {
            if !self.required_kinds.iter().any(|k| k.as_str() == kind) {
                return Err(DataError::Configuration(format!(
                    "live provider not configured to supply data kind '{kind}'"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::DataProvider as _;
    use rust_decimal_macros::dec;

    fn ts(seconds: i64) -> Timestamp {
        chrono::DateTime::from_timestamp(seconds, 0).unwrap()
    }

    #[test]
    fn fresh_sample_is_served() {
        let provider = ApiDataProvider::new(vec!["spot_price.BTCUSDT".to_string()], 30);
        provider.publish("spot_price.BTCUSDT", MarketDataValue::SpotPrice(dec!(50000)), ts(100));

        let snapshot = provider.get(ts(110)).unwrap();
        assert_eq!(snapshot.decimal("spot_price.BTCUSDT"), Some(dec!(50000)));
    }

    #[test]
    fn stale_sample_is_rejected() {
        let provider = ApiDataProvider::new(vec!["spot_price.BTCUSDT".to_string()], 30);
        provider.publish("spot_price.BTCUSDT", MarketDataValue::SpotPrice(dec!(50000)), ts(100));

        let err = provider.get(ts(200)).unwrap_err();
        assert!(matches!(err, DataError::DataStale { .. }));
    }

    #[test]
    fn missing_sample_is_unavailable() {
        let provider = ApiDataProvider::new(vec!["spot_price.BTCUSDT".to_string()], 30);
        assert!(provider.get(ts(100)).is_err());
    }
}
