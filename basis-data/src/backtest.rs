use crate::{
    error::DataError,
    snapshot::{MarketDataValue, MarketSnapshot, Observation},
};
use basis_instrument::Timestamp;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::{collections::HashMap, path::Path, str::FromStr};

/// Per-kind table of `(observed_at, value)` pairs, sorted ascending by timestamp. `get` performs
/// a `search <= t` (last-observation-carried-forward).
#[derive(Debug, Clone)]
struct KindTable {
    rows: Vec<(Timestamp, MarketDataValue)>,
}

impl KindTable {
    fn at_or_before(&self, t: Timestamp) -> Option<&(Timestamp, MarketDataValue)> {
        match self.rows.binary_search_by(|(ts, _)| ts.cmp(&t)) {
            Ok(idx) => Some(&self.rows[idx]),
            Err(0) => None,
            Err(idx) => Some(&self.rows[idx - 1]),
        }
    }
}

/// Infer the [`MarketDataValue`] family from a data kind's configured name, following the
/// `<family>.<rest>` naming convention used in `data_requirements` (eg/
/// `spot_price.BTCUSDT`, `oracle_price.ETHUSD`, `funding_rate.binance.BTCUSDT`,
/// `protocol_index.aave.supply.WETH`, `gas_price`, `lst_distribution.weETH`).
fn parse_typed_value(kind: &str, raw: &str) -> Result<MarketDataValue, DataError> {
    let family = kind.split('.').next().unwrap_or(kind);
    match family {
        "spot_price" => Ok(MarketDataValue::SpotPrice(parse_decimal(kind, raw)?)),
        "oracle_price" => Ok(MarketDataValue::OraclePrice(parse_decimal(kind, raw)?)),
        "funding_rate" => Ok(MarketDataValue::FundingRate(parse_decimal(kind, raw)?)),
        "protocol_index" => Ok(MarketDataValue::ProtocolIndex(parse_decimal(kind, raw)?)),
        "gas_price" => Ok(MarketDataValue::GasPrice(parse_decimal(kind, raw)?)),
        "lst_distribution" => serde_json::from_str(raw)
            .map(MarketDataValue::LstDistributionEvent)
            .map_err(|e| DataError::CsvSource {
                kind: SmolStr::new(kind),
                message: e.to_string(),
            }),
        other => Err(DataError::Configuration(format!(
            "unrecognised data kind family '{other}' for kind '{kind}'"
        ))),
    }
}

fn parse_decimal(kind: &str, raw: &str) -> Result<Decimal, DataError> {
    Decimal::from_str(raw).map_err(|e| DataError::CsvSource {
        kind: SmolStr::new(kind),
        message: e.to_string(),
    })
}

/// Backtest `DataProvider`: loads one CSV file per required data kind into an in-memory sorted
/// table, and answers `get(T)` purely from those tables. `get(T)` for a fixed `T` is
/// deterministic (invariant P3) because the tables never change after construction.
#[derive(Debug, Clone)]
pub struct CsvDataProvider {
    tables: HashMap<SmolStr, KindTable>,
}

impl CsvDataProvider {
    /// Load a CSV file per kind in `required_kinds` from `data_dir/<kind>.csv`. Each file is a
    /// two-column `timestamp,value` CSV (header row required), where `value` is parsed according
    /// to the kind's family (see [`parse_typed_value`]), except `lst_distribution.*` kinds whose
    /// `value` column holds a JSON payload.
    pub fn load(data_dir: &Path, required_kinds: &[String]) -> Result<Self, DataError> {
        let mut tables = HashMap::with_capacity(required_kinds.len());

        for kind in required_kinds {
            let path = data_dir.join(format!("{kind}.csv"));
            let mut reader = csv::Reader::from_path(&path).map_err(|e| DataError::CsvSource {
                kind: SmolStr::new(kind.as_str()),
                message: format!("{path:?}: {e}"),
            })?;

            let mut rows = Vec::new();
            for record in reader.records() {
                let record = record.map_err(|e| DataError::CsvSource {
                    kind: SmolStr::new(kind.as_str()),
                    message: e.to_string(),
                })?;
                let ts_raw = record.get(0).ok_or_else(|| DataError::CsvSource {
                    kind: SmolStr::new(kind.as_str()),
                    message: "missing timestamp column".into(),
                })?;
                let value_raw = record.get(1).ok_or_else(|| DataError::CsvSource {
                    kind: SmolStr::new(kind.as_str()),
                    message: "missing value column".into(),
                })?;

                let ts: Timestamp = ts_raw.parse().map_err(|e| DataError::CsvSource {
                    kind: SmolStr::new(kind.as_str()),
                    message: format!("bad timestamp '{ts_raw}': {e}"),
                })?;
                let value = parse_typed_value(kind, value_raw)?;
                rows.push((ts, value));
            }
            rows.sort_by_key(|(ts, _)| *ts);

            tables.insert(SmolStr::new(kind.as_str()), KindTable { rows });
        }

        Ok(Self { tables })
    }

    /// Construct directly from already-loaded rows, primarily for tests that do not want to
    /// round-trip through the filesystem.
    pub fn from_rows(rows: HashMap<String, Vec<(Timestamp, MarketDataValue)>>) -> Self {
        let tables = rows
            .into_iter()
            .map(|(kind, mut rows)| {
                rows.sort_by_key(|(ts, _)| *ts);
                (SmolStr::new(kind), KindTable { rows })
            })
            .collect();
        Self { tables }
    }
}

impl crate::provider::DataProvider for CsvDataProvider {
    fn get(&self, t: Timestamp) -> Result<MarketSnapshot, DataError> {
        let mut snapshot = MarketSnapshot::new(t);

        for (kind, table) in &self.tables {
            let (observed_at, value) =
                table
                    .at_or_before(t)
                    .ok_or_else(|| DataError::NoObservationAtOrBefore {
                        kind: kind.clone(),
                        at: t,
                    })?;

            snapshot.data.insert(
                kind.clone(),
                Observation {
                    value: value.clone(),
                    observed_at: *observed_at,
                },
            );
        }

        Ok(snapshot)
    }

    fn timestamps(&self, start: Timestamp, end: Timestamp) -> Result<Vec<Timestamp>, DataError> {
        use crate::provider::DataProvider;

        let mut candidates: Vec<Timestamp> = self
            .tables
            .values()
            .flat_map(|table| table.rows.iter().map(|(ts, _)| *ts))
            .filter(|ts| *ts >= start && *ts <= end)
            .collect();
        candidates.sort();
        candidates.dedup();

        Ok(candidates
            .into_iter()
            .filter(|ts| self.get(*ts).is_ok())
            .collect())
    }

    fn validate_requirements(&self, required_kinds: &[String]) -> Result<(), DataError> {
        for kind in required_kinds {
            if !self.tables.contains_key(kind.as_str()) {
                return Err(DataError::DataUnavailable {
                    kind: SmolStr::new(kind.as_str()),
                });
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

    fn provider() -> CsvDataProvider {
        let mut rows = HashMap::new();
        rows.insert(
            "spot_price.BTCUSDT".to_string(),
            vec![
                (ts(100), MarketDataValue::SpotPrice(dec!(50000))),
                (ts(200), MarketDataValue::SpotPrice(dec!(51000))),
            ],
        );
        CsvDataProvider::from_rows(rows)
    }

    #[test]
    fn get_carries_forward_last_observation() {
        let provider = provider();
        let snapshot = provider.get(ts(150)).unwrap();
        assert_eq!(
            snapshot.decimal("spot_price.BTCUSDT"),
            Some(dec!(50000))
        );
        assert!(snapshot.respects_no_forward_bias());
    }

    #[test]
    fn get_is_deterministic_for_fixed_t() {
        let provider = provider();
        let a = provider.get(ts(250)).unwrap();
        let b = provider.get(ts(250)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn get_before_first_observation_is_unavailable() {
        let provider = provider();
        assert!(provider.get(ts(50)).is_err());
    }

    #[test]
    fn missing_required_kind_fails_validation() {
        let provider = provider();
        let err = provider
            .validate_requirements(&["oracle_price.ETHUSD".to_string()])
            .unwrap_err();
        assert!(matches!(err, DataError::DataUnavailable { .. }));
    }
}
