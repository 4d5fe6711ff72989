//! Records flowing through the pipeline, from raw source tuples to the rows
//! handed to a domain table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value as delivered by a source: numeric, textual, or absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

/// Outcome of coercing a raw value to a float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coerced {
    Value(f64),
    Missing,
    Malformed,
}

impl RawValue {
    pub fn coerce(value: Option<&RawValue>) -> Coerced {
        match value {
            None => Coerced::Missing,
            Some(RawValue::Number(v)) if v.is_finite() => Coerced::Value(*v),
            Some(RawValue::Number(_)) => Coerced::Malformed,
            Some(RawValue::Text(s)) => {
                let s = s.trim();
                if s.is_empty() {
                    return Coerced::Missing;
                }
                match s.parse::<f64>() {
                    Ok(v) if v.is_finite() => Coerced::Value(v),
                    _ => Coerced::Malformed,
                }
            }
        }
    }
}

/// One long-format observation as produced by a source fetcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    /// ISO2 or ISO3.
    pub country_code: String,
    pub year: i32,
    #[serde(default)]
    pub quarter: Option<u8>,
    pub indicator_source_code: String,
    pub value: Option<RawValue>,
    pub source_name: String,
}

impl RawObservation {
    pub fn new(
        country_code: &str,
        year: i32,
        indicator_source_code: &str,
        value: impl Into<RawValue>,
        source_name: &str,
    ) -> Self {
        Self {
            country_code: country_code.to_string(),
            year,
            quarter: None,
            indicator_source_code: indicator_source_code.to_string(),
            value: Some(value.into()),
            source_name: source_name.to_string(),
        }
    }
}

/// Grouping key of a widened row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SeriesKey {
    pub country_code: String,
    pub year: i32,
    pub quarter: Option<u8>,
    pub source: String,
}

/// A canonical column value and the source indicator it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CellValue {
    pub value: Option<f64>,
    pub indicator_code: String,
}

/// One wide row per (country, year, quarter, source).
///
/// Source columns carry the indicator that produced them; derived columns
/// are keyed by name and inherit the indicator of their base column when
/// routed.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedObservation {
    pub key: SeriesKey,
    pub cells: BTreeMap<&'static str, CellValue>,
    pub derived: BTreeMap<&'static str, Option<f64>>,
}

impl NormalizedObservation {
    pub fn new(key: SeriesKey) -> Self {
        Self {
            key,
            cells: BTreeMap::new(),
            derived: BTreeMap::new(),
        }
    }

    /// Value of a source or derived column.
    pub fn get(&self, column: &str) -> Option<f64> {
        self.cells
            .get(column)
            .and_then(|c| c.value)
            .or_else(|| self.derived.get(column).copied().flatten())
    }
}

/// Row destined for a single domain table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainRow {
    pub country_code: String,
    pub year: i32,
    pub quarter: Option<u8>,
    pub source: String,
    pub indicator_code: String,
    pub values: BTreeMap<&'static str, Option<f64>>,
}

/// Natural key of a stored observation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObservationKey {
    pub geography_id: i32,
    pub time_id: i32,
    pub indicator_code: String,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_numbers_and_numeric_text() {
        assert_eq!(RawValue::coerce(Some(&RawValue::Number(5.7))), Coerced::Value(5.7));
        assert_eq!(RawValue::coerce(Some(&"5.7".into())), Coerced::Value(5.7));
        assert_eq!(RawValue::coerce(Some(&" -1e3 ".into())), Coerced::Value(-1000.0));
    }

    #[test]
    fn test_coerce_missing() {
        assert_eq!(RawValue::coerce(None), Coerced::Missing);
        assert_eq!(RawValue::coerce(Some(&"  ".into())), Coerced::Missing);
    }

    #[test]
    fn test_coerce_malformed() {
        assert_eq!(RawValue::coerce(Some(&"N/A".into())), Coerced::Malformed);
        assert_eq!(RawValue::coerce(Some(&"NaN".into())), Coerced::Malformed);
        assert_eq!(RawValue::coerce(Some(&RawValue::Number(f64::INFINITY))), Coerced::Malformed);
    }

    #[test]
    fn test_raw_value_deserializes_untagged() {
        let n: RawValue = serde_json::from_str("5.7").unwrap();
        let t: RawValue = serde_json::from_str("\"N/A\"").unwrap();
        assert_eq!(n, RawValue::Number(5.7));
        assert_eq!(t, RawValue::Text("N/A".into()));
    }
}
