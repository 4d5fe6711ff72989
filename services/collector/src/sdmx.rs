//! SDMX-JSON data messages, as served by the UNICEF and OECD endpoints.
//!
//! Both series-keyed (`series.{k}.observations`) and flat
//! (`dimensionAtObservation=allDimensions`) datasets are decoded. The body
//! may sit at the top level or under a `data` wrapper.

use loader::raw_csv::parse_period;
use loader::{RawObservation, RawValue};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

const COUNTRY_DIMS: &[&str] = &["REF_AREA", "COU", "LOCATION", "COUNTRY"];
const PERIOD_DIMS: &[&str] = &["TIME_PERIOD", "TIME", "YEAR"];
const TOTAL_SEX: &[&str] = &["_T", "T", "TOTAL"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Body {
    #[serde(default)]
    data_sets: Vec<DataSet>,
    structure: Option<Structure>,
}

#[derive(Debug, Deserialize)]
struct DataSet {
    #[serde(default)]
    series: BTreeMap<String, Series>,
    #[serde(default)]
    observations: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    observations: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct Structure {
    dimensions: Dimensions,
}

#[derive(Debug, Deserialize)]
struct Dimensions {
    #[serde(default)]
    series: Vec<Dimension>,
    #[serde(default)]
    observation: Vec<Dimension>,
}

#[derive(Debug, Deserialize)]
struct Dimension {
    id: String,
    #[serde(default)]
    values: Vec<DimensionValue>,
}

#[derive(Debug, Deserialize)]
struct DimensionValue {
    id: String,
}

/// Resolve a `0:3:1` position key against its dimension list.
fn key_values<'a>(dims: &'a [Dimension], key: &str) -> Option<Vec<(&'a str, &'a str)>> {
    if key.is_empty() {
        return Some(Vec::new());
    }
    key.split(':')
        .zip(dims)
        .map(|(pos, dim)| {
            let pos: usize = pos.parse().ok()?;
            dim.values.get(pos).map(|v| (dim.id.as_str(), v.id.as_str()))
        })
        .collect()
}

fn observation(
    dims: &[(&str, &str)],
    values: &[Value],
    indicator: &str,
    source: &str,
) -> Option<RawObservation> {
    let find = |ids: &[&str]| dims.iter().find(|(id, _)| ids.contains(id)).map(|(_, v)| *v);

    // Sex-disaggregated series would collide with the total.
    if let Some(sex) = find(&["SEX"]) {
        if !TOTAL_SEX.contains(&sex) {
            return None;
        }
    }
    let country = find(COUNTRY_DIMS)?;
    let (year, quarter) = parse_period(find(PERIOD_DIMS)?)?;
    let value = match values.first() {
        Some(Value::Number(n)) => n.as_f64().map(RawValue::Number),
        Some(Value::String(s)) => Some(RawValue::Text(s.clone())),
        _ => None,
    };
    Some(RawObservation {
        country_code: country.to_string(),
        year,
        quarter,
        indicator_source_code: indicator.to_string(),
        value,
        source_name: source.to_string(),
    })
}

/// Decode a data message into observations tagged with `indicator` and
/// `source`. A message without datasets decodes to nothing.
pub fn decode(message: &Value, indicator: &str, source: &str) -> Result<Vec<RawObservation>, String> {
    let body = message.get("data").unwrap_or(message);
    let body: Body = serde_json::from_value(body.clone()).map_err(|e| e.to_string())?;
    if body.data_sets.is_empty() {
        return Ok(Vec::new());
    }
    let structure = body.structure.ok_or("datasets without a structure")?;
    let dims = &structure.dimensions;

    let mut out = Vec::new();
    for set in &body.data_sets {
        for (series_key, series) in &set.series {
            let Some(series_dims) = key_values(&dims.series, series_key) else {
                continue;
            };
            for (obs_key, values) in &series.observations {
                let Some(obs_dims) = key_values(&dims.observation, obs_key) else {
                    continue;
                };
                let all: Vec<(&str, &str)> = series_dims.iter().chain(&obs_dims).copied().collect();
                out.extend(observation(&all, values, indicator, source));
            }
        }
        for (obs_key, values) in &set.observations {
            let Some(obs_dims) = key_values(&dims.observation, obs_key) else {
                continue;
            };
            out.extend(observation(&obs_dims, values, indicator, source));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_series_keyed_message_under_data() {
        let message = json!({
            "data": {
                "dataSets": [{
                    "series": {
                        "0:0": {"observations": {"0": [91.0], "1": [null]}},
                        "1:0": {"observations": {"0": ["88.5"]}},
                        "0:1": {"observations": {"0": [90.0]}}
                    }
                }],
                "structure": {
                    "dimensions": {
                        "series": [
                            {"id": "REF_AREA", "values": [{"id": "USA"}, {"id": "NGA"}]},
                            {"id": "SEX", "values": [{"id": "_T"}, {"id": "F"}]}
                        ],
                        "observation": [
                            {"id": "TIME_PERIOD", "values": [{"id": "2019"}, {"id": "2020"}]}
                        ]
                    }
                }
            }
        });

        let rows = decode(&message, "IMMUNIZATION", "unicef").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], RawObservation::new("USA", 2019, "IMMUNIZATION", 91.0, "unicef"));
        assert_eq!((rows[1].year, rows[1].value.clone()), (2020, None));
        assert_eq!(rows[2], RawObservation::new("NGA", 2019, "IMMUNIZATION", "88.5", "unicef"));
    }

    #[test]
    fn test_flat_message_at_top_level() {
        let message = json!({
            "dataSets": [{
                "observations": {
                    "0:0:0": [31.5, 0],
                    "0:1:1": [33.0, 0]
                }
            }],
            "structure": {
                "dimensions": {
                    "observation": [
                        {"id": "LOCATION", "values": [{"id": "DEU"}]},
                        {"id": "TIME_PERIOD", "values": [{"id": "2020-Q1"}, {"id": "2020-Q2"}]},
                        {"id": "MEASURE", "values": [{"id": "100INHAB"}, {"id": "OTHER"}]}
                    ]
                }
            }
        });

        let rows = decode(&message, "BROADBAND", "oecd").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].year, rows[0].quarter), (2020, Some(1)));
        assert_eq!(rows[1].quarter, Some(2));
        assert_eq!(rows[1].value, Some(RawValue::Number(33.0)));
    }

    #[test]
    fn test_message_without_datasets_is_empty() {
        let message = json!({"data": {"dataSets": []}});
        assert!(decode(&message, "NUTRITION", "unicef").unwrap().is_empty());
        assert!(decode(&json!({"dataSets": [{}]}), "X", "oecd").is_err());
    }
}
