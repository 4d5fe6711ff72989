//! WHO Global Health Observatory OData API (`GET /api/{code}`).

use crate::fetch::{FetchError, Fetcher};
use crate::source::{FetchRequest, Source};
use loader::mapping::{standardize_country, IndicatorMapping, WHO};
use loader::{RawObservation, RawValue};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    value: Vec<Fact>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Fact {
    spatial_dim: Option<String>,
    spatial_dim_type: Option<String>,
    time_dim: Option<i32>,
    dim1: Option<String>,
    numeric_value: Option<f64>,
}

/// Country-level, both-sexes (or unstratified) facts only, so each
/// (country, year) carries a single value.
fn keep(fact: &Fact) -> bool {
    let country_level = matches!(fact.spatial_dim_type.as_deref(), None | Some("COUNTRY"));
    let both_sexes = matches!(fact.dim1.as_deref(), None | Some("SEX_BTSX") | Some("BTSX"));
    country_level && both_sexes
}

fn to_observations(response: Response, indicator: &str) -> Vec<RawObservation> {
    response
        .value
        .into_iter()
        .filter(keep)
        .filter_map(|fact| {
            Some(RawObservation {
                country_code: fact.spatial_dim?,
                year: fact.time_dim?,
                quarter: None,
                indicator_source_code: indicator.to_string(),
                value: fact.numeric_value.map(RawValue::Number),
                source_name: WHO.to_string(),
            })
        })
        .collect()
}

/// OData `$filter` for the requested years and countries.
fn filter(request: &FetchRequest) -> String {
    let mut clauses = vec![format!(
        "TimeDim ge {} and TimeDim le {}",
        request.start_year, request.end_year
    )];
    if !request.countries.is_empty() {
        let countries: Vec<String> = request
            .countries
            .iter()
            .map(|c| format!("SpatialDim eq '{}'", standardize_country(c).as_str()))
            .collect();
        clauses.push(format!("({})", countries.join(" or ")));
    }
    clauses.join(" and ")
}

pub struct Who {
    base_url: String,
}

impl Who {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    async fn fetch(
        &self,
        fetcher: &Fetcher,
        indicator: &str,
        request: &FetchRequest,
    ) -> Result<Vec<RawObservation>, FetchError> {
        let url = format!("{}/api/{}", self.base_url.trim_end_matches('/'), indicator);
        let response: Response = fetcher.get_json(&url, &[("$filter", filter(request))]).await?;
        Ok(to_observations(response, indicator))
    }
}

impl Source for Who {
    fn name(&self) -> &'static str {
        WHO
    }

    async fn fetch_indicator(
        &self,
        fetcher: &Fetcher,
        indicator: &'static IndicatorMapping,
        request: &FetchRequest,
    ) -> Vec<RawObservation> {
        match self.fetch(fetcher, indicator.code, request).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(source = WHO, indicator = indicator.code, error = %e, "indicator fetch failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_country_level_both_sexes_rows_kept() {
        let response: Response = serde_json::from_str(
            r#"{
                "@odata.context": "https://ghoapi.azureedge.net/api/$metadata#WHOSIS_000001",
                "value": [
                    {"Id": 1, "IndicatorCode": "WHOSIS_000001", "SpatialDimType": "COUNTRY", "SpatialDim": "USA",
                     "TimeDimType": "YEAR", "TimeDim": 2019, "Dim1Type": "SEX", "Dim1": "SEX_BTSX", "NumericValue": 78.5},
                    {"Id": 2, "IndicatorCode": "WHOSIS_000001", "SpatialDimType": "COUNTRY", "SpatialDim": "USA",
                     "TimeDimType": "YEAR", "TimeDim": 2019, "Dim1Type": "SEX", "Dim1": "SEX_MLE", "NumericValue": 76.3},
                    {"Id": 3, "IndicatorCode": "WHOSIS_000001", "SpatialDimType": "REGION", "SpatialDim": "AFR",
                     "TimeDimType": "YEAR", "TimeDim": 2019, "Dim1Type": "SEX", "Dim1": "SEX_BTSX", "NumericValue": 64.5},
                    {"Id": 4, "IndicatorCode": "WHOSIS_000001", "SpatialDimType": "COUNTRY", "SpatialDim": "NGA",
                     "TimeDimType": "YEAR", "TimeDim": 2019, "Dim1": null, "NumericValue": null}
                ]
            }"#,
        )
        .unwrap();

        let rows = to_observations(response, "WHOSIS_000001");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], RawObservation::new("USA", 2019, "WHOSIS_000001", 78.5, "who"));
        assert_eq!(rows[1].country_code, "NGA");
        assert_eq!(rows[1].value, None);
    }

    #[test]
    fn test_filter_uses_iso3_codes() {
        let request = FetchRequest {
            start_year: 2018,
            end_year: 2020,
            countries: vec!["US".into(), "DEU".into()],
        };
        assert_eq!(
            filter(&request),
            "TimeDim ge 2018 and TimeDim le 2020 and (SpatialDim eq 'USA' or SpatialDim eq 'DEU')"
        );
    }

    #[test]
    fn test_missing_value_array_is_empty() {
        let response: Response = serde_json::from_str(r#"{"error": "not found"}"#).unwrap();
        assert!(to_observations(response, "X").is_empty());
    }
}
