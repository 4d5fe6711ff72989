//! World Bank Indicators API v2.
//!
//! `GET /v2/country/{codes}/indicator/{code}?format=json&date=a:b&page=n`
//! returns `[paging, rows]`; the fetcher walks every page.

use crate::fetch::{FetchError, Fetcher};
use crate::source::{FetchRequest, Source};
use loader::mapping::{IndicatorMapping, WORLD_BANK};
use loader::raw_csv::parse_period;
use loader::{RawObservation, RawValue};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

const PER_PAGE: u32 = 1000;

#[derive(Debug, Deserialize)]
struct Paging {
    page: u32,
    pages: u32,
}

#[derive(Debug, Deserialize)]
struct Ref {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Row {
    country: Ref,
    #[serde(default)]
    countryiso3code: String,
    date: String,
    value: Option<f64>,
}

/// One decoded page: paging info and observations.
#[derive(Debug)]
pub struct Page {
    pub page: u32,
    pub pages: u32,
    pub observations: Vec<RawObservation>,
}

/// Decode a v2 response body. An error envelope (`[{"message": ...}]`)
/// is reported as an error.
pub fn parse_page(body: &Value, indicator: &str) -> Result<Page, String> {
    let parts = body.as_array().ok_or("response is not an array")?;
    let paging = parts.first().ok_or("empty response")?;
    if paging.get("message").is_some() {
        return Err(format!("API error: {}", paging["message"]));
    }
    let paging: Paging = serde_json::from_value(paging.clone()).map_err(|e| e.to_string())?;

    let rows: Vec<Row> = match parts.get(1) {
        None | Some(Value::Null) => Vec::new(),
        Some(rows) => serde_json::from_value(rows.clone()).map_err(|e| e.to_string())?,
    };

    let observations = rows
        .into_iter()
        .filter_map(|row| {
            let (year, quarter) = parse_period(&row.date)?;
            let country = if row.countryiso3code.is_empty() {
                row.country.id
            } else {
                row.countryiso3code
            };
            Some(RawObservation {
                country_code: country,
                year,
                quarter,
                indicator_source_code: indicator.to_string(),
                value: row.value.map(RawValue::Number),
                source_name: WORLD_BANK.to_string(),
            })
        })
        .collect();

    Ok(Page {
        page: paging.page,
        pages: paging.pages,
        observations,
    })
}

pub struct WorldBank {
    base_url: String,
}

impl WorldBank {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn url(&self, indicator: &str, request: &FetchRequest) -> String {
        let countries = if request.countries.is_empty() {
            "all".to_string()
        } else {
            request.countries.join(";")
        };
        format!(
            "{}/v2/country/{}/indicator/{}",
            self.base_url.trim_end_matches('/'),
            countries,
            indicator
        )
    }

    async fn fetch_pages(
        &self,
        fetcher: &Fetcher,
        indicator: &str,
        request: &FetchRequest,
    ) -> Result<Vec<RawObservation>, FetchError> {
        let url = self.url(indicator, request);
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let query = [
                ("format", "json".to_string()),
                ("date", format!("{}:{}", request.start_year, request.end_year)),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let body: Value = fetcher.get_json(&url, &query).await?;
            let decoded = parse_page(&body, indicator).map_err(|reason| FetchError::Payload {
                url: url.clone(),
                reason,
            })?;
            out.extend(decoded.observations);
            if decoded.page >= decoded.pages {
                return Ok(out);
            }
            page = decoded.page + 1;
        }
    }
}

impl Source for WorldBank {
    fn name(&self) -> &'static str {
        WORLD_BANK
    }

    async fn fetch_indicator(
        &self,
        fetcher: &Fetcher,
        indicator: &'static IndicatorMapping,
        request: &FetchRequest,
    ) -> Vec<RawObservation> {
        match self.fetch_pages(fetcher, indicator.code, request).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(source = WORLD_BANK, indicator = indicator.code, error = %e, "indicator fetch failed");
                Vec::new()
            }
        }
    }
}
