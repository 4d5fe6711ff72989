//! UNICEF SDMX REST API (`/data/UNICEF,{flow},1.0/{key}`).

use crate::fetch::{FetchError, Fetcher};
use crate::sdmx;
use crate::source::{FetchRequest, Source};
use loader::mapping::{standardize_country, IndicatorMapping, UNICEF};
use loader::RawObservation;
use serde_json::Value;
use tracing::warn;

pub struct Unicef {
    base_url: String,
}

impl Unicef {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Annual series of `flow`, restricted to the requested countries.
    fn url(&self, flow: &str, request: &FetchRequest) -> String {
        let countries: Vec<String> = request
            .countries
            .iter()
            .map(|c| standardize_country(c).into_string())
            .collect();
        format!(
            "{}/UNICEF,{},1.0/A.{}.",
            self.base_url.trim_end_matches('/'),
            flow,
            countries.join("+")
        )
    }

    async fn fetch(
        &self,
        fetcher: &Fetcher,
        flow: &str,
        request: &FetchRequest,
    ) -> Result<Vec<RawObservation>, FetchError> {
        let url = self.url(flow, request);
        let query = [
            ("format", "jsondata".to_string()),
            ("startPeriod", request.start_year.to_string()),
            ("endPeriod", request.end_year.to_string()),
        ];
        let body: Value = fetcher.get_json(&url, &query).await?;
        sdmx::decode(&body, flow, UNICEF).map_err(|reason| FetchError::Payload { url, reason })
    }
}

impl Source for Unicef {
    fn name(&self) -> &'static str {
        UNICEF
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
                warn!(source = UNICEF, indicator = indicator.code, error = %e, "indicator fetch failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_uses_iso3_country_key() {
        let unicef = Unicef::new("https://sdmx.data.unicef.org/ws/public/sdmxapi/rest/data/");
        let request = FetchRequest {
            start_year: 2018,
            end_year: 2022,
            countries: vec!["US".into(), "NGA".into()],
        };
        assert_eq!(
            unicef.url("IMMUNIZATION", &request),
            "https://sdmx.data.unicef.org/ws/public/sdmxapi/rest/data/UNICEF,IMMUNIZATION,1.0/A.USA+NGA."
        );
    }

    #[test]
    fn test_url_for_all_countries() {
        let unicef = Unicef::new("https://sdmx.example");
        let request = FetchRequest {
            start_year: 2018,
            end_year: 2022,
            countries: vec![],
        };
        assert_eq!(unicef.url("NUTRITION", &request), "https://sdmx.example/UNICEF,NUTRITION,1.0/A..");
    }
}
