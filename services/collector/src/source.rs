//! What every source fetcher provides.

use crate::fetch::Fetcher;
use loader::mapping::{self, IndicatorMapping};
use loader::RawObservation;
use std::future::Future;
use tracing::{info, warn};

/// Countries and years to collect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub start_year: i32,
    pub end_year: i32,
    /// Empty means every country the source publishes.
    pub countries: Vec<String>,
}

pub trait Source: Send + Sync + 'static {
    /// Source name as written to the `source` column.
    fn name(&self) -> &'static str;

    /// Observations for one indicator. A terminal failure is logged and
    /// yields an empty vector so the rest of the source still loads.
    fn fetch_indicator(
        &self,
        fetcher: &Fetcher,
        indicator: &'static IndicatorMapping,
        request: &FetchRequest,
    ) -> impl Future<Output = Vec<RawObservation>> + Send;

    /// Every mapped indicator of this source, one after the other.
    fn collect(
        &self,
        fetcher: &Fetcher,
        request: &FetchRequest,
    ) -> impl Future<Output = Vec<RawObservation>> + Send {
        async move {
            let mut out = Vec::new();
            for indicator in mapping::indicators_for(self.name()) {
                let rows = self.fetch_indicator(fetcher, indicator, request).await;
                if rows.is_empty() {
                    warn!(source = self.name(), indicator = indicator.code, "no observations");
                } else {
                    info!(source = self.name(), indicator = indicator.code, rows = rows.len(), "fetched");
                }
                out.extend(rows);
            }
            out
        }
    }
}
