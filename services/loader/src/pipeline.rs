//! Run orchestrator: normalize, route, write every domain in its own
//! transaction, then refresh the metadata catalogs.

use crate::normalize::{normalize, MappingGap};
use crate::observation::RawObservation;
use crate::registrar::{self, IndicatorDescriptor, SourceDescriptor};
use crate::resolver::DimensionResolver;
use crate::route::route;
use crate::schema::Domain;
use crate::store::Warehouse;
use crate::writer::{SkippedRow, UpsertWriter};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomainOutcome {
    pub attempted: usize,
    pub written: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub input_rows: usize,
    pub normalized_rows: usize,
    pub domains: BTreeMap<Domain, DomainOutcome>,
    pub skipped_rows: Vec<SkippedRow>,
    pub mapping_gaps: Vec<MappingGap>,
    pub malformed_values: usize,
    pub duplicates_dropped: usize,
    pub sources_registered: usize,
    pub indicators_registered: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metadata_errors: Vec<String>,
}

impl RunReport {
    pub fn rows_written(&self) -> usize {
        self.domains.values().map(|d| d.written).sum()
    }

    pub fn failed_domains(&self) -> Vec<Domain> {
        self.domains
            .iter()
            .filter(|(_, o)| o.error.is_some())
            .map(|(d, _)| *d)
            .collect()
    }

    /// True when every domain batch and catalog refresh committed.
    pub fn is_clean(&self) -> bool {
        self.failed_domains().is_empty() && self.metadata_errors.is_empty()
    }
}

/// Catalog entries refreshed at the end of a run.
#[derive(Debug, Clone)]
pub struct Catalogs {
    pub sources: Vec<SourceDescriptor>,
    pub indicators: Vec<IndicatorDescriptor>,
}

impl Default for Catalogs {
    fn default() -> Self {
        Self {
            sources: registrar::default_sources(),
            indicators: registrar::default_indicators(),
        }
    }
}

/// Load one batch of raw observations.
///
/// Never fails as a whole: per-row problems become skips, per-domain
/// failures are recorded against their domain and the other domains still
/// run.
pub async fn run<W, I>(
    store: &mut W,
    resolver: &mut DimensionResolver,
    raw_rows: I,
    catalogs: &Catalogs,
) -> RunReport
where
    W: Warehouse,
    I: IntoIterator<Item = RawObservation>,
{
    let (rows, normalized) = normalize(raw_rows);
    let routed = route(&rows);

    let mut report = RunReport {
        input_rows: normalized.input_rows,
        normalized_rows: rows.len(),
        mapping_gaps: normalized.mapping_gaps,
        malformed_values: normalized.malformed.len(),
        duplicates_dropped: normalized.duplicates_dropped,
        ..Default::default()
    };
    info!(
        input = report.input_rows,
        normalized = report.normalized_rows,
        gaps = report.mapping_gaps.len(),
        malformed = report.malformed_values,
        "batch normalized"
    );

    let mut writer = UpsertWriter::new(&mut *store, &mut *resolver);
    for (domain, domain_rows) in &routed {
        let outcome = match writer.upsert(*domain, domain_rows).await {
            Ok(batch) => {
                let outcome = DomainOutcome {
                    attempted: batch.attempted,
                    written: batch.written,
                    skipped: batch.skipped.len(),
                    error: None,
                };
                report.skipped_rows.extend(batch.skipped);
                outcome
            }
            Err(e) => {
                error!(domain = %domain, rows = domain_rows.len(), error = %e, "domain batch failed");
                DomainOutcome {
                    attempted: domain_rows.len(),
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        };
        report.domains.insert(*domain, outcome);
    }

    match registrar::register_sources(store, &catalogs.sources).await {
        Ok(n) => report.sources_registered = n,
        Err(e) => {
            warn!(error = %e, "data source catalog not refreshed");
            report.metadata_errors.push(format!("data_source: {e}"));
        }
    }
    match registrar::register_indicators(store, &catalogs.indicators).await {
        Ok(n) => report.indicators_registered = n,
        Err(e) => {
            warn!(error = %e, "indicator catalog not refreshed");
            report.metadata_errors.push(format!("indicator: {e}"));
        }
    }

    info!(
        written = report.rows_written(),
        skipped = report.skipped_rows.len(),
        failed_domains = report.failed_domains().len(),
        "run finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::DimensionPolicy;
    use crate::store::MemoryWarehouse;

    fn raw(country: &str, year: i32, code: &str, value: &str, source: &str) -> RawObservation {
        RawObservation::new(country, year, code, value, source)
    }

    fn sample() -> Vec<RawObservation> {
        vec![
            raw("US", 2021, "NY.GDP.MKTP.KD.ZG", "5.7", "world_bank"),
            raw("US", 2021, "FP.CPI.TOTL.ZG", "4.7", "world_bank"),
            raw("US", 2021, "SL.UEM.TOTL.ZS", "N/A", "world_bank"),
            raw("USA", 2021, "WHOSIS_000001", "77.2", "who"),
            raw("DE", 2021, "EN.ATM.PM25.MC.M3", "11.9", "world_bank"),
            raw("DE", 2021, "NOT.A.CODE", "1.0", "world_bank"),
        ]
    }

    #[tokio::test]
    async fn test_run_reports_every_domain() {
        let mut store = MemoryWarehouse::new();
        let mut resolver = DimensionResolver::default();
        let report = run(&mut store, &mut resolver, sample(), &Catalogs::default()).await;

        assert_eq!(report.input_rows, 6);
        assert_eq!(report.domains.len(), Domain::ALL.len());
        assert_eq!(report.domains[&Domain::Economy].written, 2);
        assert_eq!(report.domains[&Domain::Health].written, 1);
        assert_eq!(report.domains[&Domain::Environment].written, 1);
        assert_eq!(report.domains[&Domain::Trade], DomainOutcome::default());
        assert_eq!(report.rows_written(), 4);
        assert_eq!(report.malformed_values, 1);
        assert_eq!(report.mapping_gaps.len(), 1);
        assert_eq!(report.mapping_gaps[0].code, "NOT.A.CODE");
        assert!(report.is_clean());

        assert_eq!(store.geography_count(), 2);
        assert_eq!(report.sources_registered, 5);
        assert!(store.data_source("edgar").is_some());
        assert!(store.indicator("NY.GDP.MKTP.KD.ZG").is_some());
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let mut store = MemoryWarehouse::new();
        let mut resolver = DimensionResolver::default();
        run(&mut store, &mut resolver, sample(), &Catalogs::default()).await;
        let counts: Vec<usize> = Domain::ALL.iter().map(|d| store.row_count(*d)).collect();

        let mut fresh = DimensionResolver::default();
        run(&mut store, &mut fresh, sample(), &Catalogs::default()).await;
        let again: Vec<usize> = Domain::ALL.iter().map(|d| store.row_count(*d)).collect();

        assert_eq!(counts, again);
        assert_eq!(store.geography_count(), 2);
        assert_eq!(store.time_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_domain_does_not_block_others() {
        let mut store = MemoryWarehouse::new();
        store.reject_writes_to(Domain::Health);
        let mut resolver = DimensionResolver::default();
        let report = run(&mut store, &mut resolver, sample(), &Catalogs::default()).await;

        assert_eq!(report.failed_domains(), vec![Domain::Health]);
        let health = &report.domains[&Domain::Health];
        assert_eq!(health.written, 0);
        assert!(health.error.as_deref().unwrap().contains("write failure on health"));
        assert_eq!(report.domains[&Domain::Economy].written, 2);
        assert_eq!(store.row_count(Domain::Health), 0);
        assert_eq!(store.row_count(Domain::Economy), 2);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_strict_geography_skips_unknown_countries() {
        let mut store = MemoryWarehouse::new();
        store.create_geography("DEU", "Germany").await.unwrap();
        let mut resolver = DimensionResolver::new(DimensionPolicy {
            create_missing_geography: false,
            ..Default::default()
        });
        let report = run(&mut store, &mut resolver, sample(), &Catalogs::default()).await;

        assert_eq!(report.rows_written(), 1);
        assert_eq!(report.skipped_rows.len(), 3);
        assert!(report.skipped_rows.iter().all(|s| s.country_code == "USA"));
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_report_serializes_domain_keys() {
        let mut store = MemoryWarehouse::new();
        let mut resolver = DimensionResolver::default();
        let report = run(&mut store, &mut resolver, sample(), &Catalogs::default()).await;

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["domains"]["economy"]["written"], 2);
        assert_eq!(json["domains"]["social_demographic"]["attempted"], 0);
        assert!(json.get("metadata_errors").is_none());
    }
}
