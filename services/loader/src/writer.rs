//! Upsert writer: durable, conflict-aware writes of one domain batch.
//!
//! Each batch runs in its own transaction. A row whose dimensions cannot be
//! resolved is skipped and recorded; any backend failure rolls the whole
//! batch back and is returned as `LoadError::WriteFailure`.

use crate::error::{DimensionError, LoadError, StoreError};
use crate::observation::{DomainRow, ObservationKey};
use crate::resolver::DimensionResolver;
use crate::schema::{Domain, DomainTable};
use crate::store::Warehouse;
use serde::Serialize;
use tracing::{error, info, warn};

/// Result of writing one row.
#[derive(Debug)]
pub enum RowOutcome {
    Written,
    Skipped(LoadError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    pub country_code: String,
    pub year: i32,
    pub indicator_code: String,
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub domain: Domain,
    pub attempted: usize,
    pub written: usize,
    pub skipped: Vec<SkippedRow>,
}

impl BatchReport {
    fn new(domain: Domain) -> Self {
        Self {
            domain,
            attempted: 0,
            written: 0,
            skipped: Vec::new(),
        }
    }
}

pub struct UpsertWriter<'a, W: Warehouse> {
    store: &'a mut W,
    resolver: &'a mut DimensionResolver,
}

impl<'a, W: Warehouse> UpsertWriter<'a, W> {
    pub fn new(store: &'a mut W, resolver: &'a mut DimensionResolver) -> Self {
        Self { store, resolver }
    }

    /// Write `rows` into `domain`'s table inside one transaction.
    pub async fn upsert(&mut self, domain: Domain, rows: &[DomainRow]) -> Result<BatchReport, LoadError> {
        let table = domain.table();
        let mut report = BatchReport::new(domain);
        if rows.is_empty() {
            return Ok(report);
        }

        let failure = |source: StoreError| LoadError::WriteFailure { domain, source };
        self.store.begin().await.map_err(failure)?;

        for row in rows {
            report.attempted += 1;
            match self.write_row(table, row).await {
                Ok(RowOutcome::Written) => report.written += 1,
                Ok(RowOutcome::Skipped(reason)) => {
                    warn!(
                        domain = %domain,
                        source = %row.source,
                        indicator = %row.indicator_code,
                        country = %row.country_code,
                        year = row.year,
                        error = %reason,
                        "row skipped"
                    );
                    report.skipped.push(SkippedRow {
                        country_code: row.country_code.clone(),
                        year: row.year,
                        indicator_code: row.indicator_code.clone(),
                        source: row.source.clone(),
                        reason: reason.to_string(),
                    });
                }
                Err(source) => {
                    self.abort(domain).await;
                    error!(
                        domain = %domain,
                        source = %row.source,
                        indicator = %row.indicator_code,
                        country = %row.country_code,
                        year = row.year,
                        error = %source,
                        "batch rolled back"
                    );
                    return Err(failure(source));
                }
            }
        }

        if let Err(source) = self.store.commit().await {
            self.resolver.rollback();
            return Err(failure(source));
        }
        self.resolver.commit();

        info!(
            domain = %domain,
            attempted = report.attempted,
            written = report.written,
            skipped = report.skipped.len(),
            "domain batch committed"
        );
        Ok(report)
    }

    async fn write_row(&mut self, table: &'static DomainTable, row: &DomainRow) -> Result<RowOutcome, StoreError> {
        let geography_id = match self.resolver.resolve_geography(self.store, &row.country_code).await {
            Ok(id) => id,
            Err(e) => return skip_or_fail(row, e),
        };
        let time_id = match self.resolver.resolve_time(self.store, row.year, row.quarter).await {
            Ok(id) => id,
            Err(e) => return skip_or_fail(row, e),
        };

        let key = ObservationKey {
            geography_id,
            time_id,
            indicator_code: row.indicator_code.clone(),
            source: row.source.clone(),
        };
        self.store.upsert_observation(table, &key, &row.values).await?;
        Ok(RowOutcome::Written)
    }

    async fn abort(&mut self, domain: Domain) {
        if let Err(e) = self.store.rollback().await {
            error!(domain = %domain, error = %e, "rollback failed");
        }
        self.resolver.rollback();
    }
}

/// Backend failures fail the batch; every other dimension error skips the row.
fn skip_or_fail(row: &DomainRow, e: DimensionError) -> Result<RowOutcome, StoreError> {
    match e {
        DimensionError::Store(source) => Err(source),
        other => Ok(RowOutcome::Skipped(LoadError::DimensionResolution {
            country_code: row.country_code.clone(),
            year: row.year,
            source: other,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::observation::RawObservation;
    use crate::resolver::DimensionPolicy;
    use crate::route::route;
    use crate::store::MemoryWarehouse;
    use std::collections::BTreeMap;

    fn row(country: &str, year: i32, indicator: &str, values: &[(&'static str, Option<f64>)]) -> DomainRow {
        DomainRow {
            country_code: country.to_string(),
            year,
            quarter: None,
            source: "world_bank".to_string(),
            indicator_code: indicator.to_string(),
            values: values.iter().copied().collect::<BTreeMap<_, _>>(),
        }
    }

    fn stored(store: &MemoryWarehouse, domain: Domain, country: &str, year: i32, indicator: &str) -> BTreeMap<&'static str, Option<f64>> {
        let geography_id = store.geography(country).unwrap().geography_id;
        let time_id = store.time_id(year, None).unwrap();
        let key = ObservationKey {
            geography_id,
            time_id,
            indicator_code: indicator.to_string(),
            source: "world_bank".to_string(),
        };
        store.observation(domain, &key).unwrap().clone()
    }

    // -------------------------------------------------------------------------
    // MERGE SEMANTICS
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_upsert_twice_is_idempotent() {
        let mut store = MemoryWarehouse::new();
        let mut resolver = DimensionResolver::default();
        let rows = vec![
            row("USA", 2020, "NY.GDP.MKTP.KD.ZG", &[("gdp_growth", Some(-2.8))]),
            row("USA", 2021, "NY.GDP.MKTP.KD.ZG", &[("gdp_growth", Some(5.7))]),
            row("GBR", 2021, "FP.CPI.TOTL.ZG", &[("inflation_rate", Some(2.5))]),
        ];

        let first = UpsertWriter::new(&mut store, &mut resolver)
            .upsert(Domain::Economy, &rows)
            .await
            .unwrap();
        let snapshot: Vec<_> = store.rows(Domain::Economy).map(|(k, v)| (k.clone(), v.clone())).collect();

        let second = UpsertWriter::new(&mut store, &mut resolver)
            .upsert(Domain::Economy, &rows)
            .await
            .unwrap();
        let again: Vec<_> = store.rows(Domain::Economy).map(|(k, v)| (k.clone(), v.clone())).collect();

        assert_eq!(first.written, 3);
        assert_eq!(second.written, 3);
        assert_eq!(snapshot, again);
        assert_eq!(store.row_count(Domain::Economy), 3);
        assert_eq!(store.geography_count(), 2);
        assert_eq!(store.time_count(), 2);
    }

    #[tokio::test]
    async fn test_null_coalescing_preserves_stored_metrics() {
        let mut store = MemoryWarehouse::new();
        let mut resolver = DimensionResolver::default();
        let mut writer = UpsertWriter::new(&mut store, &mut resolver);

        writer
            .upsert(Domain::Economy, &[row("USA", 2021, "X", &[("gdp_growth", Some(5.0)), ("unemployment_rate", None)])])
            .await
            .unwrap();
        writer
            .upsert(Domain::Economy, &[row("USA", 2021, "X", &[("gdp_growth", None), ("unemployment_rate", Some(7.0))])])
            .await
            .unwrap();

        let values = stored(&store, Domain::Economy, "USA", 2021, "X");
        assert_eq!(values["gdp_growth"], Some(5.0));
        assert_eq!(values["unemployment_rate"], Some(7.0));
    }

    #[tokio::test]
    async fn test_inflation_keeps_the_ceiling() {
        let mut store = MemoryWarehouse::new();
        let mut resolver = DimensionResolver::default();
        let mut writer = UpsertWriter::new(&mut store, &mut resolver);

        for value in [Some(3.0), Some(1.0), None] {
            writer
                .upsert(Domain::Economy, &[row("USA", 2021, "FP.CPI.TOTL.ZG", &[("inflation_rate", value)])])
                .await
                .unwrap();
        }
        let values = stored(&store, Domain::Economy, "USA", 2021, "FP.CPI.TOTL.ZG");
        assert_eq!(values["inflation_rate"], Some(3.0));
    }

    // -------------------------------------------------------------------------
    // PARTIAL FAILURE
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_unresolvable_row_is_skipped_batch_continues() {
        let mut store = MemoryWarehouse::new();
        store.create_geography("USA", "United States").await.unwrap();
        let mut resolver = DimensionResolver::new(DimensionPolicy {
            create_missing_geography: false,
            ..Default::default()
        });

        let rows = vec![
            row("USA", 2021, "NY.GDP.MKTP.KD.ZG", &[("gdp_growth", Some(5.7))]),
            row("ATL", 2021, "NY.GDP.MKTP.KD.ZG", &[("gdp_growth", Some(1.0))]),
            row("USA", 1492, "NY.GDP.MKTP.KD.ZG", &[("gdp_growth", Some(0.1))]),
        ];
        let report = UpsertWriter::new(&mut store, &mut resolver)
            .upsert(Domain::Economy, &rows)
            .await
            .unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].country_code, "ATL");
        assert!(report.skipped[0].reason.contains("unknown geography 'ATL'"));
        assert_eq!(report.skipped[1].year, 1492);
        assert_eq!(store.row_count(Domain::Economy), 1);
        assert!(store.time_id(1492, None).is_none());
    }

    #[tokio::test]
    async fn test_write_failure_rolls_back_only_that_domain() {
        let mut store = MemoryWarehouse::new();
        store.reject_writes_to(Domain::Health);
        let mut resolver = DimensionResolver::default();
        let mut writer = UpsertWriter::new(&mut store, &mut resolver);

        let err = writer
            .upsert(Domain::Health, &[row("NGA", 2019, "WHOSIS_000001", &[("life_expectancy", Some(62.6))])])
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::WriteFailure { domain: Domain::Health, .. }));

        let report = writer
            .upsert(Domain::Economy, &[row("USA", 2019, "NY.GDP.MKTP.KD.ZG", &[("gdp_growth", Some(2.3))])])
            .await
            .unwrap();
        assert_eq!(report.written, 1);

        assert_eq!(store.row_count(Domain::Health), 0);
        assert_eq!(store.row_count(Domain::Economy), 1);
        // NGA was created inside the rolled-back batch.
        assert!(store.geography("NGA").is_none());
        assert!(store.geography("USA").is_some());
    }

    #[tokio::test]
    async fn test_rolled_back_ids_are_recreated_later() {
        let mut store = MemoryWarehouse::new();
        store.reject_writes_to(Domain::Health);
        let mut resolver = DimensionResolver::default();

        let health = [row("NGA", 2019, "WHOSIS_000001", &[("life_expectancy", Some(62.6))])];
        assert!(UpsertWriter::new(&mut store, &mut resolver)
            .upsert(Domain::Health, &health)
            .await
            .is_err());

        let economy = [row("NGA", 2019, "NY.GDP.MKTP.KD.ZG", &[("gdp_growth", Some(2.2))])];
        let report = UpsertWriter::new(&mut store, &mut resolver)
            .upsert(Domain::Economy, &economy)
            .await
            .unwrap();
        assert_eq!(report.written, 1);
        assert!(store.geography("NGA").is_some());
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let mut store = MemoryWarehouse::new();
        let mut resolver = DimensionResolver::default();
        let report = UpsertWriter::new(&mut store, &mut resolver)
            .upsert(Domain::Trade, &[])
            .await
            .unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(report.written, 0);
    }

    // -------------------------------------------------------------------------
    // END TO END
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_scenario_us_gdp_growth() {
        let (rows, _) = normalize(vec![RawObservation::new("US", 2021, "NY.GDP.MKTP.KD.ZG", "5.7", "WorldBank")]);
        let routed = route(&rows);

        let mut store = MemoryWarehouse::new();
        let mut resolver = DimensionResolver::default();
        let mut writer = UpsertWriter::new(&mut store, &mut resolver);
        for (domain, domain_rows) in &routed {
            writer.upsert(*domain, domain_rows).await.unwrap();
        }

        assert_eq!(store.row_count(Domain::Economy), 1);
        for domain in Domain::ALL.into_iter().filter(|d| *d != Domain::Economy) {
            assert_eq!(store.row_count(domain), 0);
        }
        let key = ObservationKey {
            geography_id: store.geography("USA").unwrap().geography_id,
            time_id: store.time_id(2021, None).unwrap(),
            indicator_code: "NY.GDP.MKTP.KD.ZG".to_string(),
            source: "WorldBank".to_string(),
        };
        let values = store.observation(Domain::Economy, &key).unwrap();
        assert_eq!(values["gdp_growth"], Some(5.7));
    }

    #[tokio::test]
    async fn test_malformed_value_does_not_block_other_fields() {
        let (rows, report) = normalize(vec![
            RawObservation::new("USA", 2021, "SL.UEM.TOTL.ZS", "N/A", "world_bank"),
            RawObservation::new("USA", 2021, "FP.CPI.TOTL.ZG", "4.7", "world_bank"),
        ]);
        assert_eq!(report.malformed.len(), 1);

        let routed = route(&rows);
        let mut store = MemoryWarehouse::new();
        let mut resolver = DimensionResolver::default();
        let batch = UpsertWriter::new(&mut store, &mut resolver)
            .upsert(Domain::Economy, &routed[&Domain::Economy])
            .await
            .unwrap();

        assert_eq!(batch.written, 1);
        let values = stored(&store, Domain::Economy, "USA", 2021, "FP.CPI.TOTL.ZG");
        assert_eq!(values["inflation_rate"], Some(4.7));
        assert_eq!(values["unemployment_rate"], None);
    }
}
