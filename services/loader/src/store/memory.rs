//! In-memory warehouse with the same conflict semantics as the Postgres
//! schema. Transactions work on a snapshot that is swapped in on commit.

use super::{GeographyId, MetricValues, TimeId, Warehouse};
use crate::error::StoreError;
use crate::observation::ObservationKey;
use crate::registrar::{IndicatorDescriptor, SourceDescriptor};
use crate::schema::{Domain, DomainTable};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct GeographyRecord {
    pub geography_id: GeographyId,
    pub country_code: String,
    pub country_name: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord<T> {
    pub descriptor: T,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct State {
    geographies: BTreeMap<String, GeographyRecord>,
    times: BTreeMap<(i32, Option<u8>), TimeId>,
    next_geography_id: GeographyId,
    next_time_id: TimeId,
    facts: BTreeMap<Domain, BTreeMap<ObservationKey, MetricValues>>,
    sources: BTreeMap<String, CatalogRecord<SourceDescriptor>>,
    indicators: BTreeMap<String, CatalogRecord<IndicatorDescriptor>>,
}

#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    committed: State,
    working: Option<State>,
    rejected: BTreeSet<Domain>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `domain` fail, as a broken table would.
    pub fn reject_writes_to(&mut self, domain: Domain) {
        self.rejected.insert(domain);
    }

    fn state(&self) -> &State {
        self.working.as_ref().unwrap_or(&self.committed)
    }

    fn state_mut(&mut self) -> &mut State {
        match self.working {
            Some(ref mut state) => state,
            None => &mut self.committed,
        }
    }

    // ── Inspection (committed state) ──────────────────────────────────────

    pub fn geography(&self, country_code: &str) -> Option<&GeographyRecord> {
        self.committed.geographies.get(country_code)
    }

    pub fn geography_count(&self) -> usize {
        self.committed.geographies.len()
    }

    pub fn time_count(&self) -> usize {
        self.committed.times.len()
    }

    pub fn time_id(&self, year: i32, quarter: Option<u8>) -> Option<TimeId> {
        self.committed.times.get(&(year, quarter)).copied()
    }

    pub fn row_count(&self, domain: Domain) -> usize {
        self.committed.facts.get(&domain).map(|t| t.len()).unwrap_or(0)
    }

    pub fn rows(&self, domain: Domain) -> impl Iterator<Item = (&ObservationKey, &MetricValues)> {
        self.committed.facts.get(&domain).into_iter().flat_map(|t| t.iter())
    }

    pub fn observation(&self, domain: Domain, key: &ObservationKey) -> Option<&MetricValues> {
        self.committed.facts.get(&domain).and_then(|t| t.get(key))
    }

    pub fn data_source(&self, name: &str) -> Option<&CatalogRecord<SourceDescriptor>> {
        self.committed.sources.get(name)
    }

    pub fn indicator(&self, code: &str) -> Option<&CatalogRecord<IndicatorDescriptor>> {
        self.committed.indicators.get(code)
    }

    pub fn indicator_count(&self) -> usize {
        self.committed.indicators.len()
    }
}

impl Warehouse for MemoryWarehouse {
    async fn begin(&mut self) -> Result<(), StoreError> {
        self.working = Some(self.committed.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let state = self.working.take().ok_or(StoreError::NoTransaction)?;
        self.committed = state;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.working.take().ok_or(StoreError::NoTransaction)?;
        Ok(())
    }

    async fn find_geography(&mut self, country_code: &str) -> Result<Option<GeographyId>, StoreError> {
        Ok(self
            .state()
            .geographies
            .get(country_code)
            .map(|g| g.geography_id))
    }

    async fn create_geography(
        &mut self,
        country_code: &str,
        country_name: &str,
    ) -> Result<Option<GeographyId>, StoreError> {
        let state = self.state_mut();
        if state.geographies.contains_key(country_code) {
            return Ok(None);
        }
        state.next_geography_id += 1;
        let id = state.next_geography_id;
        state.geographies.insert(
            country_code.to_string(),
            GeographyRecord {
                geography_id: id,
                country_code: country_code.to_string(),
                country_name: country_name.to_string(),
                region: None,
            },
        );
        Ok(Some(id))
    }

    async fn find_time(&mut self, year: i32, quarter: Option<u8>) -> Result<Option<TimeId>, StoreError> {
        Ok(self.state().times.get(&(year, quarter)).copied())
    }

    async fn create_time(&mut self, year: i32, quarter: Option<u8>) -> Result<Option<TimeId>, StoreError> {
        let state = self.state_mut();
        if state.times.contains_key(&(year, quarter)) {
            return Ok(None);
        }
        state.next_time_id += 1;
        let id = state.next_time_id;
        state.times.insert((year, quarter), id);
        Ok(Some(id))
    }

    async fn upsert_observation(
        &mut self,
        table: &'static DomainTable,
        key: &ObservationKey,
        values: &MetricValues,
    ) -> Result<(), StoreError> {
        if self.rejected.contains(&table.domain) {
            return Err(StoreError::Rejected(format!("{} is read-only", table.name())));
        }
        let state = self.state_mut();
        if !state.geographies.values().any(|g| g.geography_id == key.geography_id) {
            return Err(StoreError::Rejected(format!(
                "geography_id {} violates foreign key",
                key.geography_id
            )));
        }
        if !state.times.values().any(|t| *t == key.time_id) {
            return Err(StoreError::Rejected(format!(
                "time_id {} violates foreign key",
                key.time_id
            )));
        }

        let rows = state.facts.entry(table.domain).or_default();
        match rows.get_mut(key) {
            None => {
                let row: MetricValues = table
                    .columns
                    .iter()
                    .map(|c| (c.name, values.get(c.name).copied().flatten()))
                    .collect();
                rows.insert(key.clone(), row);
            }
            Some(existing) => {
                for column in table.columns {
                    let incoming = values.get(column.name).copied().flatten();
                    let slot = existing.entry(column.name).or_insert(None);
                    *slot = column.merge.merge(*slot, incoming);
                }
            }
        }
        Ok(())
    }

    async fn upsert_data_source(
        &mut self,
        source: &SourceDescriptor,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.state_mut().sources.insert(
            source.name.clone(),
            CatalogRecord {
                descriptor: source.clone(),
                last_updated: at,
            },
        );
        Ok(())
    }

    async fn upsert_indicator(
        &mut self,
        indicator: &IndicatorDescriptor,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.state_mut().indicators.insert(
            indicator.code.clone(),
            CatalogRecord {
                descriptor: indicator.clone(),
                last_updated: at,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ECONOMY;

    async fn seeded() -> (MemoryWarehouse, ObservationKey) {
        let mut w = MemoryWarehouse::new();
        let geography_id = w.create_geography("USA", "USA").await.unwrap().unwrap();
        let time_id = w.create_time(2021, None).await.unwrap().unwrap();
        let key = ObservationKey {
            geography_id,
            time_id,
            indicator_code: "FP.CPI.TOTL.ZG".into(),
            source: "world_bank".into(),
        };
        (w, key)
    }

    fn values(pairs: &[(&'static str, Option<f64>)]) -> MetricValues {
        pairs.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_create_is_idempotent_per_natural_key() {
        let mut w = MemoryWarehouse::new();
        assert_eq!(w.create_geography("USA", "USA").await.unwrap(), Some(1));
        assert_eq!(w.create_geography("USA", "USA").await.unwrap(), None);
        assert_eq!(w.create_time(2020, None).await.unwrap(), Some(1));
        assert_eq!(w.create_time(2020, Some(1)).await.unwrap(), Some(2));
        assert_eq!(w.create_time(2020, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_null_coalescing_merge() {
        let (mut w, key) = seeded().await;
        w.upsert_observation(&ECONOMY, &key, &values(&[("gdp_growth", Some(5.0)), ("unemployment_rate", None)]))
            .await
            .unwrap();
        w.upsert_observation(&ECONOMY, &key, &values(&[("gdp_growth", None), ("unemployment_rate", Some(7.0))]))
            .await
            .unwrap();

        let stored = w.observation(Domain::Economy, &key).unwrap();
        assert_eq!(stored["gdp_growth"], Some(5.0));
        assert_eq!(stored["unemployment_rate"], Some(7.0));
        assert_eq!(w.row_count(Domain::Economy), 1);
    }

    #[tokio::test]
    async fn test_ceiling_merge() {
        let (mut w, key) = seeded().await;
        w.upsert_observation(&ECONOMY, &key, &values(&[("inflation_rate", Some(3.0))]))
            .await
            .unwrap();
        w.upsert_observation(&ECONOMY, &key, &values(&[("inflation_rate", Some(1.0))]))
            .await
            .unwrap();
        assert_eq!(w.observation(Domain::Economy, &key).unwrap()["inflation_rate"], Some(3.0));

        let other = ObservationKey {
            indicator_code: "OTHER".into(),
            ..key.clone()
        };
        w.upsert_observation(&ECONOMY, &other, &values(&[("inflation_rate", None)]))
            .await
            .unwrap();
        w.upsert_observation(&ECONOMY, &other, &values(&[("inflation_rate", Some(4.0))]))
            .await
            .unwrap();
        assert_eq!(w.observation(Domain::Economy, &other).unwrap()["inflation_rate"], Some(4.0));
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let (mut w, key) = seeded().await;
        w.begin().await.unwrap();
        w.create_geography("GBR", "GBR").await.unwrap();
        w.upsert_observation(&ECONOMY, &key, &values(&[("gdp_growth", Some(1.0))]))
            .await
            .unwrap();
        assert_eq!(w.find_geography("GBR").await.unwrap(), Some(2));
        w.rollback().await.unwrap();

        assert!(w.geography("GBR").is_none());
        assert_eq!(w.row_count(Domain::Economy), 0);
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let (mut w, key) = seeded().await;
        w.begin().await.unwrap();
        w.upsert_observation(&ECONOMY, &key, &values(&[("gdp_growth", Some(1.0))]))
            .await
            .unwrap();
        assert_eq!(w.row_count(Domain::Economy), 0);
        w.commit().await.unwrap();
        assert_eq!(w.row_count(Domain::Economy), 1);
    }

    #[tokio::test]
    async fn test_commit_without_begin_fails() {
        let mut w = MemoryWarehouse::new();
        assert!(matches!(w.commit().await, Err(StoreError::NoTransaction)));
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let (mut w, key) = seeded().await;
        let dangling = ObservationKey {
            geography_id: 99,
            ..key
        };
        let err = w
            .upsert_observation(&ECONOMY, &dangling, &values(&[("gdp_growth", Some(1.0))]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("foreign key"));
    }
}
