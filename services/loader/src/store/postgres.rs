//! Postgres warehouse on sqlx.
//!
//! Dimension inserts use `ON CONFLICT DO NOTHING RETURNING`, so a lost race
//! yields no row instead of an aborted transaction. Fact upserts are generated
//! once per domain table from the declared merge policy.

use super::{GeographyId, MetricValues, TimeId, Warehouse};
use crate::error::StoreError;
use crate::observation::ObservationKey;
use crate::registrar::{IndicatorDescriptor, SourceDescriptor};
use crate::schema::{Domain, DomainTable};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

/// `INSERT ... ON CONFLICT DO UPDATE` statement for a domain table.
///
/// Parameters are `$1..$4` for the natural key followed by one per metric
/// column in declaration order.
pub fn upsert_sql(table: &DomainTable) -> String {
    let name = table.name();
    let columns: Vec<&str> = table.columns.iter().map(|c| c.name).collect();
    let placeholders: Vec<String> = (1..=columns.len() + 4).map(|i| format!("${i}")).collect();
    let assignments: Vec<String> = table
        .columns
        .iter()
        .map(|c| c.merge.sql_assignment(name, c.name))
        .collect();

    format!(
        "INSERT INTO {name} (geography_id, time_id, indicator_code, source, {}) \
         VALUES ({}) \
         ON CONFLICT (geography_id, time_id, indicator_code, source) DO UPDATE SET {}",
        columns.join(", "),
        placeholders.join(", "),
        assignments.join(", "),
    )
}

pub struct PgWarehouse {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    upserts: HashMap<Domain, String>,
}

impl PgWarehouse {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        let upserts = Domain::ALL
            .into_iter()
            .map(|d| (d, upsert_sql(d.table())))
            .collect();
        Self {
            pool,
            tx: None,
            upserts,
        }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))
    }

    // ── Job runs ──────────────────────────────────────────────────────────

    pub async fn start_run(&self, detail: serde_json::Value) -> Result<Uuid, StoreError> {
        let job_run_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO job_runs (job_run_id, component, status, detail)
            VALUES ($1, 'loader', 'running', $2)
            "#,
        )
        .bind(job_run_id)
        .bind(detail)
        .execute(&self.pool)
        .await?;
        Ok(job_run_id)
    }

    pub async fn finish_run(
        &self,
        job_run_id: Uuid,
        status: &str,
        error: Option<&str>,
        report: serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE job_runs
            SET finished_at = now(), status = $2, error = $3, detail = detail || $4
            WHERE job_run_id = $1
            "#,
        )
        .bind(job_run_id)
        .bind(status)
        .bind(error)
        .bind(report)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn quarter_param(quarter: Option<u8>) -> Option<i16> {
    quarter.map(i16::from)
}

impl Warehouse for PgWarehouse {
    async fn begin(&mut self) -> Result<(), StoreError> {
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::NoTransaction)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::NoTransaction)?;
        tx.rollback().await?;
        Ok(())
    }

    async fn find_geography(&mut self, country_code: &str) -> Result<Option<GeographyId>, StoreError> {
        let q = sqlx::query_scalar::<_, GeographyId>("SELECT geography_id FROM geography WHERE country_code = $1")
            .bind(country_code);
        let id = match self.tx.as_mut() {
            Some(tx) => q.fetch_optional(&mut **tx).await?,
            None => q.fetch_optional(&self.pool).await?,
        };
        Ok(id)
    }

    async fn create_geography(
        &mut self,
        country_code: &str,
        country_name: &str,
    ) -> Result<Option<GeographyId>, StoreError> {
        let q = sqlx::query_scalar::<_, GeographyId>(
            r#"
            INSERT INTO geography (country_code, country_name)
            VALUES ($1, $2)
            ON CONFLICT (country_code) DO NOTHING
            RETURNING geography_id
            "#,
        )
        .bind(country_code)
        .bind(country_name);
        let id = match self.tx.as_mut() {
            Some(tx) => q.fetch_optional(&mut **tx).await?,
            None => q.fetch_optional(&self.pool).await?,
        };
        Ok(id)
    }

    async fn find_time(&mut self, year: i32, quarter: Option<u8>) -> Result<Option<TimeId>, StoreError> {
        let q = sqlx::query_scalar::<_, TimeId>(
            "SELECT time_id FROM time WHERE year = $1 AND quarter IS NOT DISTINCT FROM $2",
        )
        .bind(year)
        .bind(quarter_param(quarter));
        let id = match self.tx.as_mut() {
            Some(tx) => q.fetch_optional(&mut **tx).await?,
            None => q.fetch_optional(&self.pool).await?,
        };
        Ok(id)
    }

    async fn create_time(&mut self, year: i32, quarter: Option<u8>) -> Result<Option<TimeId>, StoreError> {
        let q = sqlx::query_scalar::<_, TimeId>(
            r#"
            INSERT INTO time (year, quarter)
            VALUES ($1, $2)
            ON CONFLICT (year, quarter) DO NOTHING
            RETURNING time_id
            "#,
        )
        .bind(year)
        .bind(quarter_param(quarter));
        let id = match self.tx.as_mut() {
            Some(tx) => q.fetch_optional(&mut **tx).await?,
            None => q.fetch_optional(&self.pool).await?,
        };
        Ok(id)
    }

    async fn upsert_observation(
        &mut self,
        table: &'static DomainTable,
        key: &ObservationKey,
        values: &MetricValues,
    ) -> Result<(), StoreError> {
        let sql = self
            .upserts
            .get(&table.domain)
            .ok_or_else(|| StoreError::Rejected(format!("no statement for {}", table.name())))?;

        let mut q = sqlx::query(sql)
            .bind(key.geography_id)
            .bind(key.time_id)
            .bind(&key.indicator_code)
            .bind(&key.source);
        for column in table.columns {
            q = q.bind(values.get(column.name).copied().flatten());
        }

        match self.tx.as_mut() {
            Some(tx) => q.execute(&mut **tx).await?,
            None => q.execute(&self.pool).await?,
        };
        Ok(())
    }

    async fn upsert_data_source(
        &mut self,
        source: &SourceDescriptor,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let q = sqlx::query(
            r#"
            INSERT INTO data_source (name, description, url, type, last_updated)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO UPDATE SET
                description = EXCLUDED.description,
                url = EXCLUDED.url,
                type = EXCLUDED.type,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(&source.name)
        .bind(&source.description)
        .bind(&source.url)
        .bind(&source.kind)
        .bind(at);
        match self.tx.as_mut() {
            Some(tx) => q.execute(&mut **tx).await?,
            None => q.execute(&self.pool).await?,
        };
        Ok(())
    }

    async fn upsert_indicator(
        &mut self,
        indicator: &IndicatorDescriptor,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let q = sqlx::query(
            r#"
            INSERT INTO indicator (code, name, description, source, unit, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (code) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                source = EXCLUDED.source,
                unit = EXCLUDED.unit,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(&indicator.code)
        .bind(&indicator.name)
        .bind(&indicator.description)
        .bind(&indicator.source)
        .bind(&indicator.unit)
        .bind(at);
        match self.tx.as_mut() {
            Some(tx) => q.execute(&mut **tx).await?,
            None => q.execute(&self.pool).await?,
        };
        Ok(())
    }
}
