//! The `Warehouse` trait: the relational target the pipeline writes into.
//!
//! Implemented by [`PgWarehouse`] (Postgres via sqlx) and
//! [`MemoryWarehouse`] (dry runs and tests). The resolver, writer and
//! registrar only depend on this trait.

use crate::error::StoreError;
use crate::observation::ObservationKey;
use crate::registrar::{IndicatorDescriptor, SourceDescriptor};
use crate::schema::DomainTable;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::future::Future;

pub mod memory;
pub mod postgres;

pub use memory::MemoryWarehouse;
pub use postgres::PgWarehouse;

pub type GeographyId = i32;
pub type TimeId = i32;

/// Metric values for one observation, keyed by column name.
pub type MetricValues = BTreeMap<&'static str, Option<f64>>;

pub trait Warehouse: Send {
    // ── Transaction scope ─────────────────────────────────────────────────

    /// Open a transaction; subsequent calls run inside it until
    /// [`commit`](Self::commit) or [`rollback`](Self::rollback).
    fn begin(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn commit(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn rollback(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;

    // ── Dimensions ────────────────────────────────────────────────────────

    fn find_geography(
        &mut self,
        country_code: &str,
    ) -> impl Future<Output = Result<Option<GeographyId>, StoreError>> + Send;

    /// Insert a geography row. Returns `None` when a row with the same code
    /// already exists (e.g. a concurrent insert won).
    fn create_geography(
        &mut self,
        country_code: &str,
        country_name: &str,
    ) -> impl Future<Output = Result<Option<GeographyId>, StoreError>> + Send;

    fn find_time(
        &mut self,
        year: i32,
        quarter: Option<u8>,
    ) -> impl Future<Output = Result<Option<TimeId>, StoreError>> + Send;

    /// Insert a time row. Returns `None` when `(year, quarter)` already exists.
    fn create_time(
        &mut self,
        year: i32,
        quarter: Option<u8>,
    ) -> impl Future<Output = Result<Option<TimeId>, StoreError>> + Send;

    // ── Facts ─────────────────────────────────────────────────────────────

    /// Insert or merge one observation into `table`, applying the table's
    /// per-column merge policy on conflict with `key`.
    fn upsert_observation(
        &mut self,
        table: &'static DomainTable,
        key: &ObservationKey,
        values: &MetricValues,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // ── Catalogs ──────────────────────────────────────────────────────────

    fn upsert_data_source(
        &mut self,
        source: &SourceDescriptor,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn upsert_indicator(
        &mut self,
        indicator: &IndicatorDescriptor,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
