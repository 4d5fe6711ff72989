//! Dimension resolver: maps natural keys to `geography` and `time` ids.
//!
//! Lookup-or-create, cached per process. A create that loses a race to a
//! concurrent writer is retried as a lookup. Ids created inside a transaction
//! are held as pending until the caller commits or rolls back, so a rollback
//! never leaves a dangling id in the cache.

use crate::error::{DimensionError, DimensionKind};
use crate::store::{GeographyId, TimeId, Warehouse};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use tracing::{debug, info};

/// Which inputs may create dimension rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionPolicy {
    pub years: RangeInclusive<i32>,
    pub create_missing_geography: bool,
}

impl Default for DimensionPolicy {
    fn default() -> Self {
        Self {
            years: 1900..=2100,
            create_missing_geography: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct DimensionResolver {
    policy: DimensionPolicy,
    geographies: HashMap<String, GeographyId>,
    times: HashMap<(i32, Option<u8>), TimeId>,
    pending_geographies: Vec<String>,
    pending_times: Vec<(i32, Option<u8>)>,
}

impl DimensionResolver {
    pub fn new(policy: DimensionPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub async fn resolve_geography<W: Warehouse>(
        &mut self,
        store: &mut W,
        country_code: &str,
    ) -> Result<GeographyId, DimensionError> {
        let code = country_code.trim();
        if code.is_empty() {
            return Err(DimensionError::OutOfPolicy {
                kind: DimensionKind::Geography,
                key: country_code.to_string(),
                reason: "empty country code".to_string(),
            });
        }
        if let Some(id) = self.geographies.get(code) {
            return Ok(*id);
        }

        if let Some(id) = store.find_geography(code).await? {
            self.geographies.insert(code.to_string(), id);
            return Ok(id);
        }

        if !self.policy.create_missing_geography {
            return Err(DimensionError::Unknown {
                kind: DimensionKind::Geography,
                key: code.to_string(),
            });
        }

        // Placeholder name until the geography is enriched.
        let id = match store.create_geography(code, code).await? {
            Some(id) => {
                info!(country = code, geography_id = id, "created geography");
                self.pending_geographies.push(code.to_string());
                id
            }
            None => {
                debug!(country = code, "geography insert lost a race, retrying lookup");
                store
                    .find_geography(code)
                    .await?
                    .ok_or_else(|| DimensionError::Unresolvable {
                        kind: DimensionKind::Geography,
                        key: code.to_string(),
                    })?
            }
        };
        self.geographies.insert(code.to_string(), id);
        Ok(id)
    }

    pub async fn resolve_time<W: Warehouse>(
        &mut self,
        store: &mut W,
        year: i32,
        quarter: Option<u8>,
    ) -> Result<TimeId, DimensionError> {
        let key = time_key(year, quarter);
        if !self.policy.years.contains(&year) {
            return Err(DimensionError::OutOfPolicy {
                kind: DimensionKind::Time,
                key,
                reason: format!(
                    "year outside {}..={}",
                    self.policy.years.start(),
                    self.policy.years.end()
                ),
            });
        }
        if let Some(q) = quarter {
            if !(1..=4).contains(&q) {
                return Err(DimensionError::OutOfPolicy {
                    kind: DimensionKind::Time,
                    key,
                    reason: "quarter must be 1-4".to_string(),
                });
            }
        }
        if let Some(id) = self.times.get(&(year, quarter)) {
            return Ok(*id);
        }

        if let Some(id) = store.find_time(year, quarter).await? {
            self.times.insert((year, quarter), id);
            return Ok(id);
        }

        let id = match store.create_time(year, quarter).await? {
            Some(id) => {
                debug!(time = %key, time_id = id, "created time period");
                self.pending_times.push((year, quarter));
                id
            }
            None => store
                .find_time(year, quarter)
                .await?
                .ok_or(DimensionError::Unresolvable {
                    kind: DimensionKind::Time,
                    key,
                })?,
        };
        self.times.insert((year, quarter), id);
        Ok(id)
    }

    /// The enclosing transaction committed: created ids are now durable.
    pub fn commit(&mut self) {
        self.pending_geographies.clear();
        self.pending_times.clear();
    }

    /// The enclosing transaction rolled back: forget ids it created.
    pub fn rollback(&mut self) {
        for code in self.pending_geographies.drain(..) {
            self.geographies.remove(&code);
        }
        for key in self.pending_times.drain(..) {
            self.times.remove(&key);
        }
    }
}

fn time_key(year: i32, quarter: Option<u8>) -> String {
    match quarter {
        Some(q) => format!("{year}-Q{q}"),
        None => year.to_string(),
    }
}
