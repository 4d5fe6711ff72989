//! Indicator normalizer.
//!
//! Maps raw long-format observations onto canonical columns and ISO3 country
//! codes, pivots them into one wide row per (country, year, quarter, source),
//! and attaches per-series derived metrics.
//!
//! Nothing in here fails: unmapped codes and unparseable values are dropped
//! or nulled and recorded in the [`NormalizeReport`].

use crate::mapping::{self, CountryCode};
use crate::observation::{
    CellValue, Coerced, NormalizedObservation, RawObservation, RawValue, SeriesKey,
};
use crate::schema::{Aggregate, Domain};
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    Indicator,
    Country,
}

/// A code with no canonical mapping, aggregated over the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingGap {
    pub kind: GapKind,
    pub code: String,
    pub source: String,
    pub occurrences: usize,
}

/// A value that could not be coerced to a number; treated as null.
///
/// The cell stays null unless a later occurrence for the same column
/// carries a parseable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedValue {
    pub source: String,
    pub indicator: String,
    pub country: String,
    pub year: i32,
    pub raw: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct NormalizeReport {
    pub input_rows: usize,
    pub mapping_gaps: Vec<MappingGap>,
    pub malformed: Vec<MalformedValue>,
    pub duplicates_dropped: usize,
}

impl NormalizeReport {
    fn record_gap(&mut self, kind: GapKind, code: &str, source: &str) -> bool {
        if let Some(gap) = self
            .mapping_gaps
            .iter_mut()
            .find(|g| g.kind == kind && g.code == code && g.source == source)
        {
            gap.occurrences += 1;
            return false;
        }
        self.mapping_gaps.push(MappingGap {
            kind,
            code: code.to_string(),
            source: source.to_string(),
            occurrences: 1,
        });
        true
    }
}

/// Normalize a batch of raw observations.
///
/// Rows come back ordered by (country, year, quarter, source). When the same
/// (group, column) appears more than once, the first occurrence carrying a
/// parseable value wins and every other occurrence, including a superseded
/// null, is counted as a dropped duplicate.
pub fn normalize<I>(raw_rows: I) -> (Vec<NormalizedObservation>, NormalizeReport)
where
    I: IntoIterator<Item = RawObservation>,
{
    let mut report = NormalizeReport::default();
    let mut groups: BTreeMap<SeriesKey, NormalizedObservation> = BTreeMap::new();

    for raw in raw_rows {
        report.input_rows += 1;

        let Some(mapping) = mapping::indicator(&raw.indicator_source_code) else {
            let first = report.record_gap(GapKind::Indicator, raw.indicator_source_code.trim(), &raw.source_name);
            if first {
                warn!(
                    source = %raw.source_name,
                    indicator = %raw.indicator_source_code,
                    country = %raw.country_code,
                    year = raw.year,
                    "No canonical column for indicator; dropping values"
                );
            } else {
                debug!(
                    source = %raw.source_name,
                    indicator = %raw.indicator_source_code,
                    country = %raw.country_code,
                    year = raw.year,
                    "Dropped unmapped indicator value"
                );
            }
            continue;
        };

        let country = match mapping::standardize_country(&raw.country_code) {
            CountryCode::Unmapped(code) => {
                if report.record_gap(GapKind::Country, &code, &raw.source_name) {
                    warn!(
                        source = %raw.source_name,
                        country = %code,
                        "Country code has no ISO3 mapping; passing through"
                    );
                }
                code
            }
            other => other.into_string(),
        };

        let value = match RawValue::coerce(raw.value.as_ref()) {
            Coerced::Value(v) => Some(v),
            Coerced::Missing => None,
            Coerced::Malformed => {
                let shown = match &raw.value {
                    Some(RawValue::Text(s)) => s.clone(),
                    Some(RawValue::Number(n)) => n.to_string(),
                    None => String::new(),
                };
                warn!(
                    source = %raw.source_name,
                    indicator = %raw.indicator_source_code,
                    country = %country,
                    year = raw.year,
                    raw = %shown,
                    "Malformed value; treating as null"
                );
                report.malformed.push(MalformedValue {
                    source: raw.source_name.clone(),
                    indicator: raw.indicator_source_code.clone(),
                    country: country.clone(),
                    year: raw.year,
                    raw: shown,
                });
                None
            }
        };

        let key = SeriesKey {
            country_code: country,
            year: raw.year,
            quarter: raw.quarter,
            source: raw.source_name,
        };
        let row = groups
            .entry(key.clone())
            .or_insert_with(|| NormalizedObservation::new(key));

        match row.cells.entry(mapping.column) {
            Entry::Vacant(slot) => {
                slot.insert(CellValue {
                    value,
                    indicator_code: mapping.code.to_string(),
                });
            }
            Entry::Occupied(mut slot) => {
                // An earlier null is superseded by the first parseable value.
                if slot.get().value.is_none() && value.is_some() {
                    slot.insert(CellValue {
                        value,
                        indicator_code: mapping.code.to_string(),
                    });
                    report.duplicates_dropped += 1;
                    debug!(
                        source = %row.key.source,
                        indicator = mapping.code,
                        country = %row.key.country_code,
                        year = row.key.year,
                        "Earlier null value superseded by a parseable one"
                    );
                } else {
                    report.duplicates_dropped += 1;
                    debug!(
                        source = %row.key.source,
                        indicator = mapping.code,
                        country = %row.key.country_code,
                        year = row.key.year,
                        "Duplicate value for column; keeping first"
                    );
                }
            }
        }
    }

    let mut rows: Vec<NormalizedObservation> = groups.into_values().collect();
    derive_metrics(&mut rows);
    (rows, report)
}

/// (country, source, quarterly) identity of a derived-metric series.
type SeriesId = (String, String, bool);

fn series_id(key: &SeriesKey) -> SeriesId {
    (key.country_code.clone(), key.source.clone(), key.quarter.is_some())
}

/// Attach per-series aggregates (mean, sum) declared on the domain tables.
///
/// Aggregates are taken per (country, source) series, with annual and
/// quarterly rows kept apart, ignoring null base values. The result is
/// attached to every row of that series whose base column is present.
pub fn derive_metrics(rows: &mut [NormalizedObservation]) {
    let derivations: Vec<(&'static str, &'static str, Aggregate)> = Domain::ALL
        .iter()
        .flat_map(|d| d.table().columns)
        .filter_map(|c| c.derived.map(|d| (c.name, d.base, d.aggregate)))
        .collect();

    for (column, base, aggregate) in derivations {
        let mut series: BTreeMap<SeriesId, (f64, usize)> = BTreeMap::new();
        for row in rows.iter() {
            if let Some(v) = row.cells.get(base).and_then(|c| c.value) {
                let acc = series.entry(series_id(&row.key)).or_insert((0.0, 0));
                acc.0 += v;
                acc.1 += 1;
            }
        }

        for row in rows.iter_mut() {
            if row.cells.get(base).and_then(|c| c.value).is_none() {
                continue;
            }
            if let Some((sum, count)) = series.get(&series_id(&row.key)) {
                let value = match aggregate {
                    Aggregate::Mean => sum / *count as f64,
                    Aggregate::Sum => *sum,
                };
                row.derived.insert(column, Some(value));
            }
        }
    }
}
