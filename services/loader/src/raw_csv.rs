//! Raw CSV interchange between the collector and the loader.
//!
//! Canonical header: `country_code,year,quarter,indicator_code,value,source`.
//! Readers also accept the column names used by the upstream portals.

use crate::error::InterchangeError;
use crate::observation::{RawObservation, RawValue};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(alias = "country", alias = "iso3", alias = "ref_area", alias = "countryiso3code")]
    country_code: String,
    #[serde(alias = "date", alias = "time_period")]
    year: String,
    #[serde(default)]
    quarter: Option<u8>,
    #[serde(alias = "indicator", alias = "indicator_source_code")]
    indicator_code: String,
    #[serde(default, alias = "obs_value")]
    value: Option<String>,
    #[serde(default, alias = "source_name")]
    source: Option<String>,
}

/// Raw observations read from one file.
#[derive(Debug, Default)]
pub struct RawBatch {
    pub observations: Vec<RawObservation>,
    pub skipped_lines: usize,
}

/// Split a period label into year and optional quarter.
///
/// Accepts `2021`, `2021-Q3`, `2021Q3` and `2021-03` style monthly labels
/// (mapped to their quarter).
pub fn parse_period(label: &str) -> Option<(i32, Option<u8>)> {
    let label = label.trim();
    if label.len() < 4 || !label.is_char_boundary(4) {
        return None;
    }
    let (year, rest) = label.split_at(4);
    let year: i32 = year.parse().ok()?;
    let rest = rest.trim_start_matches('-');
    if rest.is_empty() {
        return Some((year, None));
    }
    if let Some(q) = rest.strip_prefix('Q').or_else(|| rest.strip_prefix('q')) {
        let q: u8 = q.parse().ok()?;
        return (1..=4).contains(&q).then_some((year, Some(q)));
    }
    let month: u8 = rest.parse().ok()?;
    (1..=12).contains(&month).then(|| (year, Some((month - 1) / 3 + 1)))
}

/// Parse raw CSV content. Lines that cannot be read are skipped with a
/// warning; `default_source` fills rows that carry no source column.
pub fn parse_raw(content: &str, default_source: Option<&str>) -> Result<RawBatch, InterchangeError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    // Header names are matched case-insensitively.
    let headers: csv::StringRecord = reader
        .headers()?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    reader.set_headers(headers);

    let mut batch = RawBatch::default();
    for (idx, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = idx + 2;
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(line, error = %e, "skipping unreadable line");
                batch.skipped_lines += 1;
                continue;
            }
        };

        let Some((year, period_quarter)) = parse_period(&row.year) else {
            warn!(line, period = %row.year, "skipping line with unreadable period");
            batch.skipped_lines += 1;
            continue;
        };
        let quarter = match (row.quarter, period_quarter) {
            (Some(column), Some(label)) if column != label => {
                warn!(
                    line,
                    period = %row.year,
                    quarter = column,
                    "skipping line whose quarter column disagrees with its period"
                );
                batch.skipped_lines += 1;
                continue;
            }
            (column, label) => column.or(label),
        };
        let source = match row.source.filter(|s| !s.is_empty()) {
            Some(s) => s,
            None => match default_source {
                Some(s) => s.to_string(),
                None => {
                    warn!(line, "skipping line without a source");
                    batch.skipped_lines += 1;
                    continue;
                }
            },
        };

        batch.observations.push(RawObservation {
            country_code: row.country_code,
            year,
            quarter,
            indicator_source_code: row.indicator_code,
            value: row.value.map(RawValue::Text),
            source_name: source,
        });
    }
    Ok(batch)
}

pub fn read_raw_file(path: &Path, default_source: Option<&str>) -> Result<RawBatch, InterchangeError> {
    let content = std::fs::read_to_string(path).map_err(|source| InterchangeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_raw(&content, default_source)
}

/// Write observations in the canonical layout.
pub fn write_raw<W: Write>(out: W, rows: &[RawObservation]) -> Result<(), InterchangeError> {
    let mut writer = csv::Writer::from_writer(out);
    for r in rows {
        writer.serialize(CsvRow {
            country_code: r.country_code.clone(),
            year: r.year.to_string(),
            quarter: r.quarter,
            indicator_code: r.indicator_source_code.clone(),
            value: r.value.as_ref().map(|v| match v {
                RawValue::Number(n) => n.to_string(),
                RawValue::Text(s) => s.clone(),
            }),
            source: Some(r.source_name.clone()),
        })?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn write_raw_file(path: &Path, rows: &[RawObservation]) -> Result<(), InterchangeError> {
    let file = std::fs::File::create(path).map_err(|source| InterchangeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    write_raw(std::io::BufWriter::new(file), rows)
}
