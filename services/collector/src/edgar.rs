//! EDGAR emission workbooks.
//!
//! EDGAR publishes its country totals as zipped spreadsheets rather than an
//! API. The extracted workbooks are read from a local directory; each holds
//! one row per country (or per country and sector) and one column per year.

use crate::fetch::{FetchError, Fetcher};
use crate::source::{FetchRequest, Source};
use calamine::{open_workbook_auto, Data, Range, Reader};
use loader::mapping::{standardize_country, IndicatorMapping, EDGAR};
use loader::{RawObservation, RawValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Workbook holding each EDGAR indicator.
const WORKBOOKS: &[(&str, &str)] = &[
    ("EDGAR_CO2_EMISSIONS", "IEA_EDGAR_CO2_1970_2022.xlsx"),
    ("EDGAR_CH4_EMISSIONS", "EDGAR_CH4_1970_2022.xlsx"),
    ("EDGAR_N2O_EMISSIONS", "EDGAR_N2O_1970_2022.xlsx"),
];

const TOTALS_SHEET: &str = "TOTALS BY COUNTRY";
const COUNTRY_COLUMNS: &[&str] = &["country_code_a3", "iso3", "country_code"];
/// Metadata rows sit above the header in the published files.
const HEADER_SEARCH_ROWS: usize = 20;

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn year_of(cell: &Data) -> Option<i32> {
    match cell {
        Data::Int(y) => i32::try_from(*y).ok(),
        Data::Float(y) if y.fract() == 0.0 => Some(*y as i32),
        Data::String(s) => {
            let s = s.trim();
            s.strip_prefix("Y_").unwrap_or(s).parse().ok()
        }
        _ => None,
    }
}

fn value_of(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(v) => Some(*v as f64),
        Data::Float(v) => Some(*v),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Country column index of a header row.
fn country_column(headers: &[String]) -> Option<usize> {
    COUNTRY_COLUMNS.iter().find_map(|candidate| {
        headers
            .iter()
            .position(|h| h.to_lowercase() == *candidate)
    })
}

/// Decode one sheet. Sector rows of the same country are summed; empty and
/// zero cells are skipped.
pub fn parse_sheet(range: &Range<Data>, indicator: &str, request: &FetchRequest) -> Vec<RawObservation> {
    let rows: Vec<&[Data]> = range.rows().collect();
    let Some((header_idx, country_col)) = rows
        .iter()
        .take(HEADER_SEARCH_ROWS)
        .enumerate()
        .find_map(|(idx, row)| {
            let headers: Vec<String> = row.iter().map(cell_text).collect();
            country_column(&headers).map(|col| (idx, col))
        })
    else {
        return Vec::new();
    };

    let years: Vec<(usize, i32)> = rows[header_idx]
        .iter()
        .enumerate()
        .filter_map(|(col, cell)| year_of(cell).map(|y| (col, y)))
        .filter(|(_, y)| (request.start_year..=request.end_year).contains(y))
        .collect();
    let wanted: Vec<String> = request
        .countries
        .iter()
        .map(|c| standardize_country(c).into_string())
        .collect();

    let mut totals: BTreeMap<(String, i32), f64> = BTreeMap::new();
    for row in &rows[header_idx + 1..] {
        let country = row.get(country_col).map(cell_text).unwrap_or_default().to_uppercase();
        if country.is_empty() || (!wanted.is_empty() && !wanted.contains(&country)) {
            continue;
        }
        for &(col, year) in &years {
            match row.get(col).and_then(value_of) {
                Some(v) if v != 0.0 => *totals.entry((country.clone(), year)).or_insert(0.0) += v,
                _ => {}
            }
        }
    }

    totals
        .into_iter()
        .map(|((country, year), value)| RawObservation {
            country_code: country,
            year,
            quarter: None,
            indicator_source_code: indicator.to_string(),
            value: Some(RawValue::Number(value)),
            source_name: EDGAR.to_string(),
        })
        .collect()
}

fn read_workbook(path: &Path, indicator: &str, request: &FetchRequest) -> Result<Vec<RawObservation>, FetchError> {
    let workbook_error = |reason: String| FetchError::Workbook {
        path: path.display().to_string(),
        reason,
    };
    let mut workbook = open_workbook_auto(path).map_err(|e| workbook_error(e.to_string()))?;
    let sheet_names = workbook.sheet_names().to_vec();
    let sheet = sheet_names
        .iter()
        .find(|s| s.eq_ignore_ascii_case(TOTALS_SHEET))
        .or_else(|| sheet_names.first())
        .cloned()
        .ok_or_else(|| workbook_error("workbook has no sheets".to_string()))?;
    debug!(file = %path.display(), sheet = %sheet, "reading EDGAR sheet");
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| workbook_error(e.to_string()))?;
    Ok(parse_sheet(&range, indicator, request))
}

pub struct Edgar {
    dir: PathBuf,
}

impl Edgar {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn workbook(&self, indicator: &str) -> Option<PathBuf> {
        WORKBOOKS
            .iter()
            .find(|(code, _)| *code == indicator)
            .map(|(_, file)| self.dir.join(file))
    }
}

impl Source for Edgar {
    fn name(&self) -> &'static str {
        EDGAR
    }

    async fn fetch_indicator(
        &self,
        _fetcher: &Fetcher,
        indicator: &'static IndicatorMapping,
        request: &FetchRequest,
    ) -> Vec<RawObservation> {
        let Some(path) = self.workbook(indicator.code) else {
            warn!(source = EDGAR, indicator = indicator.code, "no workbook known for indicator");
            return Vec::new();
        };
        let request = request.clone();
        let code = indicator.code;
        // Spreadsheet decoding is blocking work.
        let read = tokio::task::spawn_blocking(move || read_workbook(&path, code, &request)).await;
        match read {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => {
                warn!(source = EDGAR, indicator = code, error = %e, "workbook read failed");
                Vec::new()
            }
            Err(e) => {
                warn!(source = EDGAR, indicator = code, error = %e, "workbook task failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(cells: Vec<Vec<Data>>) -> Range<Data> {
        let height = cells.len() as u32;
        let width = cells.iter().map(|r| r.len()).max().unwrap_or(1) as u32;
        let mut range = Range::new((0, 0), (height - 1, width - 1));
        for (r, row) in cells.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                range.set_value((r as u32, c as u32), cell.clone());
            }
        }
        range
    }

    fn text(s: &str) -> Data {
        Data::String(s.to_string())
    }

    fn request(countries: &[&str]) -> FetchRequest {
        FetchRequest {
            start_year: 2019,
            end_year: 2021,
            countries: countries.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_totals_sheet_below_metadata_rows() {
        let range = sheet(vec![
            vec![text("Emissions Database for Global Atmospheric Research")],
            vec![Data::Empty],
            vec![text("IPCC_annex"), text("Country_code_A3"), text("Name"), Data::Float(2018.0), text("Y_2019"), Data::Int(2020)],
            vec![text("Annex_I"), text("USA"), text("United States"), Data::Float(5.0), Data::Float(5100.5), Data::Float(4700.0)],
            vec![text("Non-Annex_I"), text("NGA"), text("Nigeria"), Data::Float(1.0), Data::Float(0.0), Data::Empty],
        ]);

        let rows = parse_sheet(&range, "EDGAR_CO2_EMISSIONS", &request(&[]));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], RawObservation::new("USA", 2019, "EDGAR_CO2_EMISSIONS", 5100.5, "edgar"));
        assert_eq!((rows[1].year, rows[1].value.clone()), (2020, Some(RawValue::Number(4700.0))));
    }

    #[test]
    fn test_sector_rows_are_summed_and_countries_filtered() {
        let range = sheet(vec![
            vec![text("Country_code_A3"), text("Substance"), text("Y_2019")],
            vec![text("DEU"), text("CH4"), Data::Float(10.0)],
            vec![text("DEU"), text("CH4"), Data::Float(2.5)],
            vec![text("FRA"), text("CH4"), Data::Float(7.0)],
        ]);

        let rows = parse_sheet(&range, "EDGAR_CH4_EMISSIONS", &request(&["DE"]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].country_code, "DEU");
        assert_eq!(rows[0].value, Some(RawValue::Number(12.5)));
    }

    #[test]
    fn test_sheet_without_country_column_is_empty() {
        let range = sheet(vec![vec![text("Name"), text("Y_2019")], vec![text("Germany"), Data::Float(1.0)]]);
        assert!(parse_sheet(&range, "EDGAR_N2O_EMISSIONS", &request(&[])).is_empty());
    }

    #[test]
    fn test_every_edgar_indicator_has_a_workbook() {
        let edgar = Edgar::new("/data/edgar");
        for m in loader::mapping::indicators_for(EDGAR) {
            assert!(edgar.workbook(m.code).is_some(), "{}", m.code);
        }
    }
}
