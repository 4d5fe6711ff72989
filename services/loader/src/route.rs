//! Domain router: splits widened rows into per-domain row sets.

use crate::observation::{DomainRow, NormalizedObservation};
use crate::schema::Domain;
use std::collections::BTreeMap;

/// Row sets keyed by domain. Every domain is present, possibly empty.
pub type Routed = BTreeMap<Domain, Vec<DomainRow>>;

/// Route normalized rows to the domain tables.
///
/// A row contributes to a domain iff one of that domain's columns holds a
/// non-null value. It contributes one domain row per source indicator with a
/// value, carrying that indicator's column and the derived columns computed
/// from it, so each row matches exactly one stored natural key.
pub fn route(rows: &[NormalizedObservation]) -> Routed {
    let mut routed: Routed = Domain::ALL.into_iter().map(|d| (d, Vec::new())).collect();

    for row in rows {
        for domain in Domain::ALL {
            let table = domain.table();
            for column in table.source_columns() {
                let Some(cell) = row.cells.get(column.name) else {
                    continue;
                };
                if cell.value.is_none() {
                    continue;
                }

                let mut values = BTreeMap::new();
                values.insert(column.name, cell.value);
                for derived in table.derived_from(column.name) {
                    if let Some(v) = row.derived.get(derived.name) {
                        values.insert(derived.name, *v);
                    }
                }

                if let Some(out) = routed.get_mut(&domain) {
                    out.push(DomainRow {
                        country_code: row.key.country_code.clone(),
                        year: row.key.year,
                        quarter: row.key.quarter,
                        source: row.key.source.clone(),
                        indicator_code: cell.indicator_code.clone(),
                        values,
                    });
                }
            }
        }
    }

    routed
}
