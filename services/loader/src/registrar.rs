//! Metadata registrar: keeps the `data_source` and `indicator` catalogs in
//! sync with what the pipeline knows about.
//!
//! Both catalogs are upserted by natural key. Every provided field is
//! overwritten and `last_updated` is refreshed on every call.

use crate::error::StoreError;
use crate::mapping::{self, IndicatorMapping};
use crate::store::Warehouse;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorDescriptor {
    pub code: String,
    pub name: String,
    pub description: String,
    pub source: String,
    pub unit: String,
}

impl From<&IndicatorMapping> for IndicatorDescriptor {
    fn from(m: &IndicatorMapping) -> Self {
        Self {
            code: m.code.to_string(),
            name: m.name.to_string(),
            description: format!("{} (feeds {})", m.name, m.column),
            source: m.source.to_string(),
            unit: m.unit.to_string(),
        }
    }
}

fn source(name: &str, description: &str, url: &str, kind: &str) -> SourceDescriptor {
    SourceDescriptor {
        name: name.to_string(),
        description: description.to_string(),
        url: url.to_string(),
        kind: kind.to_string(),
    }
}

/// Built-in data-source catalog.
pub fn default_sources() -> Vec<SourceDescriptor> {
    vec![
        source(
            mapping::WORLD_BANK,
            "World Bank Open Data",
            "https://data.worldbank.org/",
            "api",
        ),
        source(
            mapping::WHO,
            "World Health Organization Global Health Observatory",
            "https://www.who.int/data/gho",
            "api",
        ),
        source(mapping::UNICEF, "UNICEF Data Portal", "https://data.unicef.org/", "api"),
        source(mapping::OECD, "OECD Statistics", "https://stats.oecd.org/", "api"),
        source(
            mapping::EDGAR,
            "Emissions Database for Global Atmospheric Research",
            "https://edgar.jrc.ec.europa.eu/",
            "file",
        ),
    ]
}

/// Indicator catalog derived from the mapping table.
pub fn default_indicators() -> Vec<IndicatorDescriptor> {
    mapping::INDICATORS.iter().map(IndicatorDescriptor::from).collect()
}

pub async fn register_sources<W: Warehouse>(
    store: &mut W,
    sources: &[SourceDescriptor],
) -> Result<usize, StoreError> {
    let now = Utc::now();
    store.begin().await?;
    for s in sources {
        if let Err(e) = store.upsert_data_source(s, now).await {
            warn!(source = %s.name, error = %e, "data source upsert failed");
            store.rollback().await?;
            return Err(e);
        }
    }
    store.commit().await?;
    info!(count = sources.len(), "registered data sources");
    Ok(sources.len())
}

pub async fn register_indicators<W: Warehouse>(
    store: &mut W,
    indicators: &[IndicatorDescriptor],
) -> Result<usize, StoreError> {
    let now = Utc::now();
    store.begin().await?;
    for i in indicators {
        if let Err(e) = store.upsert_indicator(i, now).await {
            warn!(indicator = %i.code, error = %e, "indicator upsert failed");
            store.rollback().await?;
            return Err(e);
        }
    }
    store.commit().await?;
    info!(count = indicators.len(), "registered indicators");
    Ok(indicators.len())
}
