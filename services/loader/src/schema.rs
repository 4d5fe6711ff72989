//! Canonical polmatrix schema: the seven domain tables, their metric columns
//! and the merge policy applied when an upsert hits an existing row.
//!
//! Every canonical column belongs to exactly one domain table. The tables are
//! declared once here and everything else (router, writer, SQL generation)
//! reads them instead of hardcoding column lists.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subject-area fact table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Economy,
    Health,
    Education,
    Environment,
    SocialDemographic,
    TechnologyInnovation,
    Trade,
}

impl Domain {
    pub const ALL: [Domain; 7] = [
        Domain::Economy,
        Domain::Health,
        Domain::Education,
        Domain::Environment,
        Domain::SocialDemographic,
        Domain::TechnologyInnovation,
        Domain::Trade,
    ];

    /// Table name in the relational schema.
    pub fn table_name(self) -> &'static str {
        match self {
            Domain::Economy => "economy",
            Domain::Health => "health",
            Domain::Education => "education",
            Domain::Environment => "environment",
            Domain::SocialDemographic => "social_demographic",
            Domain::TechnologyInnovation => "technology_innovation",
            Domain::Trade => "trade",
        }
    }

    pub fn table(self) -> &'static DomainTable {
        match self {
            Domain::Economy => &ECONOMY,
            Domain::Health => &HEALTH,
            Domain::Education => &EDUCATION,
            Domain::Environment => &ENVIRONMENT,
            Domain::SocialDemographic => &SOCIAL_DEMOGRAPHIC,
            Domain::TechnologyInnovation => &TECHNOLOGY_INNOVATION,
            Domain::Trade => &TRADE,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.table_name() == s.trim())
            .ok_or_else(|| format!("unknown domain '{}'", s))
    }
}

/// How an incoming value is combined with the stored one on conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Incoming value wins if present, otherwise the stored value is kept.
    OverwriteIfPresent,
    /// Greater of stored and incoming; a missing value never wins.
    Max,
    /// Stored plus incoming; a missing side counts as absent, not zero.
    Sum,
}

impl MergeStrategy {
    pub fn merge(self, existing: Option<f64>, incoming: Option<f64>) -> Option<f64> {
        match (self, existing, incoming) {
            (MergeStrategy::OverwriteIfPresent, existing, incoming) => incoming.or(existing),
            (MergeStrategy::Max, Some(a), Some(b)) => Some(a.max(b)),
            (MergeStrategy::Sum, Some(a), Some(b)) => Some(a + b),
            (_, existing, incoming) => incoming.or(existing),
        }
    }

    /// Right-hand side of the `DO UPDATE SET` assignment for `column`.
    pub fn sql_assignment(self, table: &str, column: &str) -> String {
        match self {
            MergeStrategy::OverwriteIfPresent => {
                format!("{column} = COALESCE(EXCLUDED.{column}, {table}.{column})")
            }
            // GREATEST ignores NULL arguments in Postgres.
            MergeStrategy::Max => {
                format!("{column} = GREATEST({table}.{column}, EXCLUDED.{column})")
            }
            MergeStrategy::Sum => format!(
                "{column} = COALESCE({table}.{column} + EXCLUDED.{column}, EXCLUDED.{column}, {table}.{column})"
            ),
        }
    }
}

/// Aggregate used for a derived metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Mean,
    Sum,
}

/// A metric computed from another column of the same table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derivation {
    pub base: &'static str,
    pub aggregate: Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub merge: MergeStrategy,
    pub derived: Option<Derivation>,
}

const fn metric(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        merge: MergeStrategy::OverwriteIfPresent,
        derived: None,
    }
}

const fn ceiling(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        merge: MergeStrategy::Max,
        derived: None,
    }
}

const fn mean_of(name: &'static str, base: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        merge: MergeStrategy::OverwriteIfPresent,
        derived: Some(Derivation {
            base,
            aggregate: Aggregate::Mean,
        }),
    }
}

const fn sum_of(name: &'static str, base: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        merge: MergeStrategy::OverwriteIfPresent,
        derived: Some(Derivation {
            base,
            aggregate: Aggregate::Sum,
        }),
    }
}

#[derive(Debug)]
pub struct DomainTable {
    pub domain: Domain,
    pub columns: &'static [ColumnSpec],
}

impl DomainTable {
    pub fn name(&self) -> &'static str {
        self.domain.table_name()
    }

    pub fn column(&self, name: &str) -> Option<&'static ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns fed directly by source indicators.
    pub fn source_columns(&self) -> impl Iterator<Item = &'static ColumnSpec> {
        self.columns.iter().filter(|c| c.derived.is_none())
    }

    /// Derived columns computed from `base`.
    pub fn derived_from<'a>(&self, base: &'a str) -> impl Iterator<Item = &'static ColumnSpec> + 'a {
        self.columns
            .iter()
            .filter(move |c| c.derived.map(|d| d.base == base).unwrap_or(false))
    }
}

pub static ECONOMY: DomainTable = DomainTable {
    domain: Domain::Economy,
    columns: &[
        metric("gdp_growth"),
        metric("gdp_per_capita_growth"),
        metric("unemployment_rate"),
        ceiling("inflation_rate"),
        metric("trade_balance"),
        metric("foreign_direct_investment"),
        metric("gdp_per_capita"),
        mean_of("average_gdp_growth", "gdp_growth"),
    ],
};

pub static HEALTH: DomainTable = DomainTable {
    domain: Domain::Health,
    columns: &[
        metric("life_expectancy"),
        metric("maternal_mortality_ratio"),
        metric("healthcare_expenditure"),
        metric("infant_mortality"),
        metric("under5_mortality_per_1k"),
        metric("physicians_per_1k"),
        metric("hospital_beds_per_10k"),
        metric("suicide_rate_per_100k"),
        mean_of("average_life_expectancy", "life_expectancy"),
        sum_of("total_healthcare_expenditure", "healthcare_expenditure"),
    ],
};

pub static EDUCATION: DomainTable = DomainTable {
    domain: Domain::Education,
    columns: &[
        metric("literacy_rate"),
        metric("enrollment_primary"),
        metric("enrollment_secondary"),
        metric("enrollment_tertiary"),
        metric("government_expenditure_pct_gdp"),
        metric("primary_completion_rate"),
        mean_of("average_literacy_rate", "literacy_rate"),
        sum_of("total_education_expenditure", "government_expenditure_pct_gdp"),
    ],
};

pub static ENVIRONMENT: DomainTable = DomainTable {
    domain: Domain::Environment,
    columns: &[
        metric("co2_emissions"),
        metric("pm25"),
        metric("forest_area_pct"),
        metric("freshwater_withdrawal_pct"),
        metric("electric_power_kwh_pc"),
        metric("energy_use_kg_oil_pc"),
        metric("ghg_emissions"),
        metric("ch4_emissions"),
        metric("n2o_emissions"),
        sum_of("total_co2_emissions", "co2_emissions"),
    ],
};

pub static SOCIAL_DEMOGRAPHIC: DomainTable = DomainTable {
    domain: Domain::SocialDemographic,
    columns: &[
        metric("population_total"),
        metric("population_growth"),
        metric("fertility_rate"),
        metric("age_dependency_ratio"),
        metric("gini_index"),
        metric("poverty_rate"),
        metric("homicide_rate"),
        metric("child_labor"),
        metric("stunting_rate"),
        metric("immunization_dpt"),
    ],
};

pub static TECHNOLOGY_INNOVATION: DomainTable = DomainTable {
    domain: Domain::TechnologyInnovation,
    columns: &[
        metric("internet_usage"),
        metric("mobile_subscriptions"),
        metric("scientific_articles"),
        metric("patent_applications"),
        metric("research_expenditure"),
        metric("broadband_subscriptions"),
        metric("innovation_index"),
    ],
};

pub static TRADE: DomainTable = DomainTable {
    domain: Domain::Trade,
    columns: &[
        metric("trade_percentage_of_gdp"),
        metric("ip_payments"),
        metric("high_tech_exports"),
        metric("trade_balance_goods"),
        metric("trade_balance_services"),
        metric("exports_of_goods_services"),
    ],
};

/// Domain owning `column`, if it is canonical.
pub fn domain_of(column: &str) -> Option<Domain> {
    Domain::ALL
        .into_iter()
        .find(|d| d.table().column(column).is_some())
}
