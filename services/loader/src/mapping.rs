//! Static mapping tables: source indicator codes to canonical columns, and
//! ISO 3166 alpha-2 country codes to alpha-3.
//!
//! Both tables are built once on first use and never mutated.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// One source-specific indicator and the canonical column it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorMapping {
    pub code: &'static str,
    pub column: &'static str,
    pub source: &'static str,
    pub name: &'static str,
    pub unit: &'static str,
}

const fn ind(
    code: &'static str,
    column: &'static str,
    source: &'static str,
    name: &'static str,
    unit: &'static str,
) -> IndicatorMapping {
    IndicatorMapping {
        code,
        column,
        source,
        name,
        unit,
    }
}

pub const WORLD_BANK: &str = "world_bank";
pub const WHO: &str = "who";
pub const UNICEF: &str = "unicef";
pub const OECD: &str = "oecd";
pub const EDGAR: &str = "edgar";

pub static INDICATORS: &[IndicatorMapping] = &[
    // World Bank: economy
    ind("NY.GDP.MKTP.KD.ZG", "gdp_growth", WORLD_BANK, "GDP growth (annual %)", "%"),
    ind("NY.GDP.PCAP.KD.ZG", "gdp_per_capita_growth", WORLD_BANK, "GDP per capita growth (annual %)", "%"),
    ind("NY.GDP.PCAP.CD", "gdp_per_capita", WORLD_BANK, "GDP per capita (current US$)", "USD"),
    ind("FP.CPI.TOTL.ZG", "inflation_rate", WORLD_BANK, "Inflation, consumer prices (annual %)", "%"),
    ind("SL.UEM.TOTL.ZS", "unemployment_rate", WORLD_BANK, "Unemployment, total (% of labor force)", "%"),
    ind("BX.KLT.DINV.CD.WD", "foreign_direct_investment", WORLD_BANK, "Foreign direct investment, net inflows (BoP, current US$)", "USD"),
    ind("BN.CAB.XOKA.GD.ZS", "trade_balance", WORLD_BANK, "Current account balance (% of GDP)", "% of GDP"),
    // World Bank: health
    ind("SH.XPD.CHEX.GD.ZS", "healthcare_expenditure", WORLD_BANK, "Current health expenditure (% of GDP)", "% of GDP"),
    ind("SH.DYN.MORT", "under5_mortality_per_1k", WORLD_BANK, "Mortality rate, under-5 (per 1,000 live births)", "per 1,000"),
    ind("SH.STA.MMRT", "maternal_mortality_ratio", WORLD_BANK, "Maternal mortality ratio (per 100,000 live births)", "per 100,000"),
    ind("SH.MED.PHYS.ZS", "physicians_per_1k", WORLD_BANK, "Physicians (per 1,000 people)", "per 1,000"),
    // World Bank: education
    ind("SE.PRM.ENRR", "enrollment_primary", WORLD_BANK, "School enrollment, primary (% gross)", "%"),
    ind("SE.SEC.ENRR", "enrollment_secondary", WORLD_BANK, "School enrollment, secondary (% gross)", "%"),
    ind("SE.TER.ENRR", "enrollment_tertiary", WORLD_BANK, "School enrollment, tertiary (% gross)", "%"),
    ind("SE.XPD.TOTL.GD.ZS", "government_expenditure_pct_gdp", WORLD_BANK, "Government expenditure on education, total (% of GDP)", "% of GDP"),
    ind("SE.ADT.LITR.ZS", "literacy_rate", WORLD_BANK, "Literacy rate, adult total (% of people ages 15 and above)", "%"),
    // World Bank: environment
    ind("EN.ATM.CO2E.PC", "co2_emissions", WORLD_BANK, "CO2 emissions (metric tons per capita)", "t per capita"),
    ind("EN.ATM.PM25.MC.M3", "pm25", WORLD_BANK, "PM2.5 air pollution, mean annual exposure", "µg/m³"),
    ind("AG.LND.FRST.ZS", "forest_area_pct", WORLD_BANK, "Forest area (% of land area)", "%"),
    ind("ER.H2O.FWTL.ZS", "freshwater_withdrawal_pct", WORLD_BANK, "Annual freshwater withdrawals (% of internal resources)", "%"),
    ind("EG.USE.ELEC.KH.PC", "electric_power_kwh_pc", WORLD_BANK, "Electric power consumption (kWh per capita)", "kWh per capita"),
    ind("EG.USE.PCAP.KG.OE", "energy_use_kg_oil_pc", WORLD_BANK, "Energy use (kg of oil equivalent per capita)", "kg oil eq. per capita"),
    // World Bank: social / demographic
    ind("SP.POP.TOTL", "population_total", WORLD_BANK, "Population, total", "people"),
    ind("SP.POP.GROW", "population_growth", WORLD_BANK, "Population growth (annual %)", "%"),
    ind("SP.DYN.TFRT.IN", "fertility_rate", WORLD_BANK, "Fertility rate, total (births per woman)", "births per woman"),
    ind("SP.POP.DPND.OL", "age_dependency_ratio", WORLD_BANK, "Age dependency ratio, old", "% of working-age"),
    ind("SI.POV.GINI", "gini_index", WORLD_BANK, "Gini index", "index"),
    ind("SI.POV.NAHC", "poverty_rate", WORLD_BANK, "Poverty headcount ratio at national poverty lines", "%"),
    ind("VC.IHR.PSRC.P5", "homicide_rate", WORLD_BANK, "Intentional homicides (per 100,000 people)", "per 100,000"),
    // World Bank: technology
    ind("IT.NET.USER.ZS", "internet_usage", WORLD_BANK, "Individuals using the Internet (% of population)", "%"),
    ind("IT.CEL.SETS.P2", "mobile_subscriptions", WORLD_BANK, "Mobile cellular subscriptions (per 100 people)", "per 100"),
    ind("IP.JRN.ARTC.SC", "scientific_articles", WORLD_BANK, "Scientific and technical journal articles", "articles"),
    ind("IP.PAT.RESD", "patent_applications", WORLD_BANK, "Patent applications, residents", "applications"),
    ind("GB.XPD.RSDV.GD.ZS", "research_expenditure", WORLD_BANK, "Research and development expenditure (% of GDP)", "% of GDP"),
    // World Bank: trade
    ind("TG.VAL.TOTL.GD.ZS", "trade_percentage_of_gdp", WORLD_BANK, "Merchandise trade (% of GDP)", "% of GDP"),
    ind("BM.GSR.ROYL.CD", "ip_payments", WORLD_BANK, "Charges for the use of intellectual property, payments", "USD"),
    ind("TX.VAL.TECH.MF.ZS", "high_tech_exports", WORLD_BANK, "High-technology exports (% of manufactured exports)", "%"),
    ind("NE.EXP.GNFS.ZS", "exports_of_goods_services", WORLD_BANK, "Exports of goods and services (% of GDP)", "% of GDP"),
    // WHO Global Health Observatory
    ind("WHOSIS_000001", "life_expectancy", WHO, "Life expectancy at birth (years)", "years"),
    ind("MDG_0000000001", "infant_mortality", WHO, "Infant mortality rate (per 1000 live births)", "per 1,000"),
    ind("MDG_0000000026", "maternal_mortality_ratio", WHO, "Maternal mortality ratio (per 100 000 live births)", "per 100,000"),
    ind("WHS6_102", "hospital_beds_per_10k", WHO, "Hospital beds (per 10 000 population)", "per 10,000"),
    ind("MH_12", "suicide_rate_per_100k", WHO, "Crude suicide rates (per 100 000 population)", "per 100,000"),
    // UNICEF dataflows
    ind("CHILD_LABOUR", "child_labor", UNICEF, "Child labour", "%"),
    ind("NUTRITION", "stunting_rate", UNICEF, "Stunting prevalence", "%"),
    ind("IMMUNIZATION", "immunization_dpt", UNICEF, "DTP3 immunization coverage", "%"),
    ind("EDUCATION", "primary_completion_rate", UNICEF, "Primary completion rate", "%"),
    // OECD
    ind("AIR_GHG", "ghg_emissions", OECD, "Greenhouse gas emissions", "t CO2 eq."),
    ind("BROADBAND", "broadband_subscriptions", OECD, "Fixed broadband subscriptions", "per 100"),
    ind("MSTI_PUB", "innovation_index", OECD, "Main science and technology indicators", "index"),
    ind("ITGS", "trade_balance_goods", OECD, "International trade in goods, balance", "USD"),
    ind("ITSI", "trade_balance_services", OECD, "International trade in services, balance", "USD"),
    // EDGAR
    ind("EDGAR_CO2_EMISSIONS", "co2_emissions", EDGAR, "CO2 emissions (EDGAR)", "kt"),
    ind("EDGAR_CH4_EMISSIONS", "ch4_emissions", EDGAR, "CH4 emissions (EDGAR)", "kt"),
    ind("EDGAR_N2O_EMISSIONS", "n2o_emissions", EDGAR, "N2O emissions (EDGAR)", "kt"),
];

static INDICATOR_INDEX: Lazy<HashMap<&'static str, &'static IndicatorMapping>> =
    Lazy::new(|| INDICATORS.iter().map(|m| (m.code, m)).collect());

static ISO2_TO_ISO3: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("US", "USA"), ("GB", "GBR"), ("DE", "DEU"), ("JP", "JPN"), ("CN", "CHN"),
        ("FR", "FRA"), ("IN", "IND"), ("AU", "AUS"), ("BR", "BRA"), ("CA", "CAN"),
        ("RU", "RUS"), ("ZA", "ZAF"), ("KR", "KOR"), ("TR", "TUR"), ("IT", "ITA"),
        ("ES", "ESP"), ("NL", "NLD"), ("BE", "BEL"), ("CH", "CHE"), ("SE", "SWE"),
        ("NO", "NOR"), ("DK", "DNK"), ("FI", "FIN"), ("AT", "AUT"), ("PL", "POL"),
        ("MX", "MEX"), ("ID", "IDN"), ("TH", "THA"), ("VN", "VNM"), ("PH", "PHL"),
        ("MY", "MYS"), ("SG", "SGP"), ("NZ", "NZL"), ("EG", "EGY"), ("NG", "NGA"),
        ("KE", "KEN"), ("MA", "MAR"), ("AE", "ARE"), ("SA", "SAU"), ("IL", "ISR"),
        ("IR", "IRN"), ("IQ", "IRQ"), ("PK", "PAK"), ("BD", "BGD"), ("LK", "LKA"),
        ("AR", "ARG"), ("CL", "CHL"), ("CO", "COL"), ("PE", "PER"), ("IE", "IRL"),
        ("PT", "PRT"), ("GR", "GRC"), ("CZ", "CZE"), ("HU", "HUN"), ("UA", "UKR"),
    ]
    .into_iter()
    .collect()
});

/// Canonical mapping for a source indicator code.
pub fn indicator(code: &str) -> Option<&'static IndicatorMapping> {
    INDICATOR_INDEX.get(code.trim()).copied()
}

/// Indicators published by `source`, in declaration order.
pub fn indicators_for(source: &str) -> impl Iterator<Item = &'static IndicatorMapping> + '_ {
    INDICATORS.iter().filter(move |m| m.source == source)
}

/// Result of standardizing a country code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountryCode {
    /// Known alpha-2 code translated to alpha-3.
    Mapped(String),
    /// Already looks like alpha-3; passed through.
    Iso3(String),
    /// Neither mapped nor alpha-3 shaped; passed through and flagged.
    Unmapped(String),
}

impl CountryCode {
    pub fn as_str(&self) -> &str {
        match self {
            CountryCode::Mapped(c) | CountryCode::Iso3(c) | CountryCode::Unmapped(c) => c,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            CountryCode::Mapped(c) | CountryCode::Iso3(c) | CountryCode::Unmapped(c) => c,
        }
    }
}

pub fn standardize_country(raw: &str) -> CountryCode {
    let code = raw.trim().to_ascii_uppercase();
    if let Some(iso3) = ISO2_TO_ISO3.get(code.as_str()) {
        return CountryCode::Mapped((*iso3).to_string());
    }
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        CountryCode::Iso3(code)
    } else {
        CountryCode::Unmapped(code)
    }
}
