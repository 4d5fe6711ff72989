//! Loader settings from the environment (`.env` is loaded by the binary).

use crate::resolver::DimensionPolicy;
use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: Option<String>,
    pub cache_dir: PathBuf,
    pub db_max_connections: u32,
    pub min_year: i32,
    pub max_year: i32,
    pub create_missing_geography: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparseable numbers fall back to defaults.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str, default: i64| -> i64 {
            get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        };

        let config = Self {
            db_url: get("DB_URL").filter(|v| !v.trim().is_empty()),
            cache_dir: PathBuf::from(get("CACHE_DIR").unwrap_or_else(|| "./data_cache".to_string())),
            db_max_connections: u32::try_from(parsed("DB_MAX_CONNECTIONS", 5)).unwrap_or(5),
            min_year: i32::try_from(parsed("MIN_YEAR", 1900)).unwrap_or(1900),
            max_year: i32::try_from(parsed("MAX_YEAR", 2100)).unwrap_or(2100),
            create_missing_geography: get("CREATE_MISSING_GEOGRAPHY")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(true),
        };

        if config.min_year > config.max_year {
            anyhow::bail!(
                "MIN_YEAR ({}) is greater than MAX_YEAR ({})",
                config.min_year,
                config.max_year
            );
        }
        Ok(config)
    }

    pub fn db_url(&self) -> Result<&str> {
        self.db_url.as_deref().context("DB_URL env var missing")
    }

    pub fn dimension_policy(&self) -> DimensionPolicy {
        DimensionPolicy {
            years: self.min_year..=self.max_year,
            create_missing_geography: self.create_missing_geography,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert!(c.db_url.is_none());
        assert!(c.db_url().is_err());
        assert_eq!(c.cache_dir, PathBuf::from("./data_cache"));
        assert_eq!(c.db_max_connections, 5);
        assert_eq!(c.dimension_policy(), DimensionPolicy::default());
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("DB_URL", "postgres://localhost/polmatrix"),
            ("CACHE_DIR", "/tmp/cache"),
            ("MIN_YEAR", "1960"),
            ("MAX_YEAR", "2030"),
            ("CREATE_MISSING_GEOGRAPHY", "false"),
            ("DB_MAX_CONNECTIONS", "oops"),
        ])
        .unwrap();
        assert_eq!(c.db_url().unwrap(), "postgres://localhost/polmatrix");
        assert_eq!(c.db_max_connections, 5);
        let policy = c.dimension_policy();
        assert_eq!(policy.years, 1960..=2030);
        assert!(!policy.create_missing_geography);
    }

    #[test]
    fn test_inverted_year_window_rejected() {
        assert!(config(&[("MIN_YEAR", "2050"), ("MAX_YEAR", "2000")]).is_err());
    }
}
