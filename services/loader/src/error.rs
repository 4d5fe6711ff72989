//! Error types for the load path.
//!
//! Data-quality findings (unmapped codes, malformed values) are not errors;
//! they live in the normalize report. What remains here is what can stop a
//! row, a domain batch, or the run.

use crate::schema::Domain;
use thiserror::Error;

/// Backend failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("no transaction in progress")]
    NoTransaction,

    #[error("write rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionKind {
    Geography,
    Time,
}

impl std::fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DimensionKind::Geography => f.write_str("geography"),
            DimensionKind::Time => f.write_str("time"),
        }
    }
}

/// Failure to resolve a dimension key.
#[derive(Error, Debug)]
pub enum DimensionError {
    /// Strict resolution: the row must pre-exist and does not.
    #[error("unknown {kind} '{key}'")]
    Unknown { kind: DimensionKind, key: String },

    /// Input outside the accepted policy; no key is fabricated for it.
    #[error("{kind} '{key}' rejected: {reason}")]
    OutOfPolicy {
        kind: DimensionKind,
        key: String,
        reason: String,
    },

    /// Insert lost a race and the retried lookup still found nothing.
    #[error("{kind} '{key}' could not be created or found")]
    Unresolvable { kind: DimensionKind, key: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure while writing a domain batch.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Per-row: the row is skipped and the batch continues.
    #[error("dimension resolution failed for {country_code}/{year}: {source}")]
    DimensionResolution {
        country_code: String,
        year: i32,
        #[source]
        source: DimensionError,
    },

    /// Per-batch: the domain transaction is rolled back.
    #[error("write failure on {domain}: {source}")]
    WriteFailure {
        domain: Domain,
        #[source]
        source: StoreError,
    },
}

/// Failure reading or writing a raw CSV file as a whole.
#[derive(Error, Debug)]
pub enum InterchangeError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
