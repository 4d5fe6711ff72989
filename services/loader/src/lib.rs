//! polmatrix loader: normalizes raw indicator observations from the public
//! data portals and upserts them into the seven domain tables of the
//! polmatrix warehouse.
//!
//! Data flow: raw observations -> [`normalize()`] -> [`route()`] ->
//! [`writer::UpsertWriter`] (one transaction per domain), with the
//! [`registrar`] refreshing the indicator and data-source catalogs.

pub mod config;
pub mod error;
pub mod mapping;
pub mod normalize;
pub mod observation;
pub mod pipeline;
pub mod raw_csv;
pub mod registrar;
pub mod resolver;
pub mod route;
pub mod schema;
pub mod store;
pub mod writer;

pub use normalize::normalize;
pub use observation::{RawObservation, RawValue};
pub use pipeline::{run, RunReport};
pub use route::route;
pub use schema::Domain;
