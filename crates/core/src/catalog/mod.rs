//! SQLite-backed catalog of known sources.
//!
//! Archive URLs cannot be recovered from file names, so the catalog keeps
//! `identity -> (url, title, format)` for every successfully prepared
//! source. It outlives eviction and purge: an evicted identity can be
//! re-materialized from its catalog record.

pub mod connection;
pub mod migrations;
pub mod sources;

pub use connection::CatalogDb;
pub use sources::SourceRecord;
