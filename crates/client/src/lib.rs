//! Client code for mangashelf.
//!
//! This crate provides the archive download pipeline, format-specific
//! extraction with page normalization, and the [`Library`] that serves the
//! result to the server.

pub mod extract;
pub mod fetch;
pub mod library;

pub use extract::{ArchiveExtractor, Extractors, NormalizeOptions, RarExtractor, ZipExtractor};
pub use fetch::{FetchClient, FetchConfig, FetchOutcome};
pub use library::{CacheStatus, Library, ReadyEntry};
