//! Core types and shared functionality for mangashelf.
//!
//! This crate provides:
//! - Content identity and source URL validation
//! - The on-disk cache: layout, index, eviction and page access
//! - SQLite source catalog
//! - Unified error types
//! - Configuration structures

pub mod archive;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;

pub use archive::ArchiveFormat;
pub use cache::{CacheEntry, CacheEvictor, CacheIndex, CacheLayout, PageServer, PageSlice};
pub use catalog::{CatalogDb, SourceRecord};
pub use config::AppConfig;
pub use error::Error;
pub use identity::{ContentIdentity, compute_identity};
