//! Content-addressed cache of downloaded archives and their extracted pages.
//!
//! - `layout`: artifact naming under the cache root
//! - `scan`: grouped disk usage
//! - `index`: in-memory map of materialized entries
//! - `evict`: LRU eviction under the size ceiling
//! - `pages`: paginated page access

pub mod evict;
pub mod index;
pub mod layout;
pub mod pages;
pub mod scan;

pub use evict::{CacheEvictor, PinGuard, SweepReport};
pub use index::{CacheEntry, CacheIndex};
pub use layout::CacheLayout;
pub use pages::{PageSequence, PageServer, PageSlice};
