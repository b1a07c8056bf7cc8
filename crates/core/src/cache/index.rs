//! In-memory index of materialized cache entries.
//!
//! The index is rebuilt from a directory scan at startup and afterwards kept
//! current by the library (on successful extraction), the page server (on
//! access) and the eviction engine (on deletion). Disk stays authoritative:
//! the eviction sweep always rescans.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use serde::Serialize;

use super::layout::CacheLayout;
use super::scan;
use crate::archive::ArchiveFormat;
use crate::catalog::SourceRecord;
use crate::identity::ContentIdentity;

/// The on-disk archive + extracted-image artifact set for one identity.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub identity: ContentIdentity,
    /// Unknown when the entry was found on disk without a catalog record.
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub format: ArchiveFormat,
    pub archive_path: Option<PathBuf>,
    pub extracted_dir: PathBuf,
    pub page_count: usize,
    pub size_bytes: u64,
    #[serde(with = "system_time_rfc3339")]
    pub last_access: SystemTime,
}

mod system_time_rfc3339 {
    use std::time::SystemTime;

    pub fn serialize<S: serde::Serializer>(time: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        let dt: chrono::DateTime<chrono::Utc> = (*time).into();
        s.serialize_str(&dt.to_rfc3339())
    }
}

/// Map from identity to entry behind a single lock.
#[derive(Debug, Default)]
pub struct CacheIndex {
    entries: RwLock<HashMap<ContentIdentity, CacheEntry>>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the cache root, joining source metadata from the catalog.
    ///
    /// Groups without any page are not entries: they are leftovers that the
    /// next sweep or the next `ensure_ready` will deal with.
    pub fn rebuild(layout: &CacheLayout, sources: &[SourceRecord]) -> std::io::Result<Self> {
        let sources: HashMap<&ContentIdentity, &SourceRecord> = sources.iter().map(|s| (&s.identity, s)).collect();
        let usage = scan::scan(layout.root())?;
        let mut entries = HashMap::new();

        for (identity, group) in usage.groups {
            let page_count = layout.list_pages(&identity)?.len();
            if page_count == 0 {
                tracing::debug!(identity = %identity, "ignoring cache group without pages");
                continue;
            }

            let archive_path = group.paths.iter().find(|p| p.is_file()).cloned();
            let source = sources.get(&identity);
            let format = source
                .map(|s| s.format)
                .or_else(|| archive_path.as_deref().and_then(format_of))
                .unwrap_or(ArchiveFormat::Zip);

            entries.insert(
                identity.clone(),
                CacheEntry {
                    extracted_dir: layout.extracted_dir(&identity),
                    identity,
                    source_url: source.map(|s| s.url.clone()),
                    title: source.map(|s| s.title.clone()),
                    format,
                    archive_path,
                    page_count,
                    size_bytes: group.size_bytes,
                    last_access: group.last_modified,
                },
            );
        }

        tracing::info!(entries = entries.len(), total_bytes = usage.total_bytes, "rebuilt cache index");
        Ok(Self { entries: RwLock::new(entries) })
    }

    pub fn get(&self, identity: &ContentIdentity) -> Option<CacheEntry> {
        self.read().get(identity).cloned()
    }

    pub fn contains(&self, identity: &ContentIdentity) -> bool {
        self.read().contains_key(identity)
    }

    pub fn upsert(&self, entry: CacheEntry) {
        self.write().insert(entry.identity.clone(), entry);
    }

    pub fn remove(&self, identity: &ContentIdentity) -> Option<CacheEntry> {
        self.write().remove(identity)
    }

    /// Record an access; no-op for unknown identities.
    pub fn touch(&self, identity: &ContentIdentity, at: SystemTime) {
        if let Some(entry) = self.write().get_mut(identity) {
            entry.last_access = at;
        }
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Sum of recorded entry sizes.
    pub fn total_bytes(&self) -> u64 {
        self.read().values().map(|e| e.size_bytes).sum()
    }

    /// All entries, most recently used first.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.read().values().cloned().collect();
        entries.sort_by(|a, b| b.last_access.cmp(&a.last_access).then_with(|| a.identity.cmp(&b.identity)));
        entries
    }

    // A poisoned lock only means another thread panicked mid-update of a
    // plain map; the data is still usable.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ContentIdentity, CacheEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ContentIdentity, CacheEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn format_of(path: &Path) -> Option<ArchiveFormat> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(ArchiveFormat::from_extension)
}
