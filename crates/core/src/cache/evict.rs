//! Cache eviction engine.
//!
//! Enforces the size ceiling with least-recently-used deletion of whole
//! identity groups. Recency is the newest file mtime within a group, so a
//! read refreshes it by bumping one file's mtime.
//!
//! The engine is the only component that deletes cache artifacts. Two kinds
//! of identities are exempt from a sweep:
//!
//! - the active identity passed to [`CacheEvictor::sweep`]
//! - identities pinned with [`CacheEvictor::pin`] while they are being built
//!
//! All operations are blocking filesystem work; async callers should run
//! them on the blocking pool.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::index::CacheIndex;
use super::layout::CacheLayout;
use super::scan;
use crate::Error;
use crate::identity::ContentIdentity;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub total_bytes_before: u64,
    /// Estimated total after deletions (scan size minus evicted group sizes).
    pub total_bytes_after: u64,
    pub evicted: Vec<ContentIdentity>,
}

/// LRU eviction under a byte ceiling.
#[derive(Debug)]
pub struct CacheEvictor {
    layout: CacheLayout,
    temp_dir: PathBuf,
    limit_bytes: u64,
    index: Arc<CacheIndex>,
    /// Coarse lock serializing sweeps, discards and clears.
    sweep_lock: Mutex<()>,
    /// In-flight identities with their pin counts.
    pinned: Mutex<HashMap<ContentIdentity, usize>>,
}

impl CacheEvictor {
    pub fn new(layout: CacheLayout, temp_dir: impl Into<PathBuf>, limit_bytes: u64, index: Arc<CacheIndex>) -> Self {
        Self {
            layout,
            temp_dir: temp_dir.into(),
            limit_bytes,
            index,
            sweep_lock: Mutex::new(()),
            pinned: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Refresh recency of `identity` and sweep with it marked active.
    ///
    /// Never fails: problems are logged, since eviction is maintenance and
    /// must not turn a read into an error.
    pub fn admit(&self, identity: &ContentIdentity) {
        self.touch(identity);
        if let Err(e) = self.sweep(Some(identity)) {
            warn!(identity = %identity, error = %e, "eviction sweep failed");
        }
    }

    /// Delete least-recently-used groups until the cache fits the ceiling.
    ///
    /// `active` and pinned identities are never deleted. When even that is
    /// not enough the sweep stops after the last evictable group.
    pub fn sweep(&self, active: Option<&ContentIdentity>) -> Result<SweepReport, Error> {
        let _guard = lock(&self.sweep_lock);

        let usage = scan::scan(self.layout.root()).map_err(|e| Error::storage(self.layout.root().display(), e))?;
        let mut report = SweepReport {
            total_bytes_before: usage.total_bytes,
            total_bytes_after: usage.total_bytes,
            evicted: Vec::new(),
        };

        if usage.total_bytes <= self.limit_bytes {
            debug!(total_bytes = usage.total_bytes, limit_bytes = self.limit_bytes, "cache within limit");
            return Ok(report);
        }

        let pinned: Vec<ContentIdentity> = lock(&self.pinned).keys().cloned().collect();
        let mut candidates: Vec<_> = usage
            .groups
            .into_iter()
            .filter(|(id, _)| Some(id) != active && !pinned.contains(id))
            .collect();
        candidates.sort_by(|(a_id, a), (b_id, b)| a.last_modified.cmp(&b.last_modified).then_with(|| a_id.cmp(b_id)));

        for (identity, group) in candidates {
            if report.total_bytes_after <= self.limit_bytes {
                break;
            }

            let failures = remove_paths(&group.paths);
            self.index.remove(&identity);
            report.total_bytes_after = report.total_bytes_after.saturating_sub(group.size_bytes);

            info!(
                identity = %identity,
                size_bytes = group.size_bytes,
                failures,
                total_bytes = report.total_bytes_after,
                "evicted cache entry"
            );
            report.evicted.push(identity);
        }

        if report.total_bytes_after > self.limit_bytes {
            warn!(
                total_bytes = report.total_bytes_after,
                limit_bytes = self.limit_bytes,
                "cache still over limit after evicting everything evictable"
            );
        }

        Ok(report)
    }

    /// Remove every artifact of `identity`, ignoring pins.
    ///
    /// Used to roll back a failed fetch or extraction. Each path is removed
    /// independently; any failure is reported after all were attempted.
    pub fn discard(&self, identity: &ContentIdentity) -> Result<(), Error> {
        let _guard = lock(&self.sweep_lock);
        self.index.remove(identity);

        let paths = self.group_paths(identity).map_err(|e| Error::storage(self.layout.root().display(), e))?;
        let failures = remove_paths(&paths);
        if failures > 0 {
            return Err(Error::Storage(format!("failed to remove {failures} artifact(s) of {identity}")));
        }

        debug!(identity = %identity, removed = paths.len(), "discarded cache artifacts");
        Ok(())
    }

    /// Remove every cached artifact and staging file, then recreate the
    /// empty directories.
    pub fn clear_all(&self) -> Result<(), Error> {
        let _guard = lock(&self.sweep_lock);

        for dir in [self.layout.root(), self.temp_dir.as_path()] {
            match fs::remove_dir_all(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::storage(dir.display(), e)),
            }
            fs::create_dir_all(dir).map_err(|e| Error::storage(dir.display(), e))?;
        }
        self.index.clear();

        info!(cache_dir = %self.layout.root().display(), "cleared cache");
        Ok(())
    }

    /// Mark `identity` as just used.
    ///
    /// Bumps the mtime of the archive artifact, or of the first page when the
    /// archive is gone. Failures only cost recency and are logged.
    pub fn touch(&self, identity: &ContentIdentity) {
        let now = SystemTime::now();
        let target = match self.layout.find_archive(identity) {
            Ok(Some(path)) => Some(path),
            Ok(None) => self
                .layout
                .list_pages(identity)
                .ok()
                .and_then(|pages| pages.into_iter().next())
                .map(|page| self.layout.extracted_dir(identity).join(page)),
            Err(e) => {
                warn!(identity = %identity, error = %e, "failed to locate archive for touch");
                None
            }
        };

        if let Some(path) = target
            && let Err(e) = set_mtime(&path, now)
        {
            warn!(path = %path.display(), error = %e, "failed to refresh recency");
        }
        self.index.touch(identity, now);
    }

    /// Exempt `identity` from sweeps until the guard is dropped.
    pub fn pin(self: &Arc<Self>, identity: &ContentIdentity) -> PinGuard {
        *lock(&self.pinned).entry(identity.clone()).or_insert(0) += 1;
        PinGuard { evictor: Arc::clone(self), identity: identity.clone() }
    }

    pub fn is_pinned(&self, identity: &ContentIdentity) -> bool {
        lock(&self.pinned).contains_key(identity)
    }

    fn unpin(&self, identity: &ContentIdentity) {
        let mut pinned = lock(&self.pinned);
        if let Some(count) = pinned.get_mut(identity) {
            *count -= 1;
            if *count == 0 {
                pinned.remove(identity);
            }
        }
    }

    fn group_paths(&self, identity: &ContentIdentity) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(self.layout.root()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry
                .file_name()
                .to_str()
                .and_then(ContentIdentity::from_file_name)
                .is_some_and(|id| &id == identity)
            {
                paths.push(entry.path());
            }
        }
        Ok(paths)
    }
}

/// Keeps an identity pinned while alive.
#[derive(Debug)]
pub struct PinGuard {
    evictor: Arc<CacheEvictor>,
    identity: ContentIdentity,
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.evictor.unpin(&self.identity);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Best-effort removal; returns the number of paths that could not be removed.
fn remove_paths(paths: &[PathBuf]) -> usize {
    let mut failures = 0;
    for path in paths {
        let result = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to remove cache artifact");
            failures += 1;
        }
    }
    failures
}

fn set_mtime(path: &Path, at: SystemTime) -> io::Result<()> {
    fs::File::options().write(true).open(path)?.set_modified(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::layout::page_file_name;
    use crate::identity::compute_identity;
    use std::time::Duration;

    struct Fixture {
        _tmp: tempfile::TempDir,
        layout: CacheLayout,
        index: Arc<CacheIndex>,
        evictor: Arc<CacheEvictor>,
    }

    fn fixture(limit_bytes: u64) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let layout = CacheLayout::new(tmp.path().join("cache"));
        layout.create().unwrap();
        let index = Arc::new(CacheIndex::new());
        let evictor = Arc::new(CacheEvictor::new(
            layout.clone(),
            tmp.path().join("staging"),
            limit_bytes,
            Arc::clone(&index),
        ));
        Fixture { _tmp: tmp, layout, index, evictor }
    }

    /// Archive of `archive_bytes` plus one page of `page_bytes`, aged to `age_secs` after the epoch.
    fn add_group(layout: &CacheLayout, name: &str, archive_bytes: usize, page_bytes: usize, age_secs: u64) -> ContentIdentity {
        let identity = compute_identity(&format!("https://example.com/{name}.zip"));
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(age_secs);

        let archive = layout.archive_path(&identity, "zip");
        fs::write(&archive, vec![0u8; archive_bytes]).unwrap();
        set_mtime(&archive, at).unwrap();

        let dir = layout.extracted_dir(&identity);
        fs::create_dir(&dir).unwrap();
        let page = dir.join(page_file_name(0));
        fs::write(&page, vec![0u8; page_bytes]).unwrap();
        set_mtime(&page, at).unwrap();

        identity
    }

    fn exists(layout: &CacheLayout, identity: &ContentIdentity) -> bool {
        layout.extracted_dir(identity).exists() || layout.archive_path(identity, "zip").exists()
    }

    #[test]
    fn test_sweep_noop_under_limit() {
        let f = fixture(1000);
        let a = add_group(&f.layout, "a", 100, 50, 10);

        let report = f.evictor.sweep(None).unwrap();
        assert_eq!(report.total_bytes_before, 150);
        assert!(report.evicted.is_empty());
        assert!(exists(&f.layout, &a));
    }

    #[test]
    fn test_sweep_evicts_oldest_first_and_spares_active() {
        let f = fixture(250);
        let oldest = add_group(&f.layout, "oldest", 80, 20, 10);
        let second = add_group(&f.layout, "second", 80, 20, 20);
        let third = add_group(&f.layout, "third", 80, 20, 30);
        let newest = add_group(&f.layout, "newest", 80, 20, 40);

        let report = f.evictor.sweep(Some(&oldest)).unwrap();

        assert_eq!(report.total_bytes_before, 400);
        assert_eq!(report.evicted, vec![second.clone(), third.clone()]);
        assert_eq!(report.total_bytes_after, 200);
        assert!(exists(&f.layout, &oldest));
        assert!(!exists(&f.layout, &second));
        assert!(!exists(&f.layout, &third));
        assert!(exists(&f.layout, &newest));
    }

    #[test]
    fn test_sweep_stops_when_only_active_remains() {
        let f = fixture(50);
        let active = add_group(&f.layout, "active", 200, 100, 10);
        let other = add_group(&f.layout, "other", 10, 10, 20);

        let report = f.evictor.sweep(Some(&active)).unwrap();

        assert_eq!(report.evicted, vec![other.clone()]);
        assert_eq!(report.total_bytes_after, 300);
        assert!(exists(&f.layout, &active));
        assert!(!exists(&f.layout, &other));
    }

    #[test]
    fn test_sweep_skips_pinned() {
        let f = fixture(150);
        let building = add_group(&f.layout, "building", 80, 20, 10);
        let old = add_group(&f.layout, "old", 80, 20, 20);

        let guard = f.evictor.pin(&building);
        assert!(f.evictor.is_pinned(&building));
        let report = f.evictor.sweep(None).unwrap();
        assert_eq!(report.evicted, vec![old]);
        assert!(exists(&f.layout, &building));

        drop(guard);
        assert!(!f.evictor.is_pinned(&building));
    }

    #[test]
    fn test_pin_counts_nest() {
        let f = fixture(100);
        let id = compute_identity("https://example.com/nested.zip");
        let first = f.evictor.pin(&id);
        let second = f.evictor.pin(&id);
        drop(first);
        assert!(f.evictor.is_pinned(&id));
        drop(second);
        assert!(!f.evictor.is_pinned(&id));
    }

    #[test]
    fn test_sweep_ignores_foreign_files() {
        let f = fixture(10);
        fs::write(f.layout.root().join("notes.txt"), vec![0u8; 500]).unwrap();

        let report = f.evictor.sweep(None).unwrap();
        assert_eq!(report.total_bytes_before, 0);
        assert!(f.layout.root().join("notes.txt").exists());
    }

    #[test]
    fn test_admit_refreshes_recency() {
        let f = fixture(250);
        let reread = add_group(&f.layout, "reread", 80, 20, 10);
        let middle = add_group(&f.layout, "middle", 80, 20, 20);
        let newer = add_group(&f.layout, "newer", 80, 20, 30);

        // Reading the oldest makes `middle` the least recently used.
        f.evictor.touch(&reread);
        let report = f.evictor.sweep(Some(&newer)).unwrap();

        assert_eq!(report.evicted, vec![middle]);
        assert!(exists(&f.layout, &reread));
    }

    #[test]
    fn test_discard_removes_group_and_index_entry() {
        let f = fixture(1000);
        let id = add_group(&f.layout, "broken", 10, 10, 10);
        let keep = add_group(&f.layout, "keep", 10, 10, 10);
        f.index.upsert(crate::cache::CacheEntry {
            identity: id.clone(),
            source_url: None,
            title: None,
            format: crate::archive::ArchiveFormat::Zip,
            archive_path: None,
            extracted_dir: f.layout.extracted_dir(&id),
            page_count: 1,
            size_bytes: 20,
            last_access: SystemTime::now(),
        });

        f.evictor.discard(&id).unwrap();

        assert!(!exists(&f.layout, &id));
        assert!(exists(&f.layout, &keep));
        assert!(!f.index.contains(&id));
    }

    #[test]
    fn test_discard_missing_is_ok() {
        let f = fixture(1000);
        f.evictor.discard(&compute_identity("https://example.com/never.zip")).unwrap();
    }

    #[test]
    fn test_clear_all_recreates_empty_dirs() {
        let f = fixture(1000);
        add_group(&f.layout, "a", 10, 10, 10);
        fs::create_dir_all(f._tmp.path().join("staging").join("leftover")).unwrap();

        f.evictor.clear_all().unwrap();

        assert_eq!(fs::read_dir(f.layout.root()).unwrap().count(), 0);
        assert_eq!(fs::read_dir(f._tmp.path().join("staging")).unwrap().count(), 0);
    }
}
