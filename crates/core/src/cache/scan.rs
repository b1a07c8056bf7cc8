//! Disk usage scan of the cache root, grouped by identity prefix.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::identity::ContentIdentity;

/// Footprint of every artifact sharing one identity prefix.
#[derive(Debug, Clone)]
pub struct GroupUsage {
    /// Top-level paths in the cache root belonging to the group.
    pub paths: Vec<PathBuf>,
    /// Total size of all regular files in the group.
    pub size_bytes: u64,
    /// Most recent modification time among the group's files.
    pub last_modified: SystemTime,
}

/// Result of scanning the cache root.
#[derive(Debug, Default)]
pub struct CacheUsage {
    pub groups: BTreeMap<ContentIdentity, GroupUsage>,
    pub total_bytes: u64,
}

/// Scan `root` and group top-level items by the identity prefix of their name.
///
/// Items whose names carry no identity prefix are ignored. Symlinks are
/// never followed. Files that disappear mid-scan are skipped.
pub fn scan(root: &Path) -> io::Result<CacheUsage> {
    let mut usage = CacheUsage::default();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(identity) = name.to_str().and_then(ContentIdentity::from_file_name) else {
            tracing::debug!(name = ?name, "skipping unrecognized cache item");
            continue;
        };

        let path = entry.path();
        let Some((size, mtime)) = measure(&path)? else {
            continue;
        };

        let group = usage.groups.entry(identity).or_insert_with(|| GroupUsage {
            paths: Vec::new(),
            size_bytes: 0,
            last_modified: SystemTime::UNIX_EPOCH,
        });
        group.paths.push(path);
        group.size_bytes += size;
        group.last_modified = group.last_modified.max(mtime);
        usage.total_bytes += size;
    }

    Ok(usage)
}

/// Size and newest mtime of a file or directory tree.
///
/// A directory's own mtime is ignored; an empty tree reports the epoch.
/// Returns `None` for symlinks, special files and vanished paths.
fn measure(path: &Path) -> io::Result<Option<(u64, SystemTime)>> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    if meta.is_file() {
        return Ok(Some((meta.len(), meta.modified()?)));
    }
    if !meta.is_dir() {
        return Ok(None);
    }

    let mut size = 0;
    let mut newest = SystemTime::UNIX_EPOCH;
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                size += meta.len();
                newest = newest.max(meta.modified()?);
            }
        }
    }

    Ok(Some((size, newest)))
}
