//! Zip (and cbz) extraction.
//!
//! Pages follow central-directory order. Entries are read in-process, one at
//! a time, each capped at `max_entry_bytes` of decompressed data.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use async_trait::async_trait;
use mangashelf_core::{ArchiveFormat, Error};
use ::zip::ZipArchive;

use super::normalize::{NormalizeOptions, PageWriter, accept_entry};
use super::{ArchiveExtractor, remove_target};

#[derive(Debug, Clone, Default)]
pub struct ZipExtractor {
    options: NormalizeOptions,
}

impl ZipExtractor {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    async fn extract(&self, archive: &Path, target: &Path) -> Result<usize, Error> {
        let archive = archive.to_path_buf();
        let target = target.to_path_buf();
        let options = self.options;

        tokio::task::spawn_blocking(move || {
            let result = extract_blocking(&archive, &target, options);
            if result.is_err() {
                remove_target(&target);
            }
            result
        })
        .await
        .map_err(|e| Error::Storage(format!("zip extraction task failed: {e}")))?
    }
}

fn extract_blocking(archive: &Path, target: &Path, options: NormalizeOptions) -> Result<usize, Error> {
    let file = File::open(archive).map_err(|e| Error::storage(archive.display(), e))?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .map_err(|e| Error::CorruptArchive(format!("{}: {e}", archive.display())))?;

    fs::create_dir_all(target).map_err(|e| Error::storage(target.display(), e))?;
    let mut writer = PageWriter::new(target, options);

    for i in 0..zip.len() {
        let mut entry = match zip.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(index = i, error = %e, "skipping unreadable zip entry");
                continue;
            }
        };

        let name = entry.name().to_string();
        if entry.is_dir() || !accept_entry(&name) {
            tracing::debug!(entry = %name, "skipping non-page zip entry");
            continue;
        }
        if entry.size() > options.max_entry_bytes {
            tracing::warn!(entry = %name, size = entry.size(), "skipping oversized zip entry");
            continue;
        }

        let mut bytes = Vec::new();
        if let Err(e) = (&mut entry).take(options.max_entry_bytes + 1).read_to_end(&mut bytes) {
            tracing::warn!(entry = %name, error = %e, "skipping zip entry that failed to decompress");
            continue;
        }
        if bytes.len() as u64 > options.max_entry_bytes {
            tracing::warn!(entry = %name, "skipping zip entry over the decompressed size cap");
            continue;
        }

        writer.write(&name, &bytes)?;
    }

    tracing::debug!(archive = %archive.display(), pages = writer.count(), "extracted zip archive");
    Ok(writer.count())
}
