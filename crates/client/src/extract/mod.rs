//! Archive extraction into normalized page directories.
//!
//! ### Contract
//! Every format implements [`ArchiveExtractor`]:
//! - entries are filtered by name (image extension, bare file name)
//! - accepted entries are decoded, downscaled and written as PNG under
//!   sequential names (`000000.png`, ...) in reading order
//! - a bad entry is skipped and logged; a broken container fails with
//!   `CORRUPT_ARCHIVE` and the target directory is removed
//! - zero pages is reported as `Ok(0)`; the caller decides what that means
//!
//! ### Formats
//! - `zip`: decoded in-process
//! - `rar`: unpacked by an external `unrar` into a private working directory

pub mod normalize;
pub mod rar;
pub mod zip;

pub use self::normalize::{NormalizeOptions, PageWriter};
pub use self::rar::{RarExtractor, UnrarError};
pub use self::zip::ZipExtractor;

use std::path::Path;
use std::sync::Arc;

use mangashelf_core::{AppConfig, ArchiveFormat, Error};

/// Stable extractor trait, one implementation per archive format.
#[async_trait::async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Format this extractor handles.
    fn format(&self) -> ArchiveFormat;

    /// Extract pages of `archive` into `target`, returning the page count.
    async fn extract(&self, archive: &Path, target: &Path) -> Result<usize, Error>;
}

/// One extractor per supported format.
#[derive(Clone)]
pub struct Extractors {
    zip: Arc<dyn ArchiveExtractor>,
    rar: Arc<dyn ArchiveExtractor>,
}

impl Extractors {
    pub fn new(zip: Arc<dyn ArchiveExtractor>, rar: Arc<dyn ArchiveExtractor>) -> Self {
        Self { zip, rar }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let options = NormalizeOptions::from(config);
        Self::new(Arc::new(ZipExtractor::new(options)), Arc::new(RarExtractor::from_config(config, options)))
    }

    pub fn for_format(&self, format: ArchiveFormat) -> &dyn ArchiveExtractor {
        match format {
            ArchiveFormat::Zip => self.zip.as_ref(),
            ArchiveFormat::Rar => self.rar.as_ref(),
        }
    }
}

impl From<&AppConfig> for NormalizeOptions {
    fn from(config: &AppConfig) -> Self {
        let (max_width, max_height) = config.image_bounds();
        Self { max_width, max_height, max_entry_bytes: config.max_entry_bytes }
    }
}

/// Remove a partially written target directory.
pub(crate) fn remove_target(target: &Path) {
    match std::fs::remove_dir_all(target) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(target = %target.display(), error = %e, "failed to remove partial extraction"),
    }
}
