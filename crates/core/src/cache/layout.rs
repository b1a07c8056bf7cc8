//! On-disk naming for cache artifacts.
//!
//! Each identity owns exactly two artifacts in the cache root, both named
//! with the identity as prefix so a directory scan can group them without
//! an auxiliary index:
//!
//! - `<identity>.<ext>`: the downloaded archive
//! - `<identity>_extracted/`: normalized pages `000000.png`, `000001.png`, ...

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::identity::ContentIdentity;

/// Suffix of the extracted-directory artifact.
pub const EXTRACTED_SUFFIX: &str = "_extracted";

/// Extension of normalized page files.
pub const PAGE_EXTENSION: &str = "png";

/// Upper bound on pages per archive; keeps names fixed-width.
pub const MAX_PAGES: usize = 1_000_000;

/// File name of the page at `index` in reading order.
pub fn page_file_name(index: usize) -> String {
    format!("{index:06}.{PAGE_EXTENSION}")
}

/// Path helper rooted at the cache directory.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archive artifact for `identity`, keeping the declared extension.
    pub fn archive_path(&self, identity: &ContentIdentity, extension: &str) -> PathBuf {
        self.root.join(format!("{identity}.{extension}"))
    }

    pub fn extracted_dir_name(identity: &ContentIdentity) -> String {
        format!("{identity}{EXTRACTED_SUFFIX}")
    }

    pub fn extracted_dir(&self, identity: &ContentIdentity) -> PathBuf {
        self.root.join(Self::extracted_dir_name(identity))
    }

    /// Find the archive artifact for `identity` regardless of extension.
    pub fn find_archive(&self, identity: &ContentIdentity) -> io::Result<Option<PathBuf>> {
        let prefix = format!("{identity}.");
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_name().to_str().is_some_and(|name| name.starts_with(&prefix))
                && entry.file_type()?.is_file()
            {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// Sorted page file names inside the extracted directory.
    ///
    /// A missing directory yields an empty list. Only regular files named
    /// like pages are returned.
    pub fn list_pages(&self, identity: &ContentIdentity) -> io::Result<Vec<String>> {
        let dir = self.extracted_dir(identity);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut pages = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_page_name(&name) && entry.file_type()?.is_file() {
                pages.push(name);
            }
        }
        pages.sort();
        Ok(pages)
    }

    /// Relative reference of a page, as handed to collaborators.
    pub fn page_reference(identity: &ContentIdentity, page: &str) -> String {
        format!("{}/{page}", Self::extracted_dir_name(identity))
    }

    /// Ensure the root exists.
    pub fn create(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }
}

fn is_page_name(name: &str) -> bool {
    name.strip_suffix(".png")
        .is_some_and(|stem| stem.len() == 6 && stem.bytes().all(|b| b.is_ascii_digit()))
}
