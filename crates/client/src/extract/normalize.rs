//! Page normalization shared by every archive format.
//!
//! Accepted entries are decoded, shrunk to fit the bounding box while
//! keeping their aspect ratio, converted to RGB and written as PNG under a
//! sequential name. Entries are filtered by name first:
//!
//! - only `jpg`, `jpeg`, `png`, `gif` and `bmp` (case-insensitive)
//! - only bare file names; anything with a path component is skipped

use std::path::PathBuf;
use std::sync::LazyLock;

use image::{DynamicImage, ImageFormat, imageops::FilterType};
use mangashelf_core::Error;
use mangashelf_core::cache::layout::{MAX_PAGES, page_file_name};
use regex::Regex;

static IMAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpe?g|png|gif|bmp)$").expect("image name pattern is valid"));

/// Whether an entry name carries an accepted image extension.
pub fn is_image_name(name: &str) -> bool {
    IMAGE_NAME.is_match(name)
}

/// Returns the name if it is a bare file name: no separators, no `.`/`..`.
pub fn bare_entry_name(name: &str) -> Option<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) || name.contains('\0') {
        return None;
    }
    Some(name)
}

/// Name filter applied before any bytes are read.
pub fn accept_entry(name: &str) -> bool {
    bare_entry_name(name).is_some_and(is_image_name)
}

/// Normalization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// Entries larger than this (decompressed) are skipped.
    pub max_entry_bytes: u64,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self { max_width: 1200, max_height: 1600, max_entry_bytes: 64 * 1024 * 1024 }
    }
}

/// Writes accepted pages into a directory under contiguous sequential names.
#[derive(Debug)]
pub struct PageWriter {
    dir: PathBuf,
    options: NormalizeOptions,
    written: usize,
}

impl PageWriter {
    pub fn new(dir: impl Into<PathBuf>, options: NormalizeOptions) -> Self {
        Self { dir: dir.into(), options, written: 0 }
    }

    /// Pages written so far.
    pub fn count(&self) -> usize {
        self.written
    }

    /// Decode `bytes` and write them as the next page.
    ///
    /// Returns `Ok(false)` when the entry was skipped (undecodable or the
    /// page limit was reached). Only local I/O failures are errors.
    pub fn write(&mut self, source_name: &str, bytes: &[u8]) -> Result<bool, Error> {
        if self.written >= MAX_PAGES {
            tracing::warn!(entry = source_name, "page limit reached, skipping entry");
            return Ok(false);
        }

        let img = match image::load_from_memory(bytes) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(entry = source_name, error = %e, "skipping undecodable image");
                return Ok(false);
            }
        };

        let page = DynamicImage::ImageRgb8(fit(img, self.options.max_width, self.options.max_height).to_rgb8());
        let path = self.dir.join(page_file_name(self.written));

        match page.save_with_format(&path, ImageFormat::Png) {
            Ok(()) => {
                self.written += 1;
                Ok(true)
            }
            Err(image::ImageError::IoError(e)) => Err(Error::storage(path.display(), e)),
            Err(e) => {
                tracing::warn!(entry = source_name, error = %e, "skipping image that failed to encode");
                let _ = std::fs::remove_file(&path);
                Ok(false)
            }
        }
    }
}

/// Shrink `img` to fit `max_width` x `max_height`; smaller images are kept as is.
fn fit(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    if img.width() <= max_width && img.height() <= max_height {
        return img;
    }
    img.resize(max_width, max_height, FilterType::Lanczos3)
}
