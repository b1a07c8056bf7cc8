//! Supported archive kinds and their file extensions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Archive container formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Zip,
    Rar,
}

/// Accepted extensions, lowercase, with the format each maps to.
pub const ARCHIVE_EXTENSIONS: &[(&str, ArchiveFormat)] = &[
    ("zip", ArchiveFormat::Zip),
    ("cbz", ArchiveFormat::Zip),
    ("rar", ArchiveFormat::Rar),
    ("cbr", ArchiveFormat::Rar),
];

impl ArchiveFormat {
    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        ARCHIVE_EXTENSIONS
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, format)| *format)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Rar => "rar",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArchiveFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zip" => Ok(ArchiveFormat::Zip),
            "rar" => Ok(ArchiveFormat::Rar),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// The archive extension declared by a source URL, lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredArchive {
    pub extension: String,
    pub format: ArchiveFormat,
}

/// Detect the declared archive kind from the URL path's extension.
///
/// Query strings and fragments are ignored; only the final path segment
/// counts.
pub fn detect(url: &url::Url) -> Result<DeclaredArchive, Error> {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    let extension = segment
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ArchiveFormat::from_extension(&extension) {
        Some(format) => Ok(DeclaredArchive { extension, format }),
        None => Err(Error::UnsupportedFormat(format!(
            "'{}' is not one of zip, cbz, rar, cbr",
            if extension.is_empty() { segment } else { extension.as_str() }
        ))),
    }
}
