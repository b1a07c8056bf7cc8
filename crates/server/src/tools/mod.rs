//! MCP tool implementations.
//!
//! This module contains all tools exposed by the mangashelf server. Each
//! tool is a plain `*_impl` function over a [`Library`] so it can be tested
//! without a transport.
//!
//! [`Library`]: mangashelf_client::Library

pub mod cache;
pub mod manga_library;
pub mod manga_open;
pub mod manga_page_image;
pub mod manga_pages;

pub use manga_open::MangaOpenParams;
pub use manga_page_image::MangaPageImageParams;
pub use manga_pages::MangaPagesParams;

use mangashelf_core::{ContentIdentity, Error};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Serialize a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

pub(crate) fn parse_identity(raw: &str) -> Result<ContentIdentity, McpError> {
    Ok(raw.parse::<ContentIdentity>()?)
}

#[cfg(test)]
pub(crate) mod test_support {
    use mangashelf_client::Library;
    use mangashelf_core::AppConfig;
    use rmcp::model::CallToolResult;
    use std::io::{Cursor, Write};
    use std::path::Path;

    pub async fn library(root: &Path) -> Library {
        Library::open(AppConfig {
            cache_dir: root.join("cache"),
            temp_dir: root.join("staging"),
            db_path: root.join("catalog.sqlite"),
            ..AppConfig::default()
        })
        .await
        .unwrap()
    }

    pub fn text_of(result: &CallToolResult) -> String {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content")
            .to_string()
    }

    /// Stored zip of `pages` small JPEGs.
    pub fn comic_zip(pages: usize) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for i in 0..pages {
            let img = image::RgbImage::from_pixel(16, 24, image::Rgb([(i as u8).wrapping_mul(40), 80, 160]));
            let mut jpeg = Cursor::new(Vec::new());
            image::DynamicImage::ImageRgb8(img)
                .write_to(&mut jpeg, image::ImageFormat::Jpeg)
                .unwrap();
            writer.start_file(format!("{i:03}.jpg"), options).unwrap();
            writer.write_all(jpeg.get_ref()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}
