//! HTTP download of source archives into the cache.
//!
//! ### Guarantees
//! - The body is streamed to a staging file under `temp_dir` and only
//!   renamed onto the destination once complete.
//! - `max_bytes` is a hard ceiling: a declared `Content-Length` above it is
//!   rejected before reading, and the stream is aborted the moment the
//!   running total passes it.
//! - Timeouts, connection errors and non-2xx statuses fail with
//!   `TRANSFER_ERROR`.
//! - On any failure the destination does not exist; the staging file is
//!   removed when dropped.
//! - An existing destination is a cache hit and is not downloaded again.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use mangashelf_core::{AppConfig, Error};
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "mangashelf/0.1")
    pub user_agent: String,

    /// Maximum body size in bytes (default: 500 MiB)
    pub max_bytes: u64,

    /// Upper bound on the whole transfer (default: 120s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Staging directory; must share a filesystem with the destinations
    pub temp_dir: PathBuf,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "mangashelf/0.1".to_string(),
            max_bytes: 500 * 1024 * 1024,
            timeout: Duration::from_secs(120),
            max_redirects: 5,
            temp_dir: std::env::temp_dir(),
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_download_bytes,
            timeout: config.fetch_timeout(),
            temp_dir: config.temp_dir.clone(),
            ..Self::default()
        }
    }
}

/// What a successful fetch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Destination already present; nothing was transferred.
    Cached,
    /// Destination written with this many bytes.
    Downloaded { bytes: u64 },
}

/// HTTP download client.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Transfer(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Download `url` to `dest`.
    pub async fn fetch(&self, url: &Url, dest: &Path) -> Result<FetchOutcome, Error> {
        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            tracing::debug!(dest = %dest.display(), "archive already cached, skipping download");
            return Ok(FetchOutcome::Cached);
        }

        let start = Instant::now();
        let max_bytes = self.config.max_bytes;

        let mut response = self.http.get(url.as_str()).send().await.map_err(transfer_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transfer(format!("status {} from {url}", status.as_u16())));
        }

        if let Some(len) = response.content_length()
            && len > max_bytes
        {
            return Err(Error::SizeExceeded(format!("{len} bytes exceeds {max_bytes}")));
        }

        let temp_dir = self.config.temp_dir.clone();
        let (file, staging) = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&temp_dir).map_err(|e| Error::storage(temp_dir.display(), e))?;
            tempfile::Builder::new()
                .prefix("download-")
                .suffix(".part")
                .tempfile_in(&temp_dir)
                .map_err(|e| Error::storage(temp_dir.display(), e))
        })
        .await
        .map_err(|e| Error::Storage(format!("staging task failed: {e}")))??
        .into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut received: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(transfer_error)? {
            received += chunk.len() as u64;
            if received > max_bytes {
                tracing::warn!(url = %url, received, max_bytes, "download aborted over size cap");
                return Err(Error::SizeExceeded(format!("more than {max_bytes} bytes received")));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::storage(staging.display(), e))?;
        }

        file.flush().await.map_err(|e| Error::storage(staging.display(), e))?;
        file.sync_all().await.map_err(|e| Error::storage(staging.display(), e))?;
        drop(file);

        staging
            .persist(dest)
            .map_err(|e| Error::storage(dest.display(), e.error))?;

        tracing::info!(
            url = %url,
            dest = %dest.display(),
            bytes = received,
            fetch_ms = start.elapsed().as_millis() as u64,
            "downloaded archive"
        );

        Ok(FetchOutcome::Downloaded { bytes: received })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

fn transfer_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Transfer(format!("timed out: {e}"))
    } else {
        Error::Transfer(format!("network error: {e}"))
    }
}
