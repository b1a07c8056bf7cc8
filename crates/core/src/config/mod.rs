//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (MANGASHELF_*)
//! 2. TOML config file (if MANGASHELF_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

const MIB: u64 = 1024 * 1024;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (MANGASHELF_*)
/// 2. TOML config file (if MANGASHELF_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache root holding `<identity>.<ext>` archives and `<identity>_extracted` directories.
    ///
    /// Set via MANGASHELF_CACHE_DIR environment variable.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Staging area for in-progress downloads and unpacks.
    ///
    /// Must live on the same filesystem as `cache_dir` so staged artifacts
    /// can be renamed into place. Set via MANGASHELF_TEMP_DIR.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Path to the SQLite source catalog.
    ///
    /// Set via MANGASHELF_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Total on-disk ceiling for the cache root, in bytes.
    ///
    /// Set via MANGASHELF_CACHE_LIMIT_BYTES environment variable.
    #[serde(default = "default_cache_limit_bytes")]
    pub cache_limit_bytes: u64,

    /// Number of page references returned per batch.
    ///
    /// Set via MANGASHELF_PAGE_SIZE environment variable.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Hard cap on downloaded archive size, in bytes.
    ///
    /// Set via MANGASHELF_MAX_DOWNLOAD_BYTES environment variable.
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,

    /// Cap on the decompressed size of a single archive entry, in bytes.
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,

    /// Upper time bound for a whole download, in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Upper time bound for the external unpack program, in milliseconds.
    #[serde(default = "default_unpack_timeout_ms")]
    pub unpack_timeout_ms: u64,

    /// External program used to unpack Rar archives.
    ///
    /// Set via MANGASHELF_UNRAR_PATH environment variable.
    #[serde(default = "default_unrar_path")]
    pub unrar_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_max_image_width")]
    pub max_image_width: u32,

    #[serde(default = "default_max_image_height")]
    pub max_image_height: u32,

    /// Hosts archives may be downloaded from. Empty means unrestricted.
    ///
    /// Set via MANGASHELF_ALLOWLIST_DOMAINS environment variable (comma-separated).
    #[serde(default, deserialize_with = "deserialize_domains")]
    pub allowlist_domains: Vec<String>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./manga_cache")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./manga_cache_temp")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./mangashelf.sqlite")
}

fn default_cache_limit_bytes() -> u64 {
    270 * MIB
}

fn default_page_size() -> usize {
    5
}

fn default_max_download_bytes() -> u64 {
    500 * MIB
}

fn default_max_entry_bytes() -> u64 {
    64 * MIB
}

fn default_fetch_timeout_ms() -> u64 {
    120_000
}

fn default_unpack_timeout_ms() -> u64 {
    300_000
}

fn default_unrar_path() -> PathBuf {
    PathBuf::from("unrar")
}

fn default_user_agent() -> String {
    "mangashelf/0.1".into()
}

fn default_max_image_width() -> u32 {
    1200
}

fn default_max_image_height() -> u32 {
    1600
}

/// Accept either a list or a comma-separated string (the env var form).
fn deserialize_domains<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Domains {
        List(Vec<String>),
        Csv(String),
    }

    let domains = match Domains::deserialize(deserializer)? {
        Domains::List(list) => list,
        Domains::Csv(csv) => csv.split(',').map(str::to_string).collect(),
    };

    Ok(domains
        .into_iter()
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            temp_dir: default_temp_dir(),
            db_path: default_db_path(),
            cache_limit_bytes: default_cache_limit_bytes(),
            page_size: default_page_size(),
            max_download_bytes: default_max_download_bytes(),
            max_entry_bytes: default_max_entry_bytes(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            unpack_timeout_ms: default_unpack_timeout_ms(),
            unrar_path: default_unrar_path(),
            user_agent: default_user_agent(),
            max_image_width: default_max_image_width(),
            max_image_height: default_max_image_height(),
            allowlist_domains: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Download timeout as Duration for use with reqwest.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Unpack timeout as Duration for use with tokio.
    pub fn unpack_timeout(&self) -> Duration {
        Duration::from_millis(self.unpack_timeout_ms)
    }

    /// Downscale bounding box as (width, height).
    pub fn image_bounds(&self) -> (u32, u32) {
        (self.max_image_width, self.max_image_height)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `MANGASHELF_`
    /// 2. TOML file from `MANGASHELF_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("MANGASHELF_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("MANGASHELF_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        Self::from_figment(figment)
    }

    /// Extract and validate a configuration from an already-layered figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
