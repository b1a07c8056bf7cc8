//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

const MIN_TIMEOUT_MS: u64 = 100;
const MAX_TIMEOUT_MS: u64 = 60 * 60 * 1000;
const MAX_PAGE_SIZE: usize = 100;

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - any byte limit is 0
    /// - `page_size` is outside 1..=100
    /// - a timeout is below 100ms or above 1 hour
    /// - `user_agent` or `unrar_path` is empty
    /// - the image bounding box has a zero side
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_limit_bytes == 0 {
            return Err(invalid("cache_limit_bytes", "must be greater than 0"));
        }
        if self.max_download_bytes == 0 {
            return Err(invalid("max_download_bytes", "must be greater than 0"));
        }
        if self.max_entry_bytes == 0 {
            return Err(invalid("max_entry_bytes", "must be greater than 0"));
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(invalid("page_size", "must be between 1 and 100"));
        }

        for (field, value) in [("fetch_timeout_ms", self.fetch_timeout_ms), ("unpack_timeout_ms", self.unpack_timeout_ms)] {
            if value < MIN_TIMEOUT_MS {
                return Err(invalid(field, "must be at least 100ms"));
            }
            if value > MAX_TIMEOUT_MS {
                return Err(invalid(field, "must not exceed 1 hour (3600000ms)"));
            }
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.unrar_path.as_os_str().is_empty() {
            return Err(invalid("unrar_path", "must not be empty"));
        }

        if self.max_image_width == 0 || self.max_image_height == 0 {
            return Err(invalid("max_image_width", "bounding box sides must be greater than 0"));
        }

        if self.max_download_bytes > self.cache_limit_bytes {
            tracing::warn!(
                max_download_bytes = self.max_download_bytes,
                cache_limit_bytes = self.cache_limit_bytes,
                "max_download_bytes exceeds cache_limit_bytes; \
                 a single large archive will evict everything else"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_cache_limit_zero() {
        let config = AppConfig { cache_limit_bytes: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "cache_limit_bytes"));
    }

    #[test]
    fn test_validate_max_download_zero() {
        let config = AppConfig { max_download_bytes: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_download_bytes"));
    }

    #[test]
    fn test_validate_page_size_bounds() {
        let config = AppConfig { page_size: 101, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "page_size"));

        let config = AppConfig { page_size: 100, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { fetch_timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "fetch_timeout_ms"));
    }

    #[test]
    fn test_validate_unpack_timeout_exceeds_limit() {
        let config = AppConfig { unpack_timeout_ms: MAX_TIMEOUT_MS + 1, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "unpack_timeout_ms"));
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "user_agent"));
    }

    #[test]
    fn test_validate_zero_bounding_box() {
        let config = AppConfig { max_image_height: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_download_larger_than_cache_is_allowed() {
        let config = AppConfig { max_download_bytes: 1024, cache_limit_bytes: 512, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
