// src/config.rs

//! Session configuration
//!
//! All settings are explicit per-session state. A `ResolverConfig` is
//! built in code or loaded from a TOML file:
//!
//! ```toml
//! index_urls = ["https://pypi.org/simple"]
//! find_links = ["https://example.com/wheels/"]
//! download_dir = "downloads"
//! failure_policy = "contain"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Public package index used when none is configured
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple";

/// Default timeout for HTTP requests (30 seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Maximum attempts for a network request
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base retry delay in milliseconds, multiplied by the attempt number
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// What a session does with a requirement that fails outside the fetch step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record a `DownloadError` and continue with the next requirement
    #[default]
    Contain,

    /// Stop the traversal; the result stream ends with the error
    Abort,
}

/// Configuration for a resolution session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Simple-index base URLs, searched in order
    pub index_urls: Vec<String>,

    /// Extra direct sources: HTML pages listing archives, or archive URLs
    pub find_links: Vec<String>,

    /// Directory artifacts are written to
    pub download_dir: PathBuf,

    pub http_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,

    /// Prefer the newest candidate even when a satisfying file is already downloaded
    pub upgrade: bool,

    /// Consider pre-release versions when a stable one also matches
    pub allow_prereleases: bool,

    pub failure_policy: FailurePolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            index_urls: vec![DEFAULT_INDEX_URL.to_string()],
            find_links: Vec::new(),
            download_dir: PathBuf::from("."),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            upgrade: false,
            allow_prereleases: false,
            failure_policy: FailurePolicy::Contain,
        }
    }
}

impl ResolverConfig {
    /// Create a default configuration downloading into `download_dir`
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject settings no session could run with
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::ConfigError(
                "max_retries must be at least 1".to_string(),
            ));
        }
        for url in self.index_urls.iter().chain(&self.find_links) {
            url::Url::parse(url)
                .map_err(|e| Error::ConfigError(format!("Invalid URL '{}': {}", url, e)))?;
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
