// src/repository/mod.rs

//! Package index access and artifact downloading
//!
//! This module provides functionality for:
//! - Fetching index pages and artifacts over HTTP with retry support
//! - Persisting artifacts into a download directory
//! - Verifying artifacts against `#sha256=` link digests
//! - Resolving requirements to download links (see [`index`])

pub mod index;

use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::packages::PackageInspector;
use crate::requirement::{Link, PackageInfo, check_filename};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use index::{IndexResolver, SimpleIndexResolver};

/// Fetches bytes for a URL
pub trait Transport {
    /// GET `url` and return the body as text
    fn get_text(&self, url: &str) -> Result<String>;

    /// GET `url` and write the body to `dest_path`, replacing any existing file
    fn download_file(&self, url: &str, dest_path: &Path) -> Result<()>;
}

/// HTTP client wrapper with retry support
pub struct RepositoryClient {
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl RepositoryClient {
    /// Create a new repository client
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(concat!("pipext/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    /// Send a GET, retrying network errors; HTTP error statuses are final
    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to fetch {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Fetch attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(self.retry_delay * attempt);
                }
            }
        }
    }
}

impl Transport for RepositoryClient {
    fn get_text(&self, url: &str) -> Result<String> {
        debug!("Fetching {}", url);
        self.get(url)?
            .text()
            .map_err(|e| Error::DownloadError(format!("Failed to read {}: {}", url, e)))
    }

    fn download_file(&self, url: &str, dest_path: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, dest_path.display());
        let mut response = self.get(url)?;
        write_atomically(dest_path, |file| {
            io::copy(&mut response, file)
                .map(|_| ())
                .map_err(|e| Error::DownloadError(format!("Failed to read body of {}: {}", url, e)))
        })?;
        info!("Successfully downloaded to {}", dest_path.display());
        Ok(())
    }
}

/// Write through a temporary sibling file, then rename over `dest_path`
pub fn write_atomically<F>(dest_path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = dest_path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = dest_path.with_file_name(temp_name);

    let mut file = File::create(&temp_path)?;
    if let Err(e) = write(&mut file) {
        drop(file);
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    drop(file);

    fs::rename(&temp_path, dest_path)?;
    Ok(())
}

/// A fetched artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub package: PackageInfo,
    pub path: PathBuf,
}

/// Turns a resolved link into an artifact on disk plus its package identity
pub struct Downloader {
    transport: Arc<dyn Transport>,
    inspector: Arc<dyn PackageInspector>,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>, inspector: Arc<dyn PackageInspector>) -> Self {
        Self {
            transport,
            inspector,
        }
    }

    /// Fetch `link` into `download_dir` and read its package identity
    ///
    /// The URL fragment is stripped before the request; a `sha256` digest
    /// in it is checked against the written file, which is removed on
    /// mismatch.
    pub fn download(&self, link: &Link, download_dir: &Path) -> Result<Downloaded> {
        check_filename(&link.filename)?;
        let dest_path = download_dir.join(&link.filename);

        self.transport.download_file(link.fetch_url(), &dest_path)?;

        if let Some(expected) = link.sha256() {
            if let Err(e) = verify_checksum(&dest_path, expected) {
                let _ = fs::remove_file(&dest_path);
                return Err(e);
            }
        }

        let package = self.inspector.package_info(&dest_path)?;
        Ok(Downloaded {
            package,
            path: dest_path,
        })
    }
}

/// Verify file checksum matches expected value
fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    use sha2::{Digest, Sha256};

    debug!("Verifying checksum for {}", path.display());

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;

    let actual = format!("{:x}", hasher.finalize());

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }

    debug!("Checksum verified: {}", expected);
    Ok(())
}
