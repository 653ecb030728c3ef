// src/packages/metadata.rs

//! Dependency metadata extraction
//!
//! Setuptools records an sdist's declared dependencies inside its
//! `*.egg-info/` directory: `requires.txt` holds requirement lines and
//! `dependency_links.txt` holds extra URLs to search for them. Wheels carry
//! `Requires-Dist` headers in `*.dist-info/METADATA` instead.

use super::pkginfo::read_metadata;
use super::traits::DependencyInfo;
use crate::archive::{ArchiveReader, open_archive};
use crate::error::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Entry suffix of the dependency-links list
pub const DEPENDENCY_LINKS_MARKER: &str = ".egg-info/dependency_links.txt";

/// Entry suffix of the nested requirements list
pub const REQUIRES_MARKER: &str = ".egg-info/requires.txt";

/// Extracts dependency declarations from artifacts
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Read dependency links and requirements from the artifact at `path`
    ///
    /// A missing marker entry means the list is empty, not an error.
    pub fn extract(path: &Path) -> Result<DependencyInfo> {
        let mut reader = open_archive(path)?;
        let info = Self::extract_from(reader.as_mut(), path)?;
        debug!(
            "{}: {} dependency links, {} requirements",
            path.display(),
            info.dependency_links.len(),
            info.requires.len()
        );
        Ok(info)
    }

    fn extract_from(reader: &mut dyn ArchiveReader, path: &Path) -> Result<DependencyInfo> {
        let links_entry = reader.find_entry(DEPENDENCY_LINKS_MARKER);
        let requires_entry = reader.find_entry(REQUIRES_MARKER);

        let dependency_links = match links_entry {
            Some(entry) => split_lines(&read_text(reader, &entry)?),
            None => Vec::new(),
        };

        let requires = match requires_entry {
            Some(entry) => split_lines(&read_text(reader, &entry)?),
            None if reader.find_entry(".dist-info/METADATA").is_some() => {
                Self::wheel_requires(reader, path)?
            }
            None => Vec::new(),
        };

        Ok(DependencyInfo {
            dependency_links,
            requires,
        })
    }

    // Unconditional Requires-Dist entries; extras-only ones are skipped
    fn wheel_requires(reader: &mut dyn ArchiveReader, path: &Path) -> Result<Vec<String>> {
        let meta = read_metadata(reader, path)?;
        Ok(meta
            .requires_dist
            .into_iter()
            .filter(|req| {
                req.split_once(';')
                    .map(|(_, marker)| !marker.contains("extra"))
                    .unwrap_or(true)
            })
            .collect())
    }
}

fn read_text(reader: &mut dyn ArchiveReader, entry: &str) -> Result<String> {
    let bytes = reader.read_entry(entry)?;
    String::from_utf8(bytes)
        .map_err(|e| Error::ParseError(format!("{} is not valid UTF-8: {}", entry, e)))
}

/// Split on newlines, trim, drop empty lines
pub fn split_lines(content: &str) -> Vec<String> {
    content
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
