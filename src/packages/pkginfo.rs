// src/packages/pkginfo.rs

//! Core metadata (`PKG-INFO` / `METADATA`) parser
//!
//! The metadata file is a block of RFC 822-style `Key: value` headers,
//! optionally followed by a blank line and a long description body.

use crate::archive::{ArchiveReader, open_archive};
use crate::error::{Error, Result};
use crate::requirement::PackageInfo;
use std::path::Path;
use tracing::debug;

/// Headers the downloader cares about
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoreMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
    pub summary: Option<String>,
    pub requires_dist: Vec<String>,
}

/// Parse metadata header content
pub fn parse_metadata(content: &str) -> CoreMetadata {
    let mut meta = CoreMetadata::default();

    for line in content.lines() {
        // Header block ends at the first blank line
        if line.trim().is_empty() {
            break;
        }
        // Folded continuation of the previous header
        if line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim().to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => meta.name = Some(value),
                "version" => meta.version = Some(value),
                "summary" => meta.summary = Some(value),
                "requires-dist" => meta.requires_dist.push(value),
                _ => {}
            }
        }
    }

    meta
}

/// Locate the archive's metadata file
///
/// Prefers the shallowest `PKG-INFO` (an sdist's top-level copy over the
/// one inside `*.egg-info/`), then a wheel's `*.dist-info/METADATA`.
pub fn find_metadata_entry(reader: &dyn ArchiveReader) -> Option<String> {
    let depth = |name: &str| name.trim_end_matches('/').matches('/').count();

    reader
        .entry_names()
        .iter()
        .filter(|name| name.ends_with("PKG-INFO"))
        .min_by_key(|name| depth(name))
        .cloned()
        .or_else(|| reader.find_entry(".dist-info/METADATA"))
}

/// Read the core metadata block of an archive
pub fn read_metadata(reader: &mut dyn ArchiveReader, path: &Path) -> Result<CoreMetadata> {
    let entry = find_metadata_entry(reader).ok_or_else(|| {
        Error::ParseError(format!("No PKG-INFO or METADATA found in {}", path.display()))
    })?;
    let bytes = reader.read_entry(&entry)?;
    let content = String::from_utf8(bytes)
        .map_err(|e| Error::ParseError(format!("{} in {} is not UTF-8: {}", entry, path.display(), e)))?;
    Ok(parse_metadata(&content))
}

/// Read package identity from a downloaded artifact
pub fn read_package_info(path: &Path) -> Result<PackageInfo> {
    let mut reader = open_archive(path)?;
    let meta = read_metadata(reader.as_mut(), path)?;

    let name = meta
        .name
        .ok_or_else(|| Error::ParseError(format!("Package name not found in {}", path.display())))?;
    let version = meta.version.ok_or_else(|| {
        Error::ParseError(format!("Package version not found in {}", path.display()))
    })?;

    debug!("Read package info: {} version {}", name, version);

    Ok(PackageInfo {
        name,
        version,
        summary: meta.summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn test_parse_metadata_headers() {
        let content = "Metadata-Version: 2.1\n\
                       Name: Example-Pkg\n\
                       Version: 1.2.3\n\
                       Summary: An example\n\
                       Description: first line\n        continued line\n\
                       Requires-Dist: six (>=1.0)\n\
                       Requires-Dist: pytest ; extra == 'test'\n\
                       \n\
                       Name: not-a-header\n";

        let meta = parse_metadata(content);
        assert_eq!(meta.name.as_deref(), Some("Example-Pkg"));
        assert_eq!(meta.version.as_deref(), Some("1.2.3"));
        assert_eq!(meta.summary.as_deref(), Some("An example"));
        assert_eq!(meta.requires_dist.len(), 2);
    }

    #[test]
    fn test_read_package_info_prefers_top_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo-0.5.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("demo-0.5/demo.egg-info/PKG-INFO", options).unwrap();
        zip.write_all(b"Name: wrong\nVersion: 0.0\n").unwrap();
        zip.start_file("demo-0.5/PKG-INFO", options).unwrap();
        zip.write_all(b"Name: demo\nVersion: 0.5\n").unwrap();
        zip.finish().unwrap();

        let info = read_package_info(&path).unwrap();
        assert_eq!(info, PackageInfo::new("demo", "0.5"));
    }

    #[test]
    fn test_read_package_info_from_wheel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo-0.5-py3-none-any.whl");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("demo/__init__.py", options).unwrap();
        zip.start_file("demo-0.5.dist-info/METADATA", options).unwrap();
        zip.write_all(b"Metadata-Version: 2.1\nName: demo\nVersion: 0.5\n").unwrap();
        zip.finish().unwrap();

        let info = read_package_info(&path).unwrap();
        assert_eq!(info.name, "demo");
        assert_eq!(info.version, "0.5");
    }

    #[test]
    fn test_missing_metadata_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty-1.0.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("empty-1.0/setup.py", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.finish().unwrap();

        assert!(matches!(read_package_info(&path), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_missing_version_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noversion-1.0.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("noversion-1.0/PKG-INFO", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"Name: noversion\n").unwrap();
        zip.finish().unwrap();

        let err = read_package_info(&path).unwrap_err();
        assert!(err.to_string().contains("version"));
    }
}
