// src/packages/mod.rs

//! Artifact introspection
//!
//! Reads the metadata a source distribution, wheel, or egg carries about
//! itself: its name and version (`PKG-INFO` / `METADATA`) and the
//! dependencies it declares (`*.egg-info/requires.txt`,
//! `*.egg-info/dependency_links.txt`).

pub mod metadata;
pub mod pkginfo;
pub mod traits;

pub use metadata::MetadataExtractor;
pub use traits::{DependencyInfo, PackageInspector};

use crate::error::Result;
use crate::requirement::PackageInfo;
use std::path::Path;

/// Inspector backed by the artifact's archive contents
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveInspector;

impl PackageInspector for ArchiveInspector {
    fn package_info(&self, path: &Path) -> Result<PackageInfo> {
        pkginfo::read_package_info(path)
    }

    fn dependency_info(&self, path: &Path) -> Result<DependencyInfo> {
        MetadataExtractor::extract(path)
    }
}
