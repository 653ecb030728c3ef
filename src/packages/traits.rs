// src/packages/traits.rs

//! Common traits for artifact introspection

use crate::error::Result;
use crate::requirement::PackageInfo;
use std::path::Path;

/// Dependency declarations embedded in an artifact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyInfo {
    /// Extra sources to search for this artifact's dependencies
    pub dependency_links: Vec<String>,

    /// Requirement lines, in declaration order
    pub requires: Vec<String>,
}

impl DependencyInfo {
    pub fn has_requirements(&self) -> bool {
        !self.requires.is_empty()
    }
}

/// Reads package identity and dependency declarations from a downloaded artifact
pub trait PackageInspector {
    /// Name and version recorded in the artifact's own metadata
    fn package_info(&self, path: &Path) -> Result<PackageInfo>;

    /// Dependency links and nested requirements the artifact declares
    fn dependency_info(&self, path: &Path) -> Result<DependencyInfo>;
}
