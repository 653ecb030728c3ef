// src/lib.rs

//! pipext: recursive package artifact downloader
//!
//! Given a requirements specification, pipext locates an artifact for each
//! requirement on a package index, downloads it, reads the dependencies the
//! artifact declares, and repeats for those, until the whole dependency tree
//! is on disk. Nothing is built or installed.
//!
//! # Architecture
//!
//! - `requirement`: requirements, requirement sets, links, and the spec parser
//! - `repository`: HTTP transport, the downloader, and the index resolver
//! - `archive` / `packages`: reading identity and dependency metadata out of artifacts
//! - `resolver`: the resolution session that ties them together
//!
//! ```no_run
//! use pipext::{ResolutionSession, ResolverConfig};
//! use std::path::Path;
//!
//! # fn main() -> pipext::Result<()> {
//! let config = ResolverConfig::new("downloads");
//! let (mut session, requirements) =
//!     ResolutionSession::from_spec_file(Path::new("requirements.txt"), config)?;
//!
//! for result in session.download_all(&requirements) {
//!     let downloaded = result?;
//!     println!("{} -> {}", downloaded.package, downloaded.path.display());
//! }
//! for failure in session.errors() {
//!     eprintln!("{}", failure);
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
mod error;
pub mod packages;
pub mod repository;
pub mod requirement;
pub mod resolver;
pub mod version;

pub use config::{FailurePolicy, ResolverConfig};
pub use error::{Error, Result};
pub use repository::Downloaded;
pub use requirement::{DownloadError, Link, PackageInfo, Requirement, RequirementSet};
pub use resolver::{ResolutionSession, download_all_from_file};
