// src/requirement/mod.rs

//! Requirement data model
//!
//! - `Requirement`: a requested package (name, extras, version spec, editable flag)
//! - `RequirementSet`: ordered, de-duplicated requirements bound to a download directory
//! - `Link`: a resolved download location
//! - `PackageInfo`: identity read from a fetched artifact
//! - `DownloadError`: a requirement that could not be fetched, with the reason

pub mod parser;

use crate::error::{Error, Result};
use crate::version::VersionSpec;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub use parser::{RequirementsFileParser, SpecOptions, SpecParser};

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<name>[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(?:\[(?P<extras>[^\]]*)\])?\s*(?P<rest>.*)$",
    )
    .expect("requirement regex is valid")
});

/// Canonical project name: lowercase, runs of `-`, `_`, `.` collapsed to `-`
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_sep = true;
        } else {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// A requested package
#[derive(Debug, Clone)]
pub struct Requirement {
    name: String,
    extras: Vec<String>,
    spec: VersionSpec,
    editable: bool,
    url: Option<String>,
}

impl Requirement {
    /// Parse a requirement specifier such as `Foo[bar]>=1.0,<2; python_version>"3"`
    ///
    /// Environment markers are dropped. `name @ url` and bare URLs carrying an
    /// `#egg=name` fragment become direct-URL requirements.
    pub fn parse(line: &str) -> Result<Self> {
        let without_marker = match line.split_once(';') {
            Some((req, _marker)) => req,
            None => line,
        }
        .trim();

        if without_marker.is_empty() {
            return Err(Error::ParseError("Empty requirement".to_string()));
        }

        if let Some((name, url)) = without_marker.split_once(" @ ") {
            let mut req = Self::parse_named(name.trim())?;
            req.url = Some(url.trim().to_string());
            return Ok(req);
        }

        if without_marker.contains("://") || without_marker.starts_with("file:") {
            let name = egg_name(without_marker).ok_or_else(|| {
                Error::ParseError(format!(
                    "URL requirement needs an #egg= fragment: '{}'",
                    without_marker
                ))
            })?;
            let mut req = Self::parse_named(&name)?;
            req.url = Some(without_marker.to_string());
            return Ok(req);
        }

        Self::parse_named(without_marker)
    }

    /// An editable (source checkout) requirement for `target`
    pub fn editable(target: &str) -> Self {
        let target = target.trim();
        let name = egg_name(target).unwrap_or_else(|| {
            target
                .trim_end_matches('/')
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(target)
                .to_string()
        });
        Self {
            name,
            extras: Vec::new(),
            spec: VersionSpec::default(),
            editable: true,
            url: Some(target.to_string()),
        }
    }

    fn parse_named(text: &str) -> Result<Self> {
        let caps = NAME_RE
            .captures(text)
            .ok_or_else(|| Error::ParseError(format!("Invalid requirement: '{}'", text)))?;

        let extras = caps
            .name("extras")
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        // Legacy metadata writes "foo (>=1.0)"
        let rest = caps["rest"].trim();
        let rest = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(rest);

        let spec = VersionSpec::parse(rest)
            .map_err(|e| Error::ParseError(format!("Invalid requirement '{}': {}", text, e)))?;

        Ok(Self {
            name: caps["name"].to_string(),
            extras,
            spec,
            editable: false,
            url: None,
        })
    }

    /// Name as written
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn canonical_name(&self) -> String {
        canonical_name(&self.name)
    }

    pub fn extras(&self) -> &[String] {
        &self.extras
    }

    pub fn spec(&self) -> &VersionSpec {
        &self.spec
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    /// Direct URL or editable target, if any
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Normalized textual form; identity for de-duplication and error records
    pub fn key(&self) -> String {
        if self.editable {
            return format!("-e {}", self.url.as_deref().unwrap_or(&self.name));
        }

        let mut key = canonical_name(&self.name);
        if !self.extras.is_empty() {
            let mut extras = self.extras.clone();
            extras.sort();
            key.push('[');
            key.push_str(&extras.join(","));
            key.push(']');
        }
        key.push_str(&self.spec.to_string());
        if let Some(url) = &self.url {
            key.push_str(" @ ");
            key.push_str(url);
        }
        key
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Reject filenames that would leave the directory they are joined to
pub fn check_filename(filename: &str) -> Result<()> {
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\'])
        || Path::new(filename).is_absolute()
    {
        return Err(Error::ParseError(format!(
            "Unsafe artifact filename '{}'",
            filename
        )));
    }
    Ok(())
}

/// Project name from an `#egg=name` or `#egg=name-version` fragment
fn egg_name(url: &str) -> Option<String> {
    let (_, fragment) = url.split_once('#')?;
    fragment
        .split('&')
        .find_map(|part| part.strip_prefix("egg="))
        .map(|egg| egg.split('[').next().unwrap_or(egg).to_string())
        .filter(|egg| !egg.is_empty())
}

/// Ordered requirements keyed by `Requirement::key`, bound to a download directory
#[derive(Debug, Clone)]
pub struct RequirementSet {
    requirements: Vec<Requirement>,
    positions: HashMap<String, usize>,
    download_dir: PathBuf,
}

impl RequirementSet {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            requirements: Vec::new(),
            positions: HashMap::new(),
            download_dir: download_dir.into(),
        }
    }

    /// Build a set from requirements in order; later duplicates are ignored
    pub fn from_requirements(
        download_dir: impl Into<PathBuf>,
        requirements: impl IntoIterator<Item = Requirement>,
    ) -> Self {
        let mut set = Self::new(download_dir);
        for req in requirements {
            set.add_requirement(req);
        }
        set
    }

    /// Add a requirement; returns false if one with the same key is already present
    pub fn add_requirement(&mut self, req: Requirement) -> bool {
        let key = req.key();
        if self.positions.contains_key(&key) {
            return false;
        }
        self.positions.insert(key, self.requirements.len());
        self.requirements.push(req);
        true
    }

    pub fn get(&self, key: &str) -> Option<&Requirement> {
        self.positions.get(key).map(|&i| &self.requirements[i])
    }

    pub fn contains(&self, req: &Requirement) -> bool {
        self.positions.contains_key(&req.key())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.requirements.iter()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }
}

/// A resolved download location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub filename: String,
}

impl Link {
    /// Create a link, taking the filename from the last URL path segment
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let parsed = url::Url::parse(&url)
            .map_err(|e| Error::ParseError(format!("Invalid link '{}': {}", url, e)))?;
        let filename = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                urlencoding::decode(segment)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| segment.to_string())
            })
            .ok_or_else(|| Error::ParseError(format!("Link has no filename: '{}'", url)))?;
        check_filename(&filename)
            .map_err(|e| Error::ParseError(format!("Link '{}': {}", url, e)))?;
        Ok(Self { url, filename })
    }

    pub fn with_filename(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
        }
    }

    /// URL to request: everything before the first `#`
    pub fn fetch_url(&self) -> &str {
        self.url.split('#').next().unwrap_or(&self.url)
    }

    pub fn fragment(&self) -> Option<&str> {
        self.url.split_once('#').map(|(_, fragment)| fragment)
    }

    /// Expected SHA-256 digest from a `#sha256=<hex>` fragment
    pub fn sha256(&self) -> Option<&str> {
        self.fragment()?
            .split('&')
            .find_map(|part| part.strip_prefix("sha256="))
    }

    /// Project name from an `#egg=` fragment
    pub fn egg(&self) -> Option<String> {
        egg_name(&self.url)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Identity of a fetched artifact, read from its own metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub summary: Option<String>,
}

impl PackageInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            summary: None,
        }
    }
}

impl fmt::Display for PackageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// A requirement that could not be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadError {
    pub requirement: Requirement,
    pub reason: String,
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.requirement, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("Foo_Bar"), "foo-bar");
        assert_eq!(canonical_name("zope.interface"), "zope-interface");
        assert_eq!(canonical_name("a-_.b"), "a-b");
        assert_eq!(canonical_name("Django"), "django");
    }

    #[test]
    fn test_parse_simple() {
        let req = Requirement::parse("requests>=2.0").unwrap();
        assert_eq!(req.name(), "requests");
        assert_eq!(req.spec().to_string(), ">=2.0");
        assert!(!req.is_editable());
        assert_eq!(req.key(), "requests>=2.0");
    }

    #[test]
    fn test_parse_extras_and_marker() {
        let req = Requirement::parse("Celery[Redis, auth] >= 4.0 ; python_version >= '3'").unwrap();
        assert_eq!(req.name(), "Celery");
        assert_eq!(req.extras(), &["redis".to_string(), "auth".to_string()]);
        assert_eq!(req.key(), "celery[auth,redis]>=4.0");
    }

    #[test]
    fn test_parse_legacy_parenthesized() {
        let req = Requirement::parse("zope.interface (>=3.6.0)").unwrap();
        assert_eq!(req.key(), "zope-interface>=3.6.0");
    }

    #[test]
    fn test_parse_url_requirements() {
        let req = Requirement::parse("https://example.com/foo-1.0.tar.gz#egg=foo").unwrap();
        assert_eq!(req.name(), "foo");
        assert_eq!(req.url(), Some("https://example.com/foo-1.0.tar.gz#egg=foo"));

        let req = Requirement::parse("bar @ https://example.com/bar.zip").unwrap();
        assert_eq!(req.name(), "bar");
        assert_eq!(req.url(), Some("https://example.com/bar.zip"));

        assert!(Requirement::parse("https://example.com/anon.tar.gz").is_err());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Requirement::parse("").is_err());
        assert!(Requirement::parse("foo >> 1").is_err());
    }

    #[test]
    fn test_editable() {
        let req = Requirement::editable("git+https://example.com/repo.git#egg=mypkg");
        assert!(req.is_editable());
        assert_eq!(req.name(), "mypkg");
        assert_eq!(req.key(), "-e git+https://example.com/repo.git#egg=mypkg");

        let local = Requirement::editable("./src/localpkg/");
        assert_eq!(local.name(), "localpkg");
    }

    #[test]
    fn test_identity_is_normalized() {
        let a = Requirement::parse("Foo_Bar >= 1.0").unwrap();
        let b = Requirement::parse("foo-bar>=1.0").unwrap();
        assert_eq!(a, b);

        let c = Requirement::parse("foo-bar>=2.0").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_requirement_set_order_and_dedup() {
        let mut set = RequirementSet::new("/tmp/dl");
        assert!(set.add_requirement(Requirement::parse("b").unwrap()));
        assert!(set.add_requirement(Requirement::parse("a==1").unwrap()));
        assert!(!set.add_requirement(Requirement::parse("B").unwrap()));

        let names: Vec<&str> = set.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(set.len(), 2);
        assert!(set.get("a==1").is_some());
        assert_eq!(set.download_dir(), Path::new("/tmp/dl"));
    }

    #[test]
    fn test_link_fragments() {
        let link = Link::new(
            "https://files.example.com/packages/foo-1.0.tar.gz#sha256=abc123",
        )
        .unwrap();
        assert_eq!(link.filename, "foo-1.0.tar.gz");
        assert_eq!(link.fetch_url(), "https://files.example.com/packages/foo-1.0.tar.gz");
        assert_eq!(link.sha256(), Some("abc123"));

        let plain = Link::new("https://example.com/bar-2.0.zip").unwrap();
        assert_eq!(plain.fetch_url(), plain.url);
        assert_eq!(plain.sha256(), None);
    }

    #[test]
    fn test_link_decodes_filename() {
        let link = Link::new("https://example.com/pkgs/foo%2Bbar-1.0.zip").unwrap();
        assert_eq!(link.filename, "foo+bar-1.0.zip");
    }

    #[test]
    fn test_link_without_filename() {
        assert!(Link::new("https://example.com/").is_err());
        assert!(Link::new("not a url").is_err());
    }

    #[test]
    fn test_link_rejects_path_escapes() {
        for url in [
            "https://example.com/x/..%2Fescaped-1.0.tar.gz",
            "https://example.com/x/%2Ftmp%2Fescaped-1.0.tar.gz",
            "https://example.com/x/sub%5Cescaped-1.0.tar.gz",
            "https://example.com/x/%2E%2E",
        ] {
            assert!(
                matches!(Link::new(url), Err(Error::ParseError(_))),
                "{} accepted",
                url
            );
        }
        assert!(Link::new("https://example.com/x/..dots..-1.0.tar.gz").is_ok());
    }

    #[test]
    fn test_check_filename() {
        assert!(check_filename("foo-1.0.tar.gz").is_ok());
        assert!(check_filename("").is_err());
        assert!(check_filename(".").is_err());
        assert!(check_filename("..").is_err());
        assert!(check_filename("a/b.zip").is_err());
        assert!(check_filename("/abs.zip").is_err());
    }
}
