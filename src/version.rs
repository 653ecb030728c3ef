// src/version.rs

//! Package version parsing and constraint matching
//!
//! Versions follow the PEP 440 scheme used by Python package indexes:
//! `[N!]N(.N)*[{a|b|rc}N][.postN][.devN][+local]`. Parsing is lenient about
//! separators and spelling (`1.0-alpha1`, `1.0.RC2`, `1.0-1`) the same way
//! index tooling is.

use crate::error::{Error, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)^
        v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?:[-_.]?(?P<pre_l>alpha|beta|preview|pre|a|b|c|rc)[-_.]?(?P<pre_n>[0-9]+)?)?
        (?P<post>-(?P<post_n1>[0-9]+)|[-_.]?(?:post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?)?
        (?P<dev>[-_.]?dev[-_.]?(?P<dev_n>[0-9]+)?)?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        $",
    )
    .expect("version regex is valid")
});

/// Pre-release phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreRelease {
    Alpha,
    Beta,
    ReleaseCandidate,
}

/// A parsed package version
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreRelease, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<String>,
}

impl Version {
    /// Parse a version string
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().to_lowercase();
        let caps = VERSION_RE
            .captures(&normalized)
            .ok_or_else(|| Error::ParseError(format!("Invalid version: '{}'", input)))?;

        let number = |name: &str| -> Result<Option<u64>> {
            caps.name(name)
                .map(|m| {
                    m.as_str().parse::<u64>().map_err(|e| {
                        Error::ParseError(format!("Invalid version '{}': {}", input, e))
                    })
                })
                .transpose()
        };

        let epoch = number("epoch")?.unwrap_or(0);

        let release = caps["release"]
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|e| Error::ParseError(format!("Invalid version '{}': {}", input, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let pre = match caps.name("pre_l") {
            Some(label) => {
                let phase = match label.as_str() {
                    "a" | "alpha" => PreRelease::Alpha,
                    "b" | "beta" => PreRelease::Beta,
                    _ => PreRelease::ReleaseCandidate,
                };
                Some((phase, number("pre_n")?.unwrap_or(0)))
            }
            None => None,
        };

        let post = match caps.name("post") {
            Some(_) => Some(number("post_n1")?.or(number("post_n2")?).unwrap_or(0)),
            None => None,
        };

        let dev = match caps.name("dev") {
            Some(_) => Some(number("dev_n")?.unwrap_or(0)),
            None => None,
        };

        Ok(Self {
            raw: input.trim().to_string(),
            epoch,
            release,
            pre,
            post,
            dev,
            local: caps.name("local").map(|m| m.as_str().to_string()),
        })
    }

    /// The version text as it was written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// Whether this is a pre-release or development release
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    fn trimmed_release(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|&part| part != 0)
            .map_or(0, |pos| pos + 1);
        &self.release[..end]
    }

    fn pre_key(&self) -> (i8, Option<(PreRelease, u64)>) {
        match (self.pre, self.post, self.dev) {
            // 1.0.dev0 sorts before 1.0a0
            (None, None, Some(_)) => (-1, None),
            (None, _, _) => (1, None),
            (Some(pre), _, _) => (0, Some(pre)),
        }
    }

    fn dev_key(&self) -> (u8, u64) {
        match self.dev {
            Some(n) => (0, n),
            None => (1, 0),
        }
    }

    fn cmp_public(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.trimmed_release().cmp(other.trimmed_release()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
    }

    /// Whether `self` starts with the release segments of `prefix`
    fn release_starts_with(&self, prefix: &[u64]) -> bool {
        prefix
            .iter()
            .enumerate()
            .all(|(i, part)| self.release.get(i).copied().unwrap_or(0) == *part)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_public(other)
            .then_with(|| self.local.cmp(&other.local))
    }
}

/// Comparison operator in a version clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterEqual,
    LessEqual,
    Greater,
    Less,
    Compatible,
    Arbitrary,
}

impl Operator {
    // Longest operators first so "==" is not read as "=" + "=..."
    const ALL: [(&'static str, Operator); 8] = [
        ("===", Operator::Arbitrary),
        ("~=", Operator::Compatible),
        ("==", Operator::Equal),
        ("!=", Operator::NotEqual),
        (">=", Operator::GreaterEqual),
        ("<=", Operator::LessEqual),
        (">", Operator::Greater),
        ("<", Operator::Less),
    ];

    pub fn as_str(&self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(_, op)| op == self)
            .map(|(text, _)| *text)
            .unwrap_or("==")
    }
}

/// A single `op version` clause
#[derive(Debug, Clone)]
pub struct Clause {
    pub operator: Operator,
    pub version: String,
    wildcard: bool,
}

impl Clause {
    fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (text, operator) = Operator::ALL
            .iter()
            .find(|(text, _)| input.starts_with(text))
            .copied()
            .ok_or_else(|| Error::ParseError(format!("Missing operator in '{}'", input)))?;

        let version = input[text.len()..].trim();
        if version.is_empty() {
            return Err(Error::ParseError(format!("Missing version in '{}'", input)));
        }

        let wildcard = version.ends_with(".*");
        if wildcard && !matches!(operator, Operator::Equal | Operator::NotEqual) {
            return Err(Error::ParseError(format!(
                "Wildcard only allowed with == or !=: '{}'",
                input
            )));
        }

        let clause = Self {
            operator,
            version: version.to_string(),
            wildcard,
        };
        if operator != Operator::Arbitrary {
            clause.target()?;
        }
        if operator == Operator::Compatible && clause.target()?.release.len() < 2 {
            return Err(Error::ParseError(format!(
                "~= requires at least two release segments: '{}'",
                input
            )));
        }
        Ok(clause)
    }

    fn target(&self) -> Result<Version> {
        Version::parse(self.version.trim_end_matches(".*"))
    }

    fn matches(&self, candidate: &Version) -> bool {
        if self.operator == Operator::Arbitrary {
            return candidate.as_str().eq_ignore_ascii_case(&self.version);
        }
        let Ok(target) = self.target() else {
            return false;
        };

        match self.operator {
            Operator::Equal if self.wildcard => {
                candidate.epoch == target.epoch && candidate.release_starts_with(&target.release)
            }
            Operator::NotEqual if self.wildcard => {
                !(candidate.epoch == target.epoch
                    && candidate.release_starts_with(&target.release))
            }
            Operator::Equal => Self::equal(candidate, &target),
            Operator::NotEqual => !Self::equal(candidate, &target),
            Operator::GreaterEqual => candidate.cmp_public(&target) != Ordering::Less,
            Operator::LessEqual => candidate.cmp_public(&target) != Ordering::Greater,
            Operator::Greater => candidate.cmp_public(&target) == Ordering::Greater,
            Operator::Less => candidate.cmp_public(&target) == Ordering::Less,
            Operator::Compatible => {
                let prefix = &target.release[..target.release.len() - 1];
                candidate.cmp_public(&target) != Ordering::Less
                    && candidate.epoch == target.epoch
                    && candidate.release_starts_with(prefix)
            }
            Operator::Arbitrary => candidate.as_str().eq_ignore_ascii_case(&self.version),
        }
    }

    // A target without a local label matches any local build of that version
    fn equal(candidate: &Version, target: &Version) -> bool {
        if target.local.is_none() {
            candidate.cmp_public(target) == Ordering::Equal
        } else {
            candidate == target
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator.as_str(), self.version)
    }
}

/// A comma-separated set of version clauses; empty matches everything
#[derive(Debug, Clone, Default)]
pub struct VersionSpec {
    clauses: Vec<Clause>,
}

impl VersionSpec {
    /// Parse `>=1.0, <2.0` style specifier text
    pub fn parse(input: &str) -> Result<Self> {
        let clauses = input
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Clause::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Whether every clause accepts `version`
    pub fn matches(&self, version: &Version) -> bool {
        self.clauses.iter().all(|clause| clause.matches(version))
    }

    /// Whether a clause names a pre-release, which opts the spec in to them
    pub fn mentions_prerelease(&self) -> bool {
        self.clauses.iter().any(|clause| {
            clause
                .target()
                .map(|v| v.is_prerelease())
                .unwrap_or(false)
        })
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.clauses.iter().map(Clause::to_string).collect();
        f.write_str(&parts.join(","))
    }
}
