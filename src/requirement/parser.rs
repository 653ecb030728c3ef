// src/requirement/parser.rs

//! Requirement specification parsing
//!
//! Turns a requirements file into requirements plus the index directives it
//! carries, and builds `RequirementSet`s from original or synthetic specs.
//!
//! Supported line forms:
//! - `name[extras] <op> version, ... ; marker`
//! - `-e <target>` / `--editable <target>`
//! - `-r <file>` / `--requirement <file>` (relative to the including file)
//! - `-i <url>` / `--index-url <url>`, `--extra-index-url <url>`, `--no-index`
//! - `-f <url>` / `--find-links <url>`
//! - `#` comments and trailing `\` continuations

use super::{PackageInfo, Requirement, RequirementSet, canonical_name};
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Index directives found in a spec source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecOptions {
    /// Replacement for the configured index URLs (`--index-url`)
    pub index_url: Option<String>,
    pub extra_index_urls: Vec<String>,
    pub find_links: Vec<String>,
    pub no_index: bool,
}

impl SpecOptions {
    /// Apply these directives to a base list of index URLs
    pub fn index_urls(&self, configured: &[String]) -> Vec<String> {
        if self.no_index {
            return Vec::new();
        }
        let mut urls = match &self.index_url {
            Some(url) => vec![url.clone()],
            None => configured.to_vec(),
        };
        for url in &self.extra_index_urls {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        urls
    }
}

/// A parsed spec source
#[derive(Debug, Clone, Default)]
pub struct ParsedSpec {
    pub requirements: Vec<Requirement>,
    pub options: SpecOptions,
}

/// Turns a spec source into structured requirements
pub trait SpecParser {
    /// Parse the spec file at `path`
    fn parse_file(&self, path: &Path) -> Result<ParsedSpec>;
}

/// Parser for the line-oriented requirements file format
#[derive(Debug, Clone, Copy, Default)]
pub struct RequirementsFileParser;

impl RequirementsFileParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse requirements text; `-r` includes resolve against `base_dir`
    pub fn parse_str(&self, content: &str, base_dir: Option<&Path>) -> Result<ParsedSpec> {
        let mut parsed = ParsedSpec::default();
        let mut visited = HashSet::new();
        self.parse_into(content, base_dir, &mut parsed, &mut visited)?;
        Ok(parsed)
    }

    fn parse_into(
        &self,
        content: &str,
        base_dir: Option<&Path>,
        parsed: &mut ParsedSpec,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<()> {
        for (lineno, line) in logical_lines(content) {
            let line = strip_comment(&line);
            if line.is_empty() {
                continue;
            }

            if line.starts_with('-') {
                let (flag, value) = split_option(line);
                let value = || {
                    value.ok_or_else(|| {
                        Error::ParseError(format!("line {}: {} requires a value", lineno, flag))
                    })
                };
                match flag {
                    "-e" | "--editable" => {
                        parsed.requirements.push(Requirement::editable(value()?));
                    }
                    "-r" | "--requirement" => {
                        let path = resolve_include(value()?, base_dir);
                        self.parse_included(&path, parsed, visited)?;
                    }
                    "-i" | "--index-url" => parsed.options.index_url = Some(value()?.to_string()),
                    "--extra-index-url" => {
                        parsed.options.extra_index_urls.push(value()?.to_string())
                    }
                    "-f" | "--find-links" => parsed.options.find_links.push(value()?.to_string()),
                    "--no-index" => parsed.options.no_index = true,
                    _ => warn!("line {}: ignoring unsupported option {}", lineno, flag),
                }
                continue;
            }

            let req = Requirement::parse(line)
                .map_err(|e| Error::ParseError(format!("line {}: {}", lineno, e)))?;
            parsed.requirements.push(req);
        }
        Ok(())
    }

    fn parse_included(
        &self,
        path: &Path,
        parsed: &mut ParsedSpec,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<()> {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if !visited.insert(key) {
            debug!("Skipping already included {}", path.display());
            return Ok(());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            Error::ParseError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.parse_into(&content, path.parent(), parsed, visited)
    }
}

impl SpecParser for RequirementsFileParser {
    fn parse_file(&self, path: &Path) -> Result<ParsedSpec> {
        debug!("Parsing requirements from {}", path.display());
        let mut parsed = ParsedSpec::default();
        let mut visited = HashSet::new();
        self.parse_included(path, &mut parsed, &mut visited)?;
        Ok(parsed)
    }
}

/// Join `\` continuations; yields (first line number, text)
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut start = 0;

    for (i, raw) in content.lines().enumerate() {
        if current.is_empty() {
            start = i + 1;
        }
        match raw.strip_suffix('\\') {
            Some(head) => current.push_str(head),
            None => {
                current.push_str(raw);
                lines.push((start, std::mem::take(&mut current)));
            }
        }
    }
    if !current.is_empty() {
        lines.push((start, current));
    }
    lines
}

// A '#' only starts a comment at line start or after whitespace; URLs keep fragments
fn strip_comment(line: &str) -> &str {
    let line = line.trim();
    if line.starts_with('#') {
        return "";
    }
    match line.find(" #").or_else(|| line.find("\t#")) {
        Some(pos) => line[..pos].trim_end(),
        None => line,
    }
}

/// Split `--flag value`, `--flag=value` or `-fvalue`
fn split_option(line: &str) -> (&str, Option<&str>) {
    if line.starts_with("--") {
        if let Some((flag, value)) = line.split_once('=') {
            if !flag.contains(char::is_whitespace) {
                return (flag, Some(value.trim()));
            }
        }
    }
    match line.split_once(char::is_whitespace) {
        Some((flag, value)) => (flag, Some(value.trim())),
        None if !line.starts_with("--") && line.len() > 2 => (&line[..2], Some(line[2..].trim())),
        None => (line, None),
    }
}

fn resolve_include(target: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = Path::new(target);
    match base_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

/// Parse a spec file into a `RequirementSet` bound to `download_dir`
pub fn requirement_set_from_file(
    parser: &dyn SpecParser,
    path: &Path,
    download_dir: &Path,
) -> Result<(RequirementSet, SpecOptions)> {
    let parsed = parser.parse_file(path)?;
    let set = RequirementSet::from_requirements(download_dir, parsed.requirements);
    debug!(
        "Loaded {} requirements from {}",
        set.len(),
        path.display()
    );
    Ok((set, parsed.options))
}

/// Requirement lines that apply unconditionally
///
/// `requires.txt` lists optional dependencies under `[extra]` or `[:marker]`
/// section headers after the base requirements.
pub fn base_requirements(requires: &[String]) -> impl Iterator<Item = &String> {
    requires.iter().take_while(|line| !line.starts_with('['))
}

/// Temp-file prefix for a package's synthetic spec
///
/// Name and version come from the artifact's own metadata, so anything
/// outside `[A-Za-z0-9._-]` is replaced to keep the file in the temp dir.
fn temp_spec_prefix(package: &PackageInfo) -> String {
    let clean = |text: &str| -> String {
        text.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    };
    format!(
        "temp-req-{}-{}-",
        clean(&canonical_name(&package.name)),
        clean(&package.version)
    )
}

/// Build a child `RequirementSet` from requirements an artifact declares
///
/// The lines are written to a temporary spec file named after the owning
/// package and parsed back through `parser`, so nested requirements go
/// through the same parsing as top-level ones.
pub fn synthetic_requirement_set(
    parser: &dyn SpecParser,
    package: &PackageInfo,
    requires: &[String],
    download_dir: &Path,
) -> Result<RequirementSet> {
    let content = base_requirements(requires)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");

    let mut spec_file = tempfile::Builder::new()
        .prefix(&temp_spec_prefix(package))
        .suffix(".txt")
        .tempfile()?;
    spec_file.write_all(content.as_bytes())?;
    spec_file.flush()?;

    let parsed = parser.parse_file(spec_file.path())?;
    debug!(
        "Synthesized {} requirements for {}",
        parsed.requirements.len(),
        package
    );
    Ok(RequirementSet::from_requirements(
        download_dir,
        parsed.requirements,
    ))
}
