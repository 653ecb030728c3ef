// src/repository/index.rs

//! Requirement to download-link resolution
//!
//! Candidates come from three kinds of source:
//! - simple-index pages: `<index>/<canonical-name>/`, one anchor per file
//! - find-links: an HTML page of anchors, or a direct archive URL
//! - dependency links declared by already-fetched artifacts, treated like find-links
//!
//! The highest version satisfying the requirement wins.

use super::Transport;
use crate::archive::ArchiveFormat;
use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::requirement::{Link, Requirement, SpecOptions, canonical_name};
use crate::version::Version;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};
use url::Url;

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s(?P<attrs>[^>]*)>"#).expect("anchor regex is valid")
});

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bhref\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^\s>]+))"#)
        .expect("href regex is valid")
});

const ARCHIVE_SUFFIXES: [&str; 8] = [
    ".tar.gz", ".tar.bz2", ".tgz", ".tbz2", ".tar", ".zip", ".whl", ".egg",
];

/// Finds a download link for a requirement
pub trait IndexResolver {
    /// Best link for `req`; `upgrade` prefers the newest version over one
    /// already present locally
    fn find_requirement(&self, req: &Requirement, upgrade: bool) -> Result<Link>;

    /// A resolver whose "already present locally" checks look in `download_dir`
    fn in_download_dir(&self, download_dir: &Path) -> Arc<dyn IndexResolver>;

    /// A resolver that also searches `dependency_links`
    fn with_dependency_links(&self, dependency_links: &[String]) -> Arc<dyn IndexResolver>;
}

/// A link whose filename or `#egg=` fragment names a project version
#[derive(Debug, Clone)]
struct Candidate {
    link: Link,
    version: Version,
    wheel: bool,
}

/// Resolver over simple-index pages and find-links sources
#[derive(Clone)]
pub struct SimpleIndexResolver {
    transport: Arc<dyn Transport>,
    index_urls: Vec<String>,
    find_links: Vec<String>,
    dependency_links: Vec<String>,
    allow_prereleases: bool,
    local_dir: Option<PathBuf>,
}

impl SimpleIndexResolver {
    pub fn new(transport: Arc<dyn Transport>, index_urls: Vec<String>) -> Self {
        Self {
            transport,
            index_urls,
            find_links: Vec::new(),
            dependency_links: Vec::new(),
            allow_prereleases: false,
            local_dir: None,
        }
    }

    /// Resolver for `config`, with a spec source's index directives applied
    pub fn from_config(
        transport: Arc<dyn Transport>,
        config: &ResolverConfig,
        options: &SpecOptions,
    ) -> Self {
        let mut find_links = config.find_links.clone();
        for link in &options.find_links {
            if !find_links.contains(link) {
                find_links.push(link.clone());
            }
        }

        Self::new(transport, options.index_urls(&config.index_urls))
            .with_find_links(find_links)
            .allow_prereleases(config.allow_prereleases)
    }

    pub fn with_find_links(mut self, find_links: Vec<String>) -> Self {
        self.find_links = find_links;
        self
    }

    pub fn allow_prereleases(mut self, allow: bool) -> Self {
        self.allow_prereleases = allow;
        self
    }

    /// Without `upgrade`, a satisfying file already in `dir` wins over newer ones
    pub fn prefer_existing_in(mut self, dir: PathBuf) -> Self {
        self.local_dir = Some(dir);
        self
    }

    pub fn index_urls(&self) -> &[String] {
        &self.index_urls
    }

    pub fn dependency_links(&self) -> &[String] {
        &self.dependency_links
    }

    /// Candidates from every source, plus the sources that could not be read
    fn collect_candidates(&self, project: &str) -> (Vec<Candidate>, Vec<String>) {
        let mut candidates = Vec::new();
        let mut unreachable = Vec::new();

        for index in &self.index_urls {
            let page_url = format!("{}/{}/", index.trim_end_matches('/'), project);
            if let Err(e) = self.collect_from_page(&page_url, project, &mut candidates) {
                unreachable.push(format!("{} ({})", page_url, e));
            }
        }

        for source in self.find_links.iter().chain(&self.dependency_links) {
            if is_archive_url(source) {
                match Link::new(source.as_str()) {
                    Ok(link) => candidates.extend(candidate_for(link, project)),
                    Err(e) => warn!("Ignoring link {}: {}", source, e),
                }
            } else if let Err(e) = self.collect_from_page(source, project, &mut candidates) {
                unreachable.push(format!("{} ({})", source, e));
            }
        }

        (candidates, unreachable)
    }

    // An unreachable source is not fatal; other sources may still match
    fn collect_from_page(
        &self,
        page_url: &str,
        project: &str,
        out: &mut Vec<Candidate>,
    ) -> Result<()> {
        let body = self.transport.get_text(page_url).inspect_err(|e| {
            warn!("Skipping {}: {}", page_url, e);
        })?;

        let Ok(base) = Url::parse(page_url) else {
            warn!("Skipping unparseable page URL {}", page_url);
            return Ok(());
        };

        let before = out.len();
        out.extend(
            parse_links(&body, &base)
                .into_iter()
                .filter_map(|link| candidate_for(link, project)),
        );
        debug!("{}: {} candidates for {}", page_url, out.len() - before, project);
        Ok(())
    }

    fn select(&self, req: &Requirement, candidates: Vec<Candidate>, upgrade: bool) -> Option<Link> {
        let spec = req.spec();
        let mut matching: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| spec.matches(&c.version))
            .collect();

        let want_prereleases = self.allow_prereleases || spec.mentions_prerelease();
        if !want_prereleases && matching.iter().any(|c| !c.version.is_prerelease()) {
            matching.retain(|c| !c.version.is_prerelease());
        }

        // Highest version first; sdists before wheels of the same version
        matching.sort_by(|a, b| b.version.cmp(&a.version).then(a.wheel.cmp(&b.wheel)));

        if !upgrade {
            if let Some(dir) = &self.local_dir {
                if let Some(existing) = matching
                    .iter()
                    .find(|c| dir.join(&c.link.filename).is_file())
                {
                    debug!("Using already downloaded {}", existing.link.filename);
                    return Some(existing.link.clone());
                }
            }
        }

        matching.into_iter().next().map(|c| c.link)
    }
}

impl IndexResolver for SimpleIndexResolver {
    fn find_requirement(&self, req: &Requirement, upgrade: bool) -> Result<Link> {
        if let Some(url) = req.url() {
            return Link::new(url);
        }

        let project = req.canonical_name();
        let (candidates, unreachable) = self.collect_candidates(&project);
        debug!("{} candidate links for {}", candidates.len(), project);

        let link = self.select(req, candidates, upgrade).ok_or_else(|| {
            let mut msg = format!("No distributions matching '{}' found", req);
            if !unreachable.is_empty() {
                msg.push_str("; unreachable sources: ");
                msg.push_str(&unreachable.join(", "));
            }
            Error::NotFoundError(msg)
        })?;
        info!("Resolved {} to {}", req, link.filename);
        Ok(link)
    }

    fn in_download_dir(&self, download_dir: &Path) -> Arc<dyn IndexResolver> {
        Arc::new(self.clone().prefer_existing_in(download_dir.to_path_buf()))
    }

    fn with_dependency_links(&self, dependency_links: &[String]) -> Arc<dyn IndexResolver> {
        let mut resolver = self.clone();
        for link in dependency_links {
            if !resolver.dependency_links.contains(link) {
                resolver.dependency_links.push(link.clone());
            }
        }
        Arc::new(resolver)
    }
}

/// Absolute links from every anchor in `html`, resolved against `base`
///
/// Anchors marked `data-yanked` are skipped.
pub fn parse_links(html: &str, base: &Url) -> Vec<Link> {
    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|anchor| {
            let attrs = anchor.name("attrs")?.as_str();
            if attrs.contains("data-yanked") {
                return None;
            }
            let href = HREF_RE.captures(attrs)?;
            let raw = href
                .name("dq")
                .or_else(|| href.name("sq"))
                .or_else(|| href.name("bare"))?
                .as_str();
            let url = base.join(&unescape_html(raw)).ok()?;
            Link::new(url.to_string()).ok()
        })
        .collect()
}

fn unescape_html(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&#61;", "=")
        .replace("&quot;", "\"")
}

fn is_archive_url(url: &str) -> bool {
    let path = url.split(['#', '?']).next().unwrap_or(url);
    ArchiveFormat::detect(Path::new(path)).is_ok()
}

/// Candidate for `project` if the link names one of its versions
fn candidate_for(link: Link, project: &str) -> Option<Candidate> {
    if let Some(egg) = link.egg() {
        let (name, version) = split_name_version(&egg, project)?;
        if canonical_name(name) != project {
            return None;
        }
        let version = Version::parse(version).ok()?;
        return Some(Candidate {
            link,
            version,
            wheel: false,
        });
    }

    let lower = link.filename.to_lowercase();
    let suffix = ARCHIVE_SUFFIXES.iter().find(|s| lower.ends_with(*s))?;
    let stem = &link.filename[..link.filename.len() - suffix.len()];
    let wheel = *suffix == ".whl" || *suffix == ".egg";

    let (name, version) = if wheel {
        // name-version-tags...
        let mut parts = stem.splitn(3, '-');
        (parts.next()?, parts.next()?)
    } else {
        split_name_version(stem, project)?
    };

    if canonical_name(name) != project {
        return None;
    }
    let version = Version::parse(version).ok()?;
    Some(Candidate {
        link,
        version,
        wheel,
    })
}

/// Split `name-version` where the name itself may contain dashes
fn split_name_version<'a>(stem: &'a str, project: &str) -> Option<(&'a str, &'a str)> {
    stem.match_indices('-')
        .map(|(i, _)| (&stem[..i], &stem[i + 1..]))
        .find(|(name, _)| canonical_name(name) == project)
}

#[cfg(test)]
mod tests {
    use super::super::testing::MemoryTransport;
    use super::*;

    const INDEX: &str = "https://pypi.example.com/simple";

    fn page(files: &[&str]) -> String {
        let anchors: Vec<String> = files
            .iter()
            .map(|f| format!(r#"<a href="../../packages/{f}#sha256=00">{f}</a><br/>"#))
            .collect();
        format!("<html><body>{}</body></html>", anchors.join("\n"))
    }

    fn resolver(transport: MemoryTransport) -> SimpleIndexResolver {
        SimpleIndexResolver::new(Arc::new(transport), vec![INDEX.to_string()])
    }

    fn req(line: &str) -> Requirement {
        Requirement::parse(line).unwrap()
    }

    #[test]
    fn test_parse_links_resolves_relative() {
        let base = Url::parse("https://pypi.example.com/simple/foo/").unwrap();
        let html = r#"
            <a href="../../packages/foo-1.0.tar.gz#sha256=ab">foo-1.0.tar.gz</a>
            <A HREF='https://other.example.com/foo-1.1.zip'>foo-1.1.zip</A>
            <a data-yanked="" href="foo-0.9.tar.gz">yanked</a>
            <a href="foo-2.0.tar.gz?x=1&amp;y=2">query</a>
        "#;

        let links = parse_links(html, &base);
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://pypi.example.com/packages/foo-1.0.tar.gz#sha256=ab",
                "https://other.example.com/foo-1.1.zip",
                "https://pypi.example.com/simple/foo/foo-2.0.tar.gz?x=1&y=2",
            ]
        );
        assert_eq!(links[0].filename, "foo-1.0.tar.gz");
    }

    #[test]
    fn test_candidate_name_parsing() {
        let link = |f: &str| Link::new(format!("https://example.com/{f}")).unwrap();

        let c = candidate_for(link("zope.interface-4.0.5.zip"), "zope-interface").unwrap();
        assert_eq!(c.version, Version::parse("4.0.5").unwrap());

        let c = candidate_for(link("my-pkg-2.1.tar.gz"), "my-pkg").unwrap();
        assert_eq!(c.version.as_str(), "2.1");

        let c = candidate_for(link("my_pkg-2.1-py3-none-any.whl"), "my-pkg").unwrap();
        assert!(c.wheel);

        assert!(candidate_for(link("my-pkg-extra-2.1.tar.gz"), "my-pkg").is_none());
        assert!(candidate_for(link("other-1.0.tar.gz"), "my-pkg").is_none());
        assert!(candidate_for(link("my-pkg-1.0.exe"), "my-pkg").is_none());

        let egg = Link::new("https://example.com/repo/tarball/master#egg=my-pkg-3.0").unwrap();
        let c = candidate_for(egg, "my-pkg").unwrap();
        assert_eq!(c.version.as_str(), "3.0");
    }

    #[test]
    fn test_find_highest_matching_version() {
        let transport = MemoryTransport::default().page(
            "https://pypi.example.com/simple/foo/",
            &page(&["foo-1.0.tar.gz", "foo-1.5.tar.gz", "foo-2.0.tar.gz", "foo-2.1b1.tar.gz"]),
        );
        let resolver = resolver(transport);

        let link = resolver.find_requirement(&req("foo"), false).unwrap();
        assert_eq!(link.filename, "foo-2.0.tar.gz");

        let link = resolver.find_requirement(&req("foo<2"), false).unwrap();
        assert_eq!(link.filename, "foo-1.5.tar.gz");
        assert_eq!(link.url, "https://pypi.example.com/packages/foo-1.5.tar.gz#sha256=00");

        let link = resolver.find_requirement(&req("foo>=2.1b1"), false).unwrap();
        assert_eq!(link.filename, "foo-2.1b1.tar.gz");
    }

    #[test]
    fn test_prerelease_only_fallback() {
        let transport = MemoryTransport::default().page(
            "https://pypi.example.com/simple/edge/",
            &page(&["edge-0.1a1.tar.gz", "edge-0.1a2.tar.gz"]),
        );
        let link = resolver(transport).find_requirement(&req("edge"), false).unwrap();
        assert_eq!(link.filename, "edge-0.1a2.tar.gz");
    }

    #[test]
    fn test_no_match_is_not_found() {
        let transport = MemoryTransport::default().page(
            "https://pypi.example.com/simple/foo/",
            &page(&["foo-1.0.tar.gz"]),
        );
        let resolver = resolver(transport);

        let err = resolver.find_requirement(&req("foo>=3"), false).unwrap_err();
        assert!(matches!(err, Error::NotFoundError(_)));

        // Missing project page behaves the same
        let err = resolver.find_requirement(&req("absent"), false).unwrap_err();
        assert!(matches!(err, Error::NotFoundError(_)));
    }

    #[test]
    fn test_unreachable_index_named_in_not_found() {
        let resolver = SimpleIndexResolver::new(
            Arc::new(MemoryTransport::default()),
            vec![INDEX.to_string(), "https://mirror.example.com/simple".to_string()],
        );

        let err = resolver.find_requirement(&req("foo"), false).unwrap_err();
        assert!(matches!(err, Error::NotFoundError(_)));
        let msg = err.to_string();
        assert!(msg.contains("unreachable sources"));
        assert!(msg.contains("https://pypi.example.com/simple/foo/"));
        assert!(msg.contains("https://mirror.example.com/simple/foo/"));
        assert!(msg.contains("HTTP 404"));
    }

    #[test]
    fn test_in_download_dir_scopes_existing_check() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo-1.0.tar.gz"), b"old").unwrap();

        let transport = MemoryTransport::default().page(
            "https://pypi.example.com/simple/foo/",
            &page(&["foo-1.0.tar.gz", "foo-2.0.tar.gz"]),
        );
        let base = resolver(transport);
        assert_eq!(
            base.find_requirement(&req("foo"), false).unwrap().filename,
            "foo-2.0.tar.gz"
        );

        let scoped = base.in_download_dir(dir.path());
        assert_eq!(
            scoped.find_requirement(&req("foo"), false).unwrap().filename,
            "foo-1.0.tar.gz"
        );
        let child = scoped.with_dependency_links(&[]);
        assert_eq!(
            child.find_requirement(&req("foo"), false).unwrap().filename,
            "foo-1.0.tar.gz"
        );
    }

    #[test]
    fn test_canonical_project_page() {
        let transport = MemoryTransport::default().page(
            "https://pypi.example.com/simple/zope-interface/",
            &page(&["zope.interface-4.0.tar.gz"]),
        );
        let link = resolver(transport)
            .find_requirement(&req("Zope.Interface"), false)
            .unwrap();
        assert_eq!(link.filename, "zope.interface-4.0.tar.gz");
    }

    #[test]
    fn test_find_links_and_dependency_links() {
        let transport = MemoryTransport::default()
            .page(
                "https://links.example.com/",
                r#"<a href="dep-1.0.tar.gz">dep</a>"#,
            );
        let base = SimpleIndexResolver::new(Arc::new(transport), Vec::new());

        assert!(base.find_requirement(&req("dep"), false).is_err());
        assert!(base.find_requirement(&req("direct"), false).is_err());

        let extended = base.with_dependency_links(&[
            "https://links.example.com/".to_string(),
            "https://files.example.com/direct-0.3.zip".to_string(),
        ]);

        let link = extended.find_requirement(&req("dep"), false).unwrap();
        assert_eq!(link.url, "https://links.example.com/dep-1.0.tar.gz");

        let link = extended.find_requirement(&req("direct"), false).unwrap();
        assert_eq!(link.filename, "direct-0.3.zip");
    }

    #[test]
    fn test_direct_url_requirement() {
        let resolver = resolver(MemoryTransport::default());
        let link = resolver
            .find_requirement(&req("pkg @ https://example.com/pkg-1.0.zip"), false)
            .unwrap();
        assert_eq!(link.filename, "pkg-1.0.zip");
    }

    #[test]
    fn test_upgrade_flag_and_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("foo-1.0.tar.gz"), b"old").unwrap();

        let transport = MemoryTransport::default().page(
            "https://pypi.example.com/simple/foo/",
            &page(&["foo-1.0.tar.gz", "foo-2.0.tar.gz"]),
        );
        let resolver = resolver(transport).prefer_existing_in(dir.path().to_path_buf());

        let kept = resolver.find_requirement(&req("foo"), false).unwrap();
        assert_eq!(kept.filename, "foo-1.0.tar.gz");

        let upgraded = resolver.find_requirement(&req("foo"), true).unwrap();
        assert_eq!(upgraded.filename, "foo-2.0.tar.gz");
    }

    #[test]
    fn test_sdist_preferred_over_wheel() {
        let transport = MemoryTransport::default().page(
            "https://pypi.example.com/simple/foo/",
            &page(&["foo-1.0-py3-none-any.whl", "foo-1.0.tar.gz"]),
        );
        let link = resolver(transport).find_requirement(&req("foo"), false).unwrap();
        assert_eq!(link.filename, "foo-1.0.tar.gz");
    }

    #[test]
    fn test_from_config_applies_spec_options() {
        let mut config = ResolverConfig::new("/tmp/dl");
        config.find_links = vec!["https://a.example.com/".to_string()];
        let options = SpecOptions {
            index_url: Some("https://mirror.example.com/simple".to_string()),
            find_links: vec![
                "https://a.example.com/".to_string(),
                "https://b.example.com/".to_string(),
            ],
            ..SpecOptions::default()
        };

        let resolver =
            SimpleIndexResolver::from_config(Arc::new(MemoryTransport::default()), &config, &options);
        assert_eq!(
            resolver.index_urls(),
            &["https://mirror.example.com/simple".to_string()]
        );
        assert_eq!(resolver.find_links.len(), 2);
    }
}
