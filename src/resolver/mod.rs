// src/resolver/mod.rs

//! Recursive requirement resolution and download
//!
//! A `ResolutionSession` walks a `RequirementSet` and everything its
//! artifacts declare, one requirement at a time. Each requirement is
//! resolved to a link, fetched, and inspected; nested requirements become a
//! child set that is walked before the parent's next sibling, so results
//! come out in pre-order.
//!
//! If an artifact's declared requirements cannot be parsed, the artifact is
//! still emitted and the parse failure is recorded against its requirement;
//! none of its dependencies are followed.
//!
//! The traversal uses an explicit stack of frames rather than recursion.
//! The seen-set and error log live on the session and are shared by every
//! frame of a run.

use crate::config::{FailurePolicy, ResolverConfig};
use crate::error::{Error, Result};
use crate::packages::{ArchiveInspector, PackageInspector};
use crate::repository::{
    Downloaded, Downloader, IndexResolver, RepositoryClient, SimpleIndexResolver, Transport,
};
use crate::requirement::parser::{requirement_set_from_file, synthetic_requirement_set};
use crate::requirement::{
    DownloadError, Requirement, RequirementSet, RequirementsFileParser, SpecOptions, SpecParser,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Reason recorded for editable requirements
pub const EDITABLE_UNSUPPORTED: &str = "editable requirements not supported";

/// Drives requirement sets through resolve, fetch, and inspect
pub struct ResolutionSession {
    config: ResolverConfig,
    resolver: Arc<dyn IndexResolver>,
    downloader: Downloader,
    inspector: Arc<dyn PackageInspector>,
    parser: Arc<dyn SpecParser>,
    seen: HashSet<String>,
    errors: Vec<DownloadError>,
}

/// Builder for sessions with non-default collaborators
pub struct SessionBuilder {
    config: ResolverConfig,
    transport: Option<Arc<dyn Transport>>,
    resolver: Option<Arc<dyn IndexResolver>>,
    inspector: Option<Arc<dyn PackageInspector>>,
    parser: Option<Arc<dyn SpecParser>>,
    options: SpecOptions,
}

impl SessionBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Index resolver for top-level requirements; defaults to a
    /// `SimpleIndexResolver` over the configured index URLs
    pub fn resolver(mut self, resolver: Arc<dyn IndexResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn inspector(mut self, inspector: Arc<dyn PackageInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn SpecParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Index directives from the spec source, applied to the default resolver
    pub fn spec_options(mut self, options: SpecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<ResolutionSession> {
        self.config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(RepositoryClient::new(&self.config)?),
        };
        let resolver = self.resolver.unwrap_or_else(|| {
            Arc::new(SimpleIndexResolver::from_config(
                transport.clone(),
                &self.config,
                &self.options,
            ))
        });
        let inspector = self
            .inspector
            .unwrap_or_else(|| Arc::new(ArchiveInspector));
        let parser = self
            .parser
            .unwrap_or_else(|| Arc::new(RequirementsFileParser::new()));

        Ok(ResolutionSession {
            downloader: Downloader::new(transport, inspector.clone()),
            config: self.config,
            resolver,
            inspector,
            parser,
            seen: HashSet::new(),
            errors: Vec::new(),
        })
    }
}

/// What happened to one requirement
enum Outcome {
    /// Nothing to emit; an error may have been recorded
    Skipped,
    Fetched {
        downloaded: Downloaded,
        children: Option<(RequirementSet, Arc<dyn IndexResolver>)>,
    },
}

impl ResolutionSession {
    /// Session with default collaborators for `config`
    pub fn new(config: ResolverConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ResolverConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            transport: None,
            resolver: None,
            inspector: None,
            parser: None,
            options: SpecOptions::default(),
        }
    }

    /// Parse `spec_path` and build a session honoring its index directives
    ///
    /// Returns the session and the top-level set, bound to the configured
    /// download directory.
    pub fn from_spec_file(
        spec_path: &Path,
        config: ResolverConfig,
    ) -> Result<(Self, RequirementSet)> {
        let parser = RequirementsFileParser::new();
        let (set, options) = requirement_set_from_file(&parser, spec_path, &config.download_dir)?;
        let session = Self::builder(config).spec_options(options).build()?;
        Ok((session, set))
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Failures recorded so far, in the order they happened
    pub fn errors(&self) -> &[DownloadError] {
        &self.errors
    }

    pub fn error_for(&self, req: &Requirement) -> Option<&DownloadError> {
        let key = req.key();
        self.errors.iter().find(|e| e.requirement.key() == key)
    }

    /// Whether `req` has been dispatched in this session
    pub fn is_seen(&self, req: &Requirement) -> bool {
        self.seen.contains(&req.key())
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Lazily resolve and download `set` and its transitive dependencies
    ///
    /// Requirements already seen by this session are skipped, so calling
    /// this twice with the same set yields nothing the second time.
    pub fn download_all(&mut self, set: &RequirementSet) -> Downloads<'_> {
        let frame = Frame {
            pending: set.requirements().to_vec().into_iter(),
            resolver: self.resolver.in_download_dir(set.download_dir()),
            download_dir: set.download_dir().to_path_buf(),
        };
        Downloads {
            session: self,
            stack: vec![frame],
            finished: false,
        }
    }

    fn record(&mut self, req: &Requirement, reason: String) {
        self.errors.push(DownloadError {
            requirement: req.clone(),
            reason,
        });
    }

    fn contain_or_abort(&mut self, req: &Requirement, err: Error) -> Result<Outcome> {
        match self.config.failure_policy {
            FailurePolicy::Contain => {
                warn!("Skipping {}: {}", req, err);
                self.record(req, err.to_string());
                Ok(Outcome::Skipped)
            }
            FailurePolicy::Abort => {
                error!("Aborting at {}: {}", req, err);
                Err(err)
            }
        }
    }

    /// Resolve, fetch, and inspect one requirement
    fn handle_requirement(
        &mut self,
        req: &Requirement,
        resolver: &Arc<dyn IndexResolver>,
        download_dir: &Path,
    ) -> Result<Outcome> {
        if req.is_editable() {
            warn!("{}: {}", EDITABLE_UNSUPPORTED, req);
            self.record(req, EDITABLE_UNSUPPORTED.to_string());
            return Ok(Outcome::Skipped);
        }

        let link = match resolver.find_requirement(req, self.config.upgrade) {
            Ok(link) => link,
            Err(e) => return self.contain_or_abort(req, e),
        };

        let downloaded = match self.downloader.download(&link, download_dir) {
            Ok(downloaded) => downloaded,
            Err(e) if e.is_fetch_failure() => {
                let msg = format!("Issue with download: {}", e);
                error!("{}: {}", req, msg);
                self.record(req, msg);
                return Ok(Outcome::Skipped);
            }
            Err(e) => return self.contain_or_abort(req, e),
        };

        let deps = match self.inspector.dependency_info(&downloaded.path) {
            Ok(deps) => deps,
            Err(e) => return self.contain_or_abort(req, e),
        };

        if !deps.has_requirements() {
            return Ok(Outcome::Fetched {
                downloaded,
                children: None,
            });
        }

        let child_set = match synthetic_requirement_set(
            self.parser.as_ref(),
            &downloaded.package,
            &deps.requires,
            download_dir,
        ) {
            Ok(set) => set,
            // The artifact itself is fine; only its declared requirements are unusable
            Err(e) => {
                self.contain_or_abort(req, e)?;
                return Ok(Outcome::Fetched {
                    downloaded,
                    children: None,
                });
            }
        };
        let child_resolver = resolver.with_dependency_links(&deps.dependency_links);

        debug!(
            "{} declares {} requirements",
            downloaded.package,
            child_set.len()
        );

        Ok(Outcome::Fetched {
            downloaded,
            children: Some((child_set, child_resolver)),
        })
    }
}

/// One requirement set being walked
struct Frame {
    pending: std::vec::IntoIter<Requirement>,
    resolver: Arc<dyn IndexResolver>,
    download_dir: PathBuf,
}

/// Lazy pre-order stream of downloaded artifacts
///
/// Yields `Err` at most once, for a failure the session's policy does not
/// contain, and then ends.
pub struct Downloads<'a> {
    session: &'a mut ResolutionSession,
    stack: Vec<Frame>,
    finished: bool,
}

impl Downloads<'_> {
    /// Failures recorded so far in this session
    pub fn errors(&self) -> &[DownloadError] {
        self.session.errors()
    }
}

impl Iterator for Downloads<'_> {
    type Item = Result<Downloaded>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let frame = self.stack.last_mut()?;
            let Some(req) = frame.pending.next() else {
                self.stack.pop();
                continue;
            };

            // Marked before dispatch so a second path to the same
            // requirement never fetches it again
            if !self.session.seen.insert(req.key()) {
                debug!("Already seen {}", req);
                continue;
            }

            let resolver = frame.resolver.clone();
            let download_dir = frame.download_dir.clone();

            match self
                .session
                .handle_requirement(&req, &resolver, &download_dir)
            {
                Ok(Outcome::Skipped) => continue,
                Ok(Outcome::Fetched {
                    downloaded,
                    children,
                }) => {
                    info!("Fetched {} -> {}", downloaded.package, downloaded.path.display());
                    if let Some((set, resolver)) = children {
                        self.stack.push(Frame {
                            pending: set.requirements().to_vec().into_iter(),
                            resolver,
                            download_dir: set.download_dir().to_path_buf(),
                        });
                    }
                    return Some(Ok(downloaded));
                }
                Err(e) => {
                    self.finished = true;
                    self.stack.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl std::iter::FusedIterator for Downloads<'_> {}

/// Resolve and download everything `spec_path` requires
///
/// Returns the artifacts fetched and the per-requirement failures. A
/// failure the configured policy does not contain is returned as `Err`.
pub fn download_all_from_file(
    spec_path: &Path,
    config: ResolverConfig,
) -> Result<(Vec<Downloaded>, Vec<DownloadError>)> {
    let (mut session, set) = ResolutionSession::from_spec_file(spec_path, config)?;
    info!(
        "Resolving {} requirements into {}",
        set.len(),
        set.download_dir().display()
    );
    let downloaded = session.download_all(&set).collect::<Result<Vec<_>>>()?;
    info!(
        "Downloaded {} artifacts, {} failures",
        downloaded.len(),
        session.errors().len()
    );
    Ok((downloaded, session.errors().to_vec()))
}
