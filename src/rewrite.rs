//! Rewriting image references in pages.
//!
//! This is the stage that ties everything together:
//!
//! ```text
//! scan → parse → resolve → materialize / create_icons → splice
//! ```
//!
//! For every candidate value the scanner finds, the value is parsed into
//! references, each reference is resolved to a source file and published
//! under its content-addressed name, and the reference text is replaced by
//! the published path.
//!
//! ## Substitution order
//!
//! References inside one value are replaced from the highest offset down,
//! so each replacement leaves the byte offsets of the references before it
//! untouched.
//!
//! ## Parallel Processing
//!
//! Pages are rewritten in parallel, and so are the candidate values within a
//! page, using [rayon](https://docs.rs/rayon). A page's new values are all
//! computed before any is written back, so a page whose rewrite fails is left
//! exactly as it was.
//!
//! ## Failures
//!
//! A reference that cannot be resolved, an invalid crop rectangle, and any
//! codec or storage failure fail the page. [`Rewriter::rewrite_pages`] is the
//! one place that decides what a failed page means for the run, based on
//! [`FailurePolicy`].

use crate::cache::CacheStats;
use crate::config::{FailurePolicy, RewriteConfig};
use crate::imaging::{
    ArtifactStatus, ImageCodec, TransformError, TransformParams, create_icons, materialize,
};
use crate::markup::Page;
use crate::reference::{ParseError, ParseMode, ParsedReference, parse, parse_each};
use crate::resolve::resolve;
use crate::scan::{Route, scan_elements};
use crate::storage::{Storage, StorageError};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Unresolvable image reference \"{base_name}\" in {location}")]
    UnresolvableReference { base_name: String, location: String },
    #[error("Invalid crop rectangle \"{raw}\" in {location}")]
    InvalidCropRectangle { raw: String, location: String },
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RewriteError {
    fn from_parse(error: ParseError, location: &str) -> Self {
        match error {
            ParseError::InvalidCropRectangle(raw) => RewriteError::InvalidCropRectangle {
                raw,
                location: location.to_string(),
            },
        }
    }
}

/// A rewrite failure attributed to the page it happened on.
#[derive(Error, Debug)]
#[error("Page {page}: {source}")]
pub struct PageError {
    pub page: String,
    pub source: RewriteError,
}

/// Everything the rewriter needs to know about where files live.
#[derive(Debug, Clone)]
pub struct RewriteSettings {
    pub search_root: PathBuf,
    pub images_dir: PathBuf,
    pub icons_dir: PathBuf,
    pub images_prefix: String,
    pub icons_prefix: String,
    pub icon_sizes: Vec<u32>,
    pub on_error: FailurePolicy,
}

impl RewriteSettings {
    pub fn from_config(config: &RewriteConfig) -> Self {
        Self {
            search_root: config.source_root(),
            images_dir: config.images_dir(),
            icons_dir: config.icons_dir(),
            images_prefix: config.images_prefix(),
            icons_prefix: config.icons_prefix(),
            icon_sizes: config.icons.sizes.clone(),
            on_error: config.processing.on_error,
        }
    }
}

/// One reference replaced inside a value.
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenReference {
    pub location: String,
    /// Reference text as written, e.g. `hero?w=800`.
    pub reference: String,
    /// Replacement text, e.g. `images/hero.1x2y3z.800w.jpg`.
    pub output: String,
    pub status: ArtifactStatus,
}

/// Result of rewriting one value.
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenValue {
    pub value: String,
    /// In left-to-right order.
    pub references: Vec<RewrittenReference>,
    pub stats: CacheStats,
}

/// Result of rewriting one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOutcome {
    pub values: usize,
    pub references: Vec<RewrittenReference>,
    pub stats: CacheStats,
}

/// Progress events sent while pages are rewritten.
#[derive(Debug, Clone)]
pub enum RewriteEvent {
    /// A page finished and its new values were written back.
    PageRewritten {
        page: String,
        references: Vec<RewrittenReference>,
    },
    /// A page failed under [`FailurePolicy::SkipPage`] and was left as is.
    PageSkipped { page: String, error: String },
}

/// Totals for a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewriteSummary {
    pub pages: usize,
    pub pages_skipped: usize,
    pub values: usize,
    pub references: usize,
    pub cache: CacheStats,
}

/// A problem found by [`Rewriter::check_pages`].
#[derive(Debug)]
pub struct CheckProblem {
    pub page: String,
    pub error: RewriteError,
}

/// Result of a check run.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub pages: usize,
    pub references: usize,
    pub problems: Vec<CheckProblem>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Rewrites image references using an injected codec and storage.
pub struct Rewriter<'a, C, S: ?Sized> {
    codec: &'a C,
    storage: &'a S,
    settings: RewriteSettings,
}

impl<'a, C: ImageCodec, S: Storage + ?Sized> Rewriter<'a, C, S> {
    pub fn new(codec: &'a C, storage: &'a S, settings: RewriteSettings) -> Self {
        Self {
            codec,
            storage,
            settings,
        }
    }

    /// Rewrite every page, deciding per failed page whether to stop.
    ///
    /// Under [`FailurePolicy::Abort`] no new page is started once one has
    /// failed, and that page's error is returned. Pages that already
    /// succeeded stay updated in place and keep their written artifacts.
    pub fn rewrite_pages(
        &self,
        pages: &mut [Page],
        events: Option<&Sender<RewriteEvent>>,
    ) -> Result<RewriteSummary, PageError> {
        let rewrite_one = |page: &mut Page| {
            let result = self.rewrite_page(page);
            if let (Ok(outcome), Some(tx)) = (&result, events) {
                tx.send(RewriteEvent::PageRewritten {
                    page: page.path.clone(),
                    references: outcome.references.clone(),
                })
                .ok();
            }
            (page.path.clone(), result)
        };

        let results: Vec<(String, Result<PageOutcome, RewriteError>)> = match self.settings.on_error
        {
            FailurePolicy::Abort => pages
                .par_iter_mut()
                .map(|page| match rewrite_one(page) {
                    (page, Ok(outcome)) => Ok((page, Ok(outcome))),
                    (page, Err(source)) => Err(PageError { page, source }),
                })
                .collect::<Result<Vec<_>, PageError>>()?,
            FailurePolicy::SkipPage => pages.par_iter_mut().map(rewrite_one).collect(),
        };

        let mut summary = RewriteSummary::default();
        for (page, result) in results {
            match result {
                Ok(outcome) => {
                    summary.pages += 1;
                    summary.values += outcome.values;
                    summary.references += outcome.references.len();
                    summary.cache.merge(outcome.stats);
                }
                // only reachable under SkipPage
                Err(source) => {
                    tracing::debug!(page = %page, error = %source, "Skipping page");
                    if let Some(tx) = events {
                        tx.send(RewriteEvent::PageSkipped {
                            page,
                            error: source.to_string(),
                        })
                        .ok();
                    }
                    summary.pages_skipped += 1;
                }
            }
        }

        tracing::info!(
            pages = summary.pages,
            skipped = summary.pages_skipped,
            references = summary.references,
            cache = %summary.cache,
            "Rewrite complete"
        );
        Ok(summary)
    }

    /// Rewrite one page in place.
    ///
    /// Either every candidate value is replaced or none is.
    pub fn rewrite_page(&self, page: &mut Page) -> Result<PageOutcome, RewriteError> {
        let mut candidates = scan_elements(&mut page.roots);
        let rewritten: Vec<RewrittenValue> = candidates
            .par_iter()
            .map(|c| self.rewrite_value(c.value.as_str(), c.mode, c.route, &c.location))
            .collect::<Result<Vec<_>, RewriteError>>()?;

        let mut outcome = PageOutcome::default();
        for (candidate, new) in candidates.iter_mut().zip(rewritten) {
            if new.references.is_empty() {
                continue;
            }
            *candidate.value = new.value;
            outcome.values += 1;
            outcome.references.extend(new.references);
            outcome.stats.merge(new.stats);
        }
        Ok(outcome)
    }

    /// Rewrite every reference in a single value.
    pub fn rewrite_value(
        &self,
        value: &str,
        mode: ParseMode,
        route: Route,
        location: &str,
    ) -> Result<RewrittenValue, RewriteError> {
        let mut refs = parse(value, mode).map_err(|e| RewriteError::from_parse(e, location))?;
        refs.sort_by(|a, b| b.start.cmp(&a.start));

        let mut working = value.to_string();
        let mut references = Vec::with_capacity(refs.len());
        let mut stats = CacheStats::default();

        for parsed in &refs {
            let source = self.resolve_parsed(parsed, location)?;
            let (output, status) = self.publish(&source, &parsed.params, route, &mut stats)?;
            references.push(RewrittenReference {
                location: location.to_string(),
                reference: value[parsed.start..parsed.end].to_string(),
                output: output.clone(),
                status,
            });
            working.replace_range(parsed.start..parsed.end, &output);
        }

        references.reverse();
        Ok(RewrittenValue {
            value: working,
            references,
            stats,
        })
    }

    /// Parse and resolve every reference without publishing anything.
    ///
    /// Unlike [`rewrite_pages`](Self::rewrite_pages), every problem is
    /// collected instead of stopping at the first.
    pub fn check_pages(&self, pages: &[Page]) -> CheckReport {
        let per_page: Vec<(usize, Vec<CheckProblem>)> = pages
            .par_iter()
            .map(|page| {
                let mut roots = page.roots.clone();
                let mut references = 0;
                let mut problems = Vec::new();
                for candidate in scan_elements(&mut roots) {
                    match self.check_value(candidate.value.as_str(), candidate.mode, &candidate.location) {
                        Ok(count) => references += count,
                        Err(errors) => problems.extend(errors.into_iter().map(|error| {
                            CheckProblem {
                                page: page.path.clone(),
                                error,
                            }
                        })),
                    }
                }
                (references, problems)
            })
            .collect();

        let mut report = CheckReport {
            pages: pages.len(),
            ..CheckReport::default()
        };
        for (references, problems) in per_page {
            report.references += references;
            report.problems.extend(problems);
        }
        report
    }

    fn check_value(
        &self,
        value: &str,
        mode: ParseMode,
        location: &str,
    ) -> Result<usize, Vec<RewriteError>> {
        let mut resolved = 0;
        let mut errors = Vec::new();
        for result in parse_each(value, mode) {
            let outcome = result
                .map_err(|e| RewriteError::from_parse(e, location))
                .and_then(|parsed| self.resolve_parsed(&parsed, location));
            match outcome {
                Ok(_) => resolved += 1,
                Err(error) => errors.push(error),
            }
        }
        if errors.is_empty() {
            Ok(resolved)
        } else {
            Err(errors)
        }
    }

    fn resolve_parsed(&self, parsed: &ParsedReference, location: &str) -> Result<PathBuf, RewriteError> {
        resolve(self.storage, &self.settings.search_root, &parsed.base_name)?.ok_or_else(|| {
            RewriteError::UnresolvableReference {
                base_name: parsed.base_name.clone(),
                location: location.to_string(),
            }
        })
    }

    /// Publish a resolved source and return the replacement text.
    fn publish(
        &self,
        source: &Path,
        params: &TransformParams,
        route: Route,
        stats: &mut CacheStats,
    ) -> Result<(String, ArtifactStatus), RewriteError> {
        match route {
            Route::Image => {
                let artifact = materialize(
                    self.codec,
                    self.storage,
                    source,
                    &self.settings.images_dir,
                    params,
                )?;
                stats.record(artifact.status);
                Ok((
                    format!("{}{}", self.settings.images_prefix, artifact.file_name),
                    artifact.status,
                ))
            }
            Route::Icon { preferred_size } => {
                let set = create_icons(
                    self.codec,
                    self.storage,
                    source,
                    &self.settings.icons_dir,
                    &self.settings.icon_sizes,
                )?;
                for artifact in set.artifacts() {
                    stats.record(artifact.status);
                }
                let chosen = set
                    .select(preferred_size)
                    .ok_or_else(|| TransformError::NoIconSizes(source.to_path_buf()))?;
                Ok((
                    format!("{}{}", self.settings.icons_prefix, chosen.file_name),
                    chosen.status,
                ))
            }
        }
    }
}
