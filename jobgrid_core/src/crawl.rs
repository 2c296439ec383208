//! Fault-tolerant workspace crawling.
//!
//! A crawl walks the direct children of a workspace root and yields one
//! outcome per candidate directory: an [`IndexRecord`] for a verified job, or
//! a [`SkippedEntry`] diagnostic for a directory that looks like a job but
//! fails verification. One corrupted directory never aborts indexing of the
//! rest, and skips are values in the sequence, not control flow.
//!
//! Each call to [`crawl`] performs a fresh walk; there is no memoization
//! beyond what the [`Cache`](crate::cache::Cache) provides. The walk is a
//! best-effort snapshot under concurrent mutation: directories removed
//! mid-walk are silently skipped, directories added mid-walk may or may not
//! appear. Cancellation is simply dropping the iterator.

use crate::document::Document;
use crate::id::JobId;
use crate::statepoint::StatePoint;
use crate::workspace::{Workspace, load_verified_statepoint};
use crate::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Snapshot of one verified job produced by crawling. Ephemeral: records are
/// not persisted.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub job_id: JobId,
    pub state_point: StatePoint,
    pub document: Document,
    pub files: Vec<PathBuf>,
    pub path: PathBuf,
}

/// Why a directory was skipped during a crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Directory name is not a parseable job id.
    InvalidName,
    /// No statepoint file (and no extractor produced metadata).
    MissingStatePoint,
    /// Statepoint present but unreadable, unparseable or hash-mismatched.
    Corrupted(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InvalidName => write!(f, "directory name is not a job id"),
            SkipReason::MissingStatePoint => write!(f, "no statepoint file"),
            SkipReason::Corrupted(reason) => write!(f, "{}", reason),
        }
    }
}

/// Diagnostic for a directory the crawl could not index.
#[derive(Debug, Clone)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// One outcome in the crawl sequence.
#[derive(Debug, Clone)]
pub enum CrawlEntry {
    Record(IndexRecord),
    Skipped(SkippedEntry),
}

impl CrawlEntry {
    /// The record's id, if this entry is a verified job.
    pub fn record_id(&self) -> Option<JobId> {
        match self {
            CrawlEntry::Record(record) => Some(record.job_id),
            CrawlEntry::Skipped(_) => None,
        }
    }
}

/// Extension point for foreign (non-native) metadata extraction.
///
/// When a candidate directory has no statepoint file, the crawler asks the
/// extractor for a state point derived from the directory's contents (file
/// naming schemes, foreign config formats, ...). The record's id is then
/// computed from the extracted state point.
pub trait MetadataExtractor {
    fn extract(&self, path: &Path) -> Option<StatePoint>;
}

/// Lazy, restartable crawl over one workspace. Ordering is unspecified.
pub struct Crawl<'a> {
    workspace: &'a Workspace,
    walker: ignore::Walk,
    extractor: Option<&'a dyn MetadataExtractor>,
}

/// Start a crawl over the workspace.
pub fn crawl(workspace: &Workspace) -> Crawl<'_> {
    let walker = ignore::WalkBuilder::new(workspace.root())
        .max_depth(Some(1)) // Jobs are direct children
        .standard_filters(false)
        .hidden(true) // Skip dotfiles (cache file, staging dirs)
        .build();
    Crawl {
        workspace,
        walker,
        extractor: None,
    }
}

impl<'a> Crawl<'a> {
    /// Attach a foreign-metadata extractor for directories without a native
    /// statepoint.
    pub fn with_extractor(mut self, extractor: &'a dyn MetadataExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Convenience: drain the crawl into records and skip diagnostics.
    pub fn collect_split(self) -> (Vec<IndexRecord>, Vec<SkippedEntry>) {
        let mut records = Vec::new();
        let mut skipped = Vec::new();
        for entry in self {
            match entry {
                CrawlEntry::Record(record) => records.push(record),
                CrawlEntry::Skipped(entry) => skipped.push(entry),
            }
        }
        (records, skipped)
    }

    /// Index one candidate directory, or explain why it is skipped.
    /// `None` means silence: not a job candidate, or a benign race.
    fn visit(&self, path: &Path) -> Option<CrawlEntry> {
        let name = path.file_name()?.to_str()?;

        let id = match JobId::from_hex(name) {
            Ok(id) => id,
            Err(_) => {
                // Foreign directory: only interesting if an extractor claims it.
                if let Some(extractor) = self.extractor
                    && let Some(state_point) = extractor.extract(path)
                {
                    return self.foreign_record(path, state_point);
                }
                return Some(CrawlEntry::Skipped(SkippedEntry {
                    path: path.to_path_buf(),
                    reason: SkipReason::InvalidName,
                }));
            }
        };

        match load_verified_statepoint(path, &id) {
            Ok(state_point) => {
                let job = match self.workspace.open_job(&id) {
                    Ok(job) => job,
                    // Removed between verification and open: race, stay silent.
                    Err(_) => return None,
                };
                let snapshot = job.read_document().and_then(|document| {
                    let files = job.files()?;
                    Ok((document, files))
                });
                match snapshot {
                    Ok((document, files)) => Some(CrawlEntry::Record(IndexRecord {
                        job_id: id,
                        state_point,
                        document,
                        files,
                        path: path.to_path_buf(),
                    })),
                    Err(e) => Some(CrawlEntry::Skipped(SkippedEntry {
                        path: path.to_path_buf(),
                        reason: SkipReason::Corrupted(e.to_string()),
                    })),
                }
            }
            Err(Error::JobNotFound { .. }) => {
                if !path.is_dir() {
                    // Removed mid-walk: silently skip.
                    return None;
                }
                Some(CrawlEntry::Skipped(SkippedEntry {
                    path: path.to_path_buf(),
                    reason: SkipReason::MissingStatePoint,
                }))
            }
            Err(e) => Some(CrawlEntry::Skipped(SkippedEntry {
                path: path.to_path_buf(),
                reason: SkipReason::Corrupted(e.to_string()),
            })),
        }
    }

    /// Build a record for a foreign directory via the extractor.
    fn foreign_record(&self, path: &Path, state_point: StatePoint) -> Option<CrawlEntry> {
        let job_id = match state_point.id() {
            Ok(id) => id,
            Err(e) => {
                return Some(CrawlEntry::Skipped(SkippedEntry {
                    path: path.to_path_buf(),
                    reason: SkipReason::Corrupted(format!("extracted metadata: {}", e)),
                }));
            }
        };
        debug!(path = %path.display(), id = %job_id, "indexed foreign directory");
        Some(CrawlEntry::Record(IndexRecord {
            job_id,
            state_point,
            document: Document::new(),
            files: Vec::new(),
            path: path.to_path_buf(),
        }))
    }
}

impl Iterator for Crawl<'_> {
    type Item = CrawlEntry;

    fn next(&mut self) -> Option<CrawlEntry> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    // Walker-level errors (permissions, vanished entries) are
                    // diagnostics, never aborts.
                    warn!(error = %e, "crawl walker error");
                    continue;
                }
            };
            let path = entry.path();

            // Skip the workspace root itself and plain files.
            if path == self.workspace.root() || !path.is_dir() {
                continue;
            }

            if let Some(outcome) = self.visit(path) {
                return Some(outcome);
            }
        }
    }
}
