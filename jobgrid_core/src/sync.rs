//! Workspace synchronization.
//!
//! Reconciles two independently-evolved workspaces. Jobs are partitioned by
//! id into only-in-source, only-in-destination and shared; shared pairs that
//! differ in document content or user files are conflicts, handled by an
//! explicit strategy or a caller-supplied resolver. State points are never
//! rewritten: a job keeps its id through any sync.
//!
//! Atomicity is per job, not whole-sync. Every copy or update is staged and
//! renamed into place, so a failure partway through leaves the destination
//! with some jobs fully updated and others fully untouched, never a job in a
//! half-written state. Cancelling (dropping the work) has the same property.

use crate::crawl::crawl;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::id::JobId;
use crate::job::{Job, stage_copy};
use crate::workspace::Workspace;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Built-in conflict-resolution policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Leave the destination untouched for every conflicting pair.
    Skip,
    /// Source's document and files replace the destination's, wholesale.
    Update,
    /// Abort before any mutation, surfacing the complete conflicting id set.
    Raise,
}

/// A resolver's decision for one conflicting pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Skip,
    Update,
}

/// One conflicting shared job, as presented to a resolver.
#[derive(Debug)]
pub struct Conflict {
    pub id: JobId,
    pub source_document: Document,
    pub destination_document: Document,
}

/// Per-conflict resolution capability.
///
/// Implemented by [`SyncStrategy`] for the built-in policies, by caller
/// types for custom ones, and by [`ResolveFn`] for plain closures.
pub trait ConflictResolver {
    fn resolve(&self, conflict: &Conflict) -> Resolution;
}

/// Adapter turning a function value into a [`ConflictResolver`].
pub struct ResolveFn<F>(pub F);

impl<F> ConflictResolver for ResolveFn<F>
where
    F: Fn(&Conflict) -> Resolution,
{
    fn resolve(&self, conflict: &Conflict) -> Resolution {
        (self.0)(conflict)
    }
}

impl ConflictResolver for SyncStrategy {
    fn resolve(&self, _conflict: &Conflict) -> Resolution {
        match self {
            SyncStrategy::Skip => Resolution::Skip,
            SyncStrategy::Update => Resolution::Update,
            // Raise never reaches per-conflict resolution; sync() aborts first.
            SyncStrategy::Raise => Resolution::Skip,
        }
    }
}

/// Outcome summary of one sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Only-in-source jobs copied into the destination.
    pub copied: Vec<JobId>,
    /// Conflicting jobs whose destination copy was replaced.
    pub updated: Vec<JobId>,
    /// Conflicting jobs left untouched.
    pub skipped: Vec<JobId>,
    /// Shared jobs with identical content (no-ops).
    pub unchanged: Vec<JobId>,
    /// Jobs only present in the destination (never touched).
    pub only_in_destination: Vec<JobId>,
    /// Per-job failures, with reasons.
    pub errored: Vec<(JobId, String)>,
}

impl SyncReport {
    /// Whether the run changed nothing and hit no errors.
    pub fn is_noop(&self) -> bool {
        self.copied.is_empty()
            && self.updated.is_empty()
            && self.skipped.is_empty()
            && self.errored.is_empty()
    }
}

/// Synchronize `source` into `destination` under a built-in strategy.
///
/// With [`SyncStrategy::Raise`], the complete set of conflicting ids is
/// collected and returned as [`Error::SyncConflict`] before anything is
/// mutated.
pub fn sync(
    source: &Workspace,
    destination: &Workspace,
    strategy: SyncStrategy,
) -> Result<SyncReport> {
    if strategy == SyncStrategy::Raise {
        let plan = Plan::build(source, destination)?;
        if !plan.conflicts.is_empty() {
            let ids = plan.conflicts.iter().map(JobId::to_hex).collect();
            return Err(Error::sync_conflict(ids));
        }
        return plan.execute(destination, &SyncStrategy::Skip);
    }
    sync_with(source, destination, &strategy)
}

/// Synchronize `source` into `destination` with a caller-supplied resolver.
pub fn sync_with(
    source: &Workspace,
    destination: &Workspace,
    resolver: &dyn ConflictResolver,
) -> Result<SyncReport> {
    Plan::build(source, destination)?.execute(destination, resolver)
}

/// The partition of both workspaces' job ids, with conflicts pre-compared.
struct Plan {
    source: Workspace,
    only_in_source: Vec<JobId>,
    only_in_destination: Vec<JobId>,
    unchanged: Vec<JobId>,
    conflicts: Vec<JobId>,
    errored: Vec<(JobId, String)>,
}

impl Plan {
    /// Index both sides and partition by id; compare shared pairs.
    fn build(source: &Workspace, destination: &Workspace) -> Result<Self> {
        let source_ids: BTreeSet<JobId> =
            crawl(source).filter_map(|e| e.record_id()).collect();
        let destination_ids: BTreeSet<JobId> =
            crawl(destination).filter_map(|e| e.record_id()).collect();

        let mut plan = Plan {
            source: source.clone(),
            only_in_source: source_ids.difference(&destination_ids).copied().collect(),
            only_in_destination: destination_ids
                .difference(&source_ids)
                .copied()
                .collect(),
            unchanged: Vec::new(),
            conflicts: Vec::new(),
            errored: Vec::new(),
        };

        for id in source_ids.intersection(&destination_ids) {
            match jobs_differ(source, destination, id) {
                Ok(true) => plan.conflicts.push(*id),
                Ok(false) => plan.unchanged.push(*id),
                Err(e) => {
                    warn!(id = %id, error = %e, "sync comparison failed");
                    plan.errored.push((*id, e.to_string()));
                }
            }
        }

        debug!(
            only_in_source = plan.only_in_source.len(),
            conflicts = plan.conflicts.len(),
            unchanged = plan.unchanged.len(),
            "sync plan built"
        );
        Ok(plan)
    }

    /// Apply the plan: copy missing jobs, resolve conflicts one job at a time.
    fn execute(self, destination: &Workspace, resolver: &dyn ConflictResolver) -> Result<SyncReport> {
        let Plan {
            source,
            only_in_source,
            only_in_destination,
            unchanged,
            conflicts,
            errored,
        } = self;
        let mut report = SyncReport {
            unchanged,
            only_in_destination,
            errored,
            ..SyncReport::default()
        };

        for id in only_in_source {
            match source
                .open_job(&id)
                .and_then(|job| job.clone_to(destination, false))
            {
                Ok(_) => {
                    info!(id = %id, "sync copied job");
                    report.copied.push(id);
                }
                Err(e) => report.errored.push((id, e.to_string())),
            }
        }

        for id in conflicts {
            match resolve_conflict(&source, destination, resolver, &id) {
                Ok(Resolution::Update) => {
                    info!(id = %id, "sync updated job");
                    report.updated.push(id);
                }
                Ok(Resolution::Skip) => report.skipped.push(id),
                Err(e) => report.errored.push((id, e.to_string())),
            }
        }

        Ok(report)
    }
}

/// Ask the resolver about one conflict and apply its decision.
fn resolve_conflict(
    source: &Workspace,
    destination: &Workspace,
    resolver: &dyn ConflictResolver,
    id: &JobId,
) -> Result<Resolution> {
    let source_job = source.open_job(id)?;
    let destination_job = destination.open_job(id)?;

    let conflict = Conflict {
        id: *id,
        source_document: source_job.read_document()?,
        destination_document: destination_job.read_document()?,
    };

    let decision = resolver.resolve(&conflict);
    if decision == Resolution::Update {
        // Full overwrite of the destination job, staged and renamed:
        // the destination never holds a half-written job.
        stage_copy(
            &source_job.dir(),
            destination,
            &destination.job_dir(id),
        )?;
    }
    Ok(decision)
}

/// Whether a shared job pair differs in document content or user files.
fn jobs_differ(source: &Workspace, destination: &Workspace, id: &JobId) -> Result<bool> {
    let source_job = source.open_job(id)?;
    let destination_job = destination.open_job(id)?;

    if source_job.read_document()? != destination_job.read_document()? {
        return Ok(true);
    }
    Ok(file_digests(&source_job)? != file_digests(&destination_job)?)
}

/// Relative path → content digest for a job's user files.
fn file_digests(job: &Job) -> Result<Vec<(PathBuf, JobId)>> {
    let dir = job.dir();
    job.files()?
        .into_iter()
        .map(|rel| {
            let digest = JobId::hash_file(&dir.join(&rel))?;
            Ok((rel, digest))
        })
        .collect()
}
