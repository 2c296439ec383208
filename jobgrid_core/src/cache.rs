//! Performance-only id→state-point index, always disk-verifiable.
//!
//! A cache accelerates lookups over large workspaces but is never a source of
//! truth: every cached answer is reproducible by a disk re-check, and a job
//! directory absent from disk must never be reported as existing. Whoever
//! opens a workspace owns its cache value; there is no implicit singleton.

use crate::error::{Error, Result};
use crate::id::{FORMAT_VERSION, JobId};
use crate::statepoint::StatePoint;
use crate::workspace::{CACHE_FILE, Workspace, load_verified_statepoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};

/// A directory the cache build rejected, with the reason it was rejected.
#[derive(Debug, Clone)]
pub struct RejectedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Derived id→state-point index for one workspace.
#[derive(Debug, Default)]
pub struct Cache {
    entries: BTreeMap<JobId, StatePoint>,
    rejected: Vec<RejectedEntry>,
}

/// Persisted cache format: version and fingerprint gate reuse.
#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    fingerprint: String,
    entries: BTreeMap<JobId, StatePoint>,
}

impl Cache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache by fully scanning the workspace.
    ///
    /// Every subdirectory's statepoint is loaded and hash-verified; valid
    /// entries populate the index, invalid ones are recorded in the rejected
    /// list and never inserted.
    pub fn build(workspace: &Workspace) -> Result<Self> {
        let mut cache = Cache::new();

        for id in workspace.job_ids()? {
            let dir = workspace.job_dir(&id);
            match load_verified_statepoint(&dir, &id) {
                Ok(state_point) => {
                    cache.entries.insert(id, state_point);
                }
                // Removed between scan and load: not a rejection.
                Err(Error::JobNotFound { .. }) => {}
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "cache build rejected entry");
                    cache.rejected.push(RejectedEntry {
                        path: dir,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(
            entries = cache.entries.len(),
            rejected = cache.rejected.len(),
            "cache built"
        );
        Ok(cache)
    }

    /// Look up a state point. A miss is not an error; the caller falls back
    /// to opening the job from disk.
    pub fn lookup(&self, id: &JobId) -> Option<&StatePoint> {
        self.entries.get(id)
    }

    /// Insert an entry incrementally (on job creation), avoiding a rebuild.
    pub fn update(&mut self, id: JobId, state_point: StatePoint) {
        self.entries.insert(id, state_point);
    }

    /// Remove an entry (on job deletion).
    pub fn invalidate(&mut self, id: &JobId) {
        self.entries.remove(id);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over cached (id, state point) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&JobId, &StatePoint)> {
        self.entries.iter()
    }

    /// Directories the last build rejected.
    pub fn rejected(&self) -> &[RejectedEntry] {
        &self.rejected
    }

    /// Persist the cache to the workspace's cache file, atomically.
    ///
    /// The file carries the format version and a workspace fingerprint so a
    /// later load can decide reuse vs. rebuild.
    pub fn save(&self, workspace: &Workspace) -> Result<()> {
        let file = CacheFile {
            version: FORMAT_VERSION,
            fingerprint: fingerprint(workspace)?,
            entries: self.entries.clone(),
        };

        let path = workspace.root().join(CACHE_FILE);
        let mut temp = tempfile::NamedTempFile::new_in(workspace.root())?;
        temp.write_all(serde_json::to_string(&file)?.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|e| Error::Io { source: e.error })?;

        debug!(entries = file.entries.len(), "cache persisted");
        Ok(())
    }

    /// Load a persisted cache if it is still valid for this workspace.
    ///
    /// Returns `None` (rebuild required) when no cache file exists, the
    /// format version differs, or the fingerprint no longer matches the
    /// directory contents. A stale or unparseable cache is never an error.
    pub fn load(workspace: &Workspace) -> Result<Option<Self>> {
        let path = workspace.root().join(CACHE_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: CacheFile = match serde_json::from_str(&text) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unparseable cache file");
                return Ok(None);
            }
        };

        if file.version != FORMAT_VERSION {
            debug!(found = file.version, expected = FORMAT_VERSION, "cache version mismatch");
            return Ok(None);
        }
        if file.fingerprint != fingerprint(workspace)? {
            debug!("cache fingerprint stale");
            return Ok(None);
        }

        Ok(Some(Cache {
            entries: file.entries,
            rejected: Vec::new(),
        }))
    }

    /// Load the persisted cache or build a fresh one and persist it.
    pub fn load_or_build(workspace: &Workspace) -> Result<Self> {
        if let Some(cache) = Cache::load(workspace)? {
            debug!(entries = cache.len(), "reusing persisted cache");
            return Ok(cache);
        }
        let cache = Cache::build(workspace)?;
        cache.save(workspace)?;
        Ok(cache)
    }
}

/// Workspace fingerprint: BLAKE3 over the sorted job directory names.
///
/// Any create/remove of a job directory changes the fingerprint, which is
/// what staleness detection needs; content changes inside a job do not (the
/// statepoint is write-once and documents are not cached).
fn fingerprint(workspace: &Workspace) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    for id in workspace.job_ids()? {
        hasher.update(id.as_bytes());
    }
    Ok(hasher.finalize().to_hex().to_string())
}
