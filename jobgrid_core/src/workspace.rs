//! Workspace management: the root directory holding job directories.

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::id::JobId;
use crate::job::Job;
use crate::statepoint::StatePoint;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the write-once state point file inside a job directory.
pub const STATEPOINT_FILE: &str = "statepoint";

/// Name of the mutable document file inside a job directory.
pub const DOCUMENT_FILE: &str = "document";

/// Name of the optional persisted cache file inside a workspace root.
pub const CACHE_FILE: &str = ".jobgrid_cache";

/// A directory containing zero or more job directories.
///
/// The core invariant: every job directory's name equals the hash of the
/// state point stored inside it. Directories violating this are corrupted and
/// are never treated as valid jobs.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create the workspace directory if needed and open it.
    pub fn init<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open an existing workspace.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::invalid_workspace(&root, "directory does not exist"));
        }
        Ok(Self { root })
    }

    /// Get the workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the job directory for an id (whether or not it exists).
    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.root.join(id.to_hex())
    }

    /// Whether a job directory for this id is present on disk.
    ///
    /// Presence only; the statepoint is not verified.
    pub fn contains(&self, id: &JobId) -> bool {
        self.job_dir(id).join(STATEPOINT_FILE).is_file()
    }

    /// Create a job from a state point, or open it if it already exists.
    ///
    /// Canonicalizes and hashes the state point, creates the directory if
    /// absent, and writes the statepoint file if absent. Idempotent: calling
    /// twice with identical content is a no-op, and two concurrent creators
    /// converge on the same directory because content determines the name.
    ///
    /// Fails with `CorruptedJob` if the directory already holds a statepoint
    /// file whose recomputed hash does not match the directory name.
    pub fn init_job(&self, state_point: &StatePoint) -> Result<Job> {
        let id = state_point.id()?;
        let dir = self.job_dir(&id);
        let statepoint_path = dir.join(STATEPOINT_FILE);

        if statepoint_path.exists() {
            // Existing directory: verify rather than rewrite.
            let stored = load_verified_statepoint(&dir, &id)?;
            debug!(id = %id, "init_job: job already present");
            return Ok(Job::new(self.clone(), id, stored));
        }

        fs::create_dir_all(&dir)?;

        // Atomic write: a concurrent creator persists identical bytes, so
        // whichever rename lands last changes nothing.
        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(state_point.to_json()?.as_bytes())?;
        temp.flush()?;
        temp.persist(&statepoint_path)
            .map_err(|e| Error::Io { source: e.error })?;

        debug!(id = %id, "init_job: created job directory");
        Ok(Job::new(self.clone(), id, state_point.clone()))
    }

    /// Open an existing job by id.
    ///
    /// Fails with `JobNotFound` if the directory is absent and `CorruptedJob`
    /// if it is present but hash-mismatched.
    pub fn open_job(&self, id: &JobId) -> Result<Job> {
        let dir = self.job_dir(id);
        if !dir.is_dir() {
            return Err(Error::job_not_found(id.to_hex()));
        }
        let state_point = load_verified_statepoint(&dir, id)?;
        Ok(Job::new(self.clone(), *id, state_point))
    }

    /// Ids of all job directories present in the workspace, sorted.
    ///
    /// A plain directory scan: names that parse as ids are returned without
    /// statepoint verification (crawling verifies).
    pub fn job_ids(&self) -> Result<Vec<JobId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = match entry {
                Ok(entry) => entry,
                // Entry vanished mid-scan: a concurrent remove, not an error.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && let Ok(id) = JobId::from_hex(name)
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Ids of jobs whose state point matches a filter, sorted.
    ///
    /// Selection is verified and fault-tolerant like crawling: corrupted
    /// directories never match.
    pub fn find(&self, filter: &Filter) -> Result<Vec<JobId>> {
        let mut ids = Vec::new();
        for entry in crate::crawl::crawl(self) {
            if let crate::crawl::CrawlEntry::Record(record) = entry
                && filter.matches(&record.state_point)
            {
                ids.push(record.job_id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Load the statepoint file from a job directory and verify that its hash
/// matches the expected id (the directory name).
pub(crate) fn load_verified_statepoint(dir: &Path, expected: &JobId) -> Result<StatePoint> {
    let statepoint_path = dir.join(STATEPOINT_FILE);
    let text = match fs::read_to_string(&statepoint_path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::job_not_found(expected.to_hex()));
        }
        Err(e) => return Err(e.into()),
    };

    let state_point = StatePoint::from_json(&text)
        .map_err(|e| Error::corrupted_job(dir, expected.to_hex(), format!("<unparseable: {}>", e)))?;

    let computed = state_point.id()?;
    if computed != *expected {
        return Err(Error::corrupted_job(
            dir,
            expected.to_hex(),
            computed.to_hex(),
        ));
    }

    Ok(state_point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sp(value: serde_json::Value) -> StatePoint {
        StatePoint::from_value(value).unwrap()
    }

    #[test]
    fn test_open_missing_workspace() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Workspace::open(temp_dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_init_job_creates_directory_and_statepoint() {
        let temp_dir = TempDir::new().unwrap();
        let ws = Workspace::init(temp_dir.path().join("ws")).unwrap();

        let job = ws.init_job(&sp(json!({"T": 300}))).unwrap();
        let dir = ws.job_dir(job.id());
        assert!(dir.is_dir());

        let stored = fs::read_to_string(dir.join(STATEPOINT_FILE)).unwrap();
        assert_eq!(stored, r#"{"T":300}"#);
        assert_eq!(dir.file_name().unwrap().to_str().unwrap(), job.id().to_hex());
    }

    #[test]
    fn test_init_job_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let ws = Workspace::init(temp_dir.path()).unwrap();

        let point = sp(json!({"a": 1, "b": [1, 2]}));
        let job1 = ws.init_job(&point).unwrap();

        // Put something in the document, then re-init with identical content.
        let mut doc = crate::document::Document::new();
        doc.set("status", json!("running")).unwrap();
        job1.write_document(&doc).unwrap();

        let job2 = ws.init_job(&point).unwrap();
        assert_eq!(job1.id(), job2.id());
        assert_eq!(job2.read_document().unwrap(), doc);
    }

    #[test]
    fn test_open_job_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let ws = Workspace::init(temp_dir.path()).unwrap();

        let id = sp(json!({"x": 1})).id().unwrap();
        let result = ws.open_job(&id);
        assert!(matches!(result, Err(Error::JobNotFound { .. })));
    }

    #[test]
    fn test_open_job_corrupted() {
        let temp_dir = TempDir::new().unwrap();
        let ws = Workspace::init(temp_dir.path()).unwrap();

        let job = ws.init_job(&sp(json!({"x": 1}))).unwrap();
        let id = *job.id();

        // Tamper with the statepoint so it no longer hashes to the dir name.
        fs::write(ws.job_dir(&id).join(STATEPOINT_FILE), r#"{"x":2}"#).unwrap();

        let result = ws.open_job(&id);
        assert!(matches!(result, Err(Error::CorruptedJob { .. })));
    }

    #[test]
    fn test_init_job_detects_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let ws = Workspace::init(temp_dir.path()).unwrap();

        let point = sp(json!({"x": 1}));
        let job = ws.init_job(&point).unwrap();
        fs::write(ws.job_dir(job.id()).join(STATEPOINT_FILE), "not json").unwrap();

        let result = ws.init_job(&point);
        assert!(matches!(result, Err(Error::CorruptedJob { .. })));
    }

    #[test]
    fn test_job_ids_scan() {
        let temp_dir = TempDir::new().unwrap();
        let ws = Workspace::init(temp_dir.path()).unwrap();

        let a = ws.init_job(&sp(json!({"n": 1}))).unwrap();
        let b = ws.init_job(&sp(json!({"n": 2}))).unwrap();

        // Noise: a stray file and a dir that is not an id.
        fs::write(temp_dir.path().join("notes.txt"), "hi").unwrap();
        fs::create_dir(temp_dir.path().join("scratch")).unwrap();

        let mut expected = vec![*a.id(), *b.id()];
        expected.sort();
        assert_eq!(ws.job_ids().unwrap(), expected);
    }
}
