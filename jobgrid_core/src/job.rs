//! Job directories: document persistence, file area, clone/move/remove.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::id::JobId;
use crate::statepoint::StatePoint;
use crate::workspace::{DOCUMENT_FILE, STATEPOINT_FILE, Workspace};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An open handle to a job: its id, its directory and its state point.
///
/// The state point is immutable for the job's lifetime; changing identifying
/// metadata means creating a new job under the new id and relocating data,
/// never rewriting this directory's identity.
#[derive(Debug, Clone)]
pub struct Job {
    workspace: Workspace,
    id: JobId,
    state_point: StatePoint,
}

impl Job {
    pub(crate) fn new(workspace: Workspace, id: JobId, state_point: StatePoint) -> Self {
        Self {
            workspace,
            id,
            state_point,
        }
    }

    /// The job's content-derived id.
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// The job's immutable state point.
    pub fn state_point(&self) -> &StatePoint {
        &self.state_point
    }

    /// The job's directory.
    pub fn dir(&self) -> PathBuf {
        self.workspace.job_dir(&self.id)
    }

    /// Path of the job's document file.
    pub fn document_path(&self) -> PathBuf {
        self.dir().join(DOCUMENT_FILE)
    }

    /// Read the current document. A missing document file reads as empty.
    pub fn read_document(&self) -> Result<Document> {
        match fs::read_to_string(self.document_path()) {
            Ok(text) => Document::from_json(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the document wholesale.
    ///
    /// The new content is written to a temporary file in the job directory
    /// and renamed into place, so a concurrent or crash-interrupted reader
    /// observes either the fully old or fully new document, never a partial
    /// one. No merge: last writer wins.
    pub fn write_document(&self, document: &Document) -> Result<()> {
        let path = self.document_path();
        let text = document.to_json()?;

        let write = || -> std::io::Result<()> {
            let mut temp = tempfile::NamedTempFile::new_in(self.dir())?;
            temp.write_all(text.as_bytes())?;
            temp.flush()?;
            temp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };

        write().map_err(|e| Error::document_write(&path, e.to_string()))
    }

    /// Sorted relative paths of the job's user files.
    ///
    /// The statepoint and document files are excluded; subdirectories are
    /// walked recursively.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.dir();
        let mut files = Vec::new();
        collect_files(&dir, &dir, &mut files)?;
        files.sort();
        Ok(files)
    }

    /// Remove the job directory tree. Idempotent: a missing directory is Ok.
    ///
    /// The caller owns cache maintenance: purge this id from any cache after
    /// removal.
    pub fn remove(self) -> Result<()> {
        match fs::remove_dir_all(self.dir()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the job directory tree, failing with `JobNotFound` if it is
    /// already gone.
    pub fn try_remove(self) -> Result<()> {
        if !self.dir().is_dir() {
            return Err(Error::job_not_found(self.id.to_hex()));
        }
        self.remove()
    }

    /// Copy the full job directory into another workspace under the same id.
    ///
    /// The copy is staged under a temporary name inside the destination
    /// workspace and renamed into place, so a partially-copied job is never
    /// visible under its id. Fails with `DestinationExists` if the target
    /// workspace already holds this id and `overwrite` was not requested.
    pub fn clone_to(&self, target: &Workspace, overwrite: bool) -> Result<Job> {
        let dest = target.job_dir(&self.id);
        if dest.exists() && !overwrite {
            return Err(Error::destination_exists(dest));
        }

        stage_copy(&self.dir(), target, &dest)?;
        debug!(id = %self.id, dest = %dest.display(), "cloned job");

        Ok(Job::new(target.clone(), self.id, self.state_point.clone()))
    }

    /// Relocate the full job directory into another workspace.
    ///
    /// Uses a plain rename when possible and falls back to copy-then-remove
    /// across filesystems. Fails with `DestinationExists` like `clone_to`.
    pub fn move_to(self, target: &Workspace, overwrite: bool) -> Result<Job> {
        let src = self.dir();
        let dest = target.job_dir(&self.id);
        if dest.exists() {
            if !overwrite {
                return Err(Error::destination_exists(dest));
            }
            fs::remove_dir_all(&dest)?;
        }

        if fs::rename(&src, &dest).is_err() {
            // Cross-device move: copy, then remove the source.
            stage_copy(&src, target, &dest)?;
            fs::remove_dir_all(&src)?;
        }
        debug!(id = %self.id, dest = %dest.display(), "moved job");

        Ok(Job::new(target.clone(), self.id, self.state_point))
    }
}

/// Copy `src` to a staging directory inside the destination workspace, then
/// swap it into place at `dest`.
pub(crate) fn stage_copy(src: &Path, target: &Workspace, dest: &Path) -> Result<()> {
    let staged = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(target.root())?;
    copy_dir_recursive(src, staged.path())?;

    // Keep the staged tree; from here on placement is rename-only.
    let staged = staged.keep();

    if dest.exists() {
        // Swap: move the old directory aside, rename the staged copy in,
        // then drop the old copy.
        let old = tempfile::Builder::new()
            .prefix(".replaced-")
            .tempdir_in(target.root())?
            .keep();
        fs::remove_dir(&old)?;
        fs::rename(dest, &old)?;
        if let Err(e) = fs::rename(&staged, dest) {
            // Restore the original before surfacing the error.
            let _ = fs::rename(&old, dest);
            let _ = fs::remove_dir_all(&staged);
            return Err(e.into());
        }
        fs::remove_dir_all(&old)?;
    } else if let Err(e) = fs::rename(&staged, dest) {
        let _ = fs::remove_dir_all(&staged);
        return Err(e.into());
    }

    Ok(())
}

/// Recursively copy the contents of `src` into `dest` (which must exist).
fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir(&to)?;
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Collect relative paths of user files under `dir`, excluding the two
/// reserved files at the top level.
fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        if dir == root
            && let Some(name) = path.file_name().and_then(|n| n.to_str())
            && (name == STATEPOINT_FILE || name == DOCUMENT_FILE)
        {
            continue;
        }

        if entry.file_type()?.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            out.push(rel);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sp(value: serde_json::Value) -> StatePoint {
        StatePoint::from_value(value).unwrap()
    }

    fn ws(temp: &TempDir, name: &str) -> Workspace {
        Workspace::init(temp.path().join(name)).unwrap()
    }

    #[test]
    fn test_document_roundtrip() {
        let temp = TempDir::new().unwrap();
        let workspace = ws(&temp, "ws");
        let job = workspace.init_job(&sp(json!({"k": 1}))).unwrap();

        // Missing document reads as empty.
        assert!(job.read_document().unwrap().is_empty());

        let mut doc = Document::new();
        doc.set("result.energy", json!(-1.25)).unwrap();
        job.write_document(&doc).unwrap();
        assert_eq!(job.read_document().unwrap(), doc);

        // Full replace, not a merge.
        let mut doc2 = Document::new();
        doc2.set("other", json!(true)).unwrap();
        job.write_document(&doc2).unwrap();
        let read = job.read_document().unwrap();
        assert_eq!(read, doc2);
        assert_eq!(read.get("result.energy"), None);
    }

    #[test]
    fn test_document_write_leaves_no_partial_state() {
        let temp = TempDir::new().unwrap();
        let workspace = ws(&temp, "ws");
        let job = workspace.init_job(&sp(json!({"k": 1}))).unwrap();

        let mut doc = Document::new();
        doc.set("v", json!(1)).unwrap();
        job.write_document(&doc).unwrap();

        // Simulate a crash between temp-write and rename: a stray temp file
        // in the job directory must not affect what readers see.
        fs::write(job.dir().join(".tmpXYZ"), b"{\"v\":999").unwrap();
        assert_eq!(job.read_document().unwrap(), doc);
    }

    #[test]
    fn test_write_document_failure_keeps_old_content() {
        let temp = TempDir::new().unwrap();
        let workspace = ws(&temp, "ws");
        let job = workspace.init_job(&sp(json!({"k": 1}))).unwrap();

        let mut doc = Document::new();
        doc.set("v", json!(1)).unwrap();
        job.write_document(&doc).unwrap();

        // Remove the job directory out from under the writer: the temp-file
        // creation fails and maps to DocumentWrite.
        fs::remove_dir_all(job.dir()).unwrap();
        let mut doc2 = Document::new();
        doc2.set("v", json!(2)).unwrap();
        let result = job.write_document(&doc2);
        assert!(matches!(result, Err(Error::DocumentWrite { .. })));
    }

    #[test]
    fn test_files_listing() {
        let temp = TempDir::new().unwrap();
        let workspace = ws(&temp, "ws");
        let job = workspace.init_job(&sp(json!({"k": 1}))).unwrap();
        job.write_document(&Document::new()).unwrap();

        fs::write(job.dir().join("out.log"), b"log").unwrap();
        fs::create_dir(job.dir().join("data")).unwrap();
        fs::write(job.dir().join("data/frame.bin"), b"bin").unwrap();

        let files = job.files().unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("data/frame.bin"), PathBuf::from("out.log")]
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let workspace = ws(&temp, "ws");
        let job = workspace.init_job(&sp(json!({"k": 1}))).unwrap();
        let again = job.clone();

        job.remove().unwrap();
        // Second removal of a missing directory is Ok.
        again.clone().remove().unwrap();
        // The explicit-error variant reports JobNotFound instead.
        assert!(matches!(again.try_remove(), Err(Error::JobNotFound { .. })));
    }

    #[test]
    fn test_clone_to_preserves_id_and_content() {
        let temp = TempDir::new().unwrap();
        let src_ws = ws(&temp, "src");
        let dst_ws = ws(&temp, "dst");

        let job = src_ws.init_job(&sp(json!({"k": 1}))).unwrap();
        let mut doc = Document::new();
        doc.set("done", json!(true)).unwrap();
        job.write_document(&doc).unwrap();
        fs::write(job.dir().join("data.txt"), b"payload").unwrap();

        let cloned = job.clone_to(&dst_ws, false).unwrap();
        assert_eq!(cloned.id(), job.id());
        assert_eq!(cloned.read_document().unwrap(), doc);
        assert_eq!(fs::read(cloned.dir().join("data.txt")).unwrap(), b"payload");

        // Source untouched, destination verifies.
        assert!(src_ws.open_job(job.id()).is_ok());
        assert!(dst_ws.open_job(job.id()).is_ok());
    }

    #[test]
    fn test_clone_to_destination_exists() {
        let temp = TempDir::new().unwrap();
        let src_ws = ws(&temp, "src");
        let dst_ws = ws(&temp, "dst");

        let point = sp(json!({"k": 1}));
        let job = src_ws.init_job(&point).unwrap();
        dst_ws.init_job(&point).unwrap();

        let result = job.clone_to(&dst_ws, false);
        assert!(matches!(result, Err(Error::DestinationExists { .. })));

        // With overwrite the clone replaces the destination wholesale.
        fs::write(job.dir().join("new.txt"), b"x").unwrap();
        let cloned = job.clone_to(&dst_ws, true).unwrap();
        assert!(cloned.dir().join("new.txt").is_file());
    }

    #[test]
    fn test_move_to_relocates() {
        let temp = TempDir::new().unwrap();
        let src_ws = ws(&temp, "src");
        let dst_ws = ws(&temp, "dst");

        let job = src_ws.init_job(&sp(json!({"k": 1}))).unwrap();
        let id = *job.id();
        fs::write(job.dir().join("data.txt"), b"payload").unwrap();
        let src_dir = job.dir();

        let moved = job.move_to(&dst_ws, false).unwrap();
        assert_eq!(*moved.id(), id);
        assert!(!src_dir.exists());
        assert_eq!(fs::read(moved.dir().join("data.txt")).unwrap(), b"payload");
        assert!(dst_ws.open_job(&id).is_ok());
    }

    #[test]
    fn test_move_to_destination_exists() {
        let temp = TempDir::new().unwrap();
        let src_ws = ws(&temp, "src");
        let dst_ws = ws(&temp, "dst");

        let point = sp(json!({"k": 1}));
        let job = src_ws.init_job(&point).unwrap();
        dst_ws.init_job(&point).unwrap();

        let result = job.clone().move_to(&dst_ws, false);
        assert!(matches!(result, Err(Error::DestinationExists { .. })));
        // Source still present after the refused move.
        assert!(src_ws.open_job(job.id()).is_ok());
    }
}
