//! Error types for jobgrid_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using jobgrid_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during workspace and job operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A state point could not be canonically encoded.
    #[error("Encoding error: {reason}")]
    Encoding { reason: String },

    /// A job directory's name does not match the hash of its stored state point.
    #[error("Corrupted job at {path}: directory is named {stored} but its state point hashes to {computed}")]
    CorruptedJob {
        path: PathBuf,
        stored: String,
        computed: String,
    },

    /// No job directory exists for the requested id.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// Clone/move target already holds a job with this id.
    #[error("Destination already exists: {path}")]
    DestinationExists { path: PathBuf },

    /// Document replacement failed; the previous document is intact.
    #[error("Document write failed for {path}: {reason}")]
    DocumentWrite { path: PathBuf, reason: String },

    /// Sync aborted with the full set of conflicting job ids.
    #[error("Sync conflict on {} job(s): {}", ids.len(), ids.join(", "))]
    SyncConflict { ids: Vec<String> },

    /// Invalid job id format or encoding.
    #[error("Invalid job id: {reason}")]
    InvalidId { reason: String },

    /// Workspace directory is missing or unusable.
    #[error("Invalid workspace at {path}: {reason}")]
    InvalidWorkspace { path: PathBuf, reason: String },

    /// JSON (de)serialization error.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create an Encoding error.
    pub fn encoding(reason: impl Into<String>) -> Self {
        Error::Encoding {
            reason: reason.into(),
        }
    }

    /// Create a CorruptedJob error.
    pub fn corrupted_job(
        path: impl Into<PathBuf>,
        stored: impl Into<String>,
        computed: impl Into<String>,
    ) -> Self {
        Error::CorruptedJob {
            path: path.into(),
            stored: stored.into(),
            computed: computed.into(),
        }
    }

    /// Create a JobNotFound error.
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Error::JobNotFound { id: id.into() }
    }

    /// Create a DestinationExists error.
    pub fn destination_exists(path: impl Into<PathBuf>) -> Self {
        Error::DestinationExists { path: path.into() }
    }

    /// Create a DocumentWrite error.
    pub fn document_write(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::DocumentWrite {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a SyncConflict error from the full set of conflicting ids.
    pub fn sync_conflict(ids: Vec<String>) -> Self {
        Error::SyncConflict { ids }
    }

    /// Create an InvalidId error.
    pub fn invalid_id(reason: impl Into<String>) -> Self {
        Error::InvalidId {
            reason: reason.into(),
        }
    }

    /// Create an InvalidWorkspace error.
    pub fn invalid_workspace(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidWorkspace {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
