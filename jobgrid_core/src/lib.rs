//! # Jobgrid Core
//!
//! A content-addressed job store for parameter-sweep workflows.
//!
//! Every job is identified by an immutable state point (key-value metadata)
//! whose canonical encoding hashes to a stable job id; the id names the job's
//! directory inside a workspace. Next to the write-once statepoint file, each
//! job holds a mutable document (replaced atomically on every write) and an
//! arbitrary file area.
//!
//! ## Features
//!
//! - Content-addressed job directories: identical metadata means the same id,
//!   so concurrent creation is commutative
//! - Integrity checking: a directory whose name does not match its stored
//!   state point is corrupted and never treated as a valid job
//! - Filtered job selection by exact state-point match, with dotted keys
//!   for nested metadata
//! - Disk-verifiable caching with a workspace fingerprint
//! - Fault-tolerant crawling that reports corrupted directories instead of
//!   aborting
//! - Schema inference over heterogeneous documents
//! - Workspace synchronization under explicit conflict policies
//!
//! ## Example
//!
//! ```no_run
//! use jobgrid_core::{StatePoint, SyncStrategy, Workspace, crawl, sync};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let workspace = Workspace::init("./workspace")?;
//!
//! // Create (or reopen) a job from its metadata.
//! let point = StatePoint::from_json(r#"{"temperature": 1.5, "seed": 42}"#)?;
//! let job = workspace.init_job(&point)?;
//!
//! // Record results in the job's document.
//! let mut doc = job.read_document()?;
//! doc.set("pressure", serde_json::json!(0.93))?;
//! job.write_document(&doc)?;
//!
//! // Index every valid job; corrupted directories become diagnostics.
//! for entry in crawl(&workspace) {
//!     println!("{:?}", entry);
//! }
//!
//! // Reconcile with another copy of the data.
//! let other = Workspace::open("./workspace-remote")?;
//! let report = sync(&other, &workspace, SyncStrategy::Update)?;
//! println!("copied {} job(s)", report.copied.len());
//! # Ok(())
//! # }
//! ```

mod cache;
mod crawl;
mod document;
mod error;
mod filter;
mod id;
mod job;
mod schema;
mod statepoint;
mod sync;
mod workspace;

pub use cache::{Cache, RejectedEntry};
pub use crawl::{Crawl, CrawlEntry, IndexRecord, MetadataExtractor, SkipReason, SkippedEntry, crawl};
pub use document::Document;
pub use error::{Error, Result};
pub use filter::Filter;
pub use id::{FORMAT_VERSION, ID_SIZE, JobId};
pub use job::Job;
pub use schema::{EXAMPLE_CAP, KeySummary, Schema, SchemaBuilder, ValueKind};
pub use statepoint::StatePoint;
pub use sync::{
    Conflict, ConflictResolver, Resolution, ResolveFn, SyncReport, SyncStrategy, sync, sync_with,
};
pub use workspace::{CACHE_FILE, DOCUMENT_FILE, STATEPOINT_FILE, Workspace};
