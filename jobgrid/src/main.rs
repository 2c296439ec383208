mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobgrid_core::{
    Cache, CrawlEntry, Document, Error as CoreError, Filter, JobId, Schema, SchemaBuilder,
    StatePoint, SyncStrategy, Workspace, crawl, sync,
};
use output::OutputWriter;
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Jobgrid - a content-addressed job store for parameter sweeps
#[derive(Parser)]
#[command(name = "jobgrid")]
#[command(about = "Content-addressed job store for parameter-sweep workflows", long_about = None)]
#[command(version)]
struct Cli {
    /// Workspace root (defaults to JOBGRID_WORKSPACE env var or ./workspace)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose diagnostics (e.g. stored vs. recomputed hashes)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a job from a state point (idempotent)
    Add {
        /// Path to a state point JSON file, or '-' for stdin
        statepoint: String,
    },

    /// Compute the job id of a state point without creating anything
    Id {
        /// Path to a state point JSON file, or '-' for stdin
        statepoint: String,
    },

    /// Print a job's state point
    Statepoint {
        /// Job id (64 hex characters)
        job_id: String,
    },

    /// Read or modify a job's document
    #[command(subcommand)]
    Document(DocumentCommands),

    /// Remove a job directory
    Rm {
        /// Job id
        job_id: String,
    },

    /// Copy a job into another workspace under the same id
    Clone {
        /// Job id
        job_id: String,

        /// Destination workspace
        dest: PathBuf,

        /// Replace an existing job with this id at the destination
        #[arg(long)]
        overwrite: bool,
    },

    /// Move a job into another workspace under the same id
    Mv {
        /// Job id
        job_id: String,

        /// Destination workspace
        dest: PathBuf,

        /// Replace an existing job with this id at the destination
        #[arg(long)]
        overwrite: bool,
    },

    /// List jobs whose state point matches a filter
    Find {
        /// Filter as JSON (e.g. '{"T": 300}'); omit to list every job
        filter: Option<String>,
    },

    /// Index the workspace, reporting corrupted directories as skips
    Index,

    /// Summarize state point shape across all jobs
    Schema,

    /// Synchronize a source workspace into a destination workspace
    Sync {
        /// Source workspace
        source: PathBuf,

        /// Destination workspace
        dest: PathBuf,

        /// Conflict strategy for shared jobs that differ
        #[arg(long, default_value = "skip")]
        strategy: String,
    },

    /// Manage the persisted workspace cache
    #[command(subcommand)]
    Cache(CacheCommands),
}

#[derive(Subcommand)]
enum DocumentCommands {
    /// Print the document, or one dotted key of it
    Get {
        /// Job id
        job_id: String,

        /// Dotted key (prints the whole document if omitted)
        key: Option<String>,
    },

    /// Set a dotted key to a JSON value
    Set {
        /// Job id
        job_id: String,

        /// Dotted key
        key: String,

        /// JSON value (e.g. '42', '"text"', '{"a":1}')
        value: String,
    },

    /// Remove a dotted key
    Unset {
        /// Job id
        job_id: String,

        /// Dotted key
        key: String,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Rebuild the cache from disk and persist it
    Refresh,

    /// Show cached entries (loads or rebuilds as needed)
    Show,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// One distinct exit status per error class.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    let core = err.chain().find_map(|e| e.downcast_ref::<CoreError>());
    match core {
        Some(CoreError::Encoding { .. }) => 2,
        Some(CoreError::CorruptedJob { .. }) => 3,
        Some(CoreError::JobNotFound { .. }) => 4,
        Some(CoreError::DestinationExists { .. }) => 5,
        Some(CoreError::DocumentWrite { .. }) => 6,
        Some(CoreError::SyncConflict { .. }) => 7,
        _ => 1,
    }
}

fn run(cli: Cli) -> Result<()> {
    // Workspace root: CLI arg > JOBGRID_WORKSPACE env var > ./workspace
    let root = cli
        .workspace
        .or_else(|| std::env::var("JOBGRID_WORKSPACE").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./workspace"));

    let out = OutputWriter::new(cli.json);

    match cli.command {
        Commands::Add { statepoint } => cmd_add(&root, &statepoint),
        Commands::Id { statepoint } => cmd_id(&statepoint),
        Commands::Statepoint { job_id } => cmd_statepoint(&root, &job_id),
        Commands::Document(doc_cmd) => match doc_cmd {
            DocumentCommands::Get { job_id, key } => cmd_document_get(&root, &job_id, key.as_deref()),
            DocumentCommands::Set { job_id, key, value } => {
                cmd_document_set(&root, &job_id, &key, &value)
            }
            DocumentCommands::Unset { job_id, key } => cmd_document_unset(&root, &job_id, &key),
        },
        Commands::Rm { job_id } => cmd_rm(&root, &job_id),
        Commands::Clone {
            job_id,
            dest,
            overwrite,
        } => cmd_clone(&root, &job_id, &dest, overwrite),
        Commands::Mv {
            job_id,
            dest,
            overwrite,
        } => cmd_mv(&root, &job_id, &dest, overwrite),
        Commands::Find { filter } => cmd_find(&root, filter.as_deref(), &out),
        Commands::Index => cmd_index(&root, &out),
        Commands::Schema => cmd_schema(&root, &out),
        Commands::Sync {
            source,
            dest,
            strategy,
        } => cmd_sync(&source, &dest, &strategy, &out),
        Commands::Cache(cache_cmd) => match cache_cmd {
            CacheCommands::Refresh => cmd_cache_refresh(&root),
            CacheCommands::Show => cmd_cache_show(&root, &out),
        },
    }
}

/// Read a state point from a file argument, or stdin for '-'.
fn read_statepoint(arg: &str) -> Result<StatePoint> {
    let text = if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read state point from stdin")?;
        buf
    } else {
        std::fs::read_to_string(arg)
            .with_context(|| format!("Failed to read state point file: {}", arg))?
    };
    StatePoint::from_json(&text).context("Invalid state point")
}

fn open_workspace(root: &Path) -> Result<Workspace> {
    Workspace::open(root).with_context(|| format!("Failed to open workspace at {}", root.display()))
}

fn parse_id(job_id: &str) -> Result<JobId> {
    JobId::from_hex(job_id).with_context(|| format!("Invalid job id: {}", job_id))
}

fn cmd_add(root: &Path, statepoint: &str) -> Result<()> {
    let point = read_statepoint(statepoint)?;
    let workspace = Workspace::init(root)
        .with_context(|| format!("Failed to open workspace at {}", root.display()))?;

    let job = workspace.init_job(&point).context("Failed to create job")?;
    println!("{}", job.id());
    Ok(())
}

fn cmd_id(statepoint: &str) -> Result<()> {
    let point = read_statepoint(statepoint)?;
    println!("{}", point.id()?);
    Ok(())
}

fn cmd_statepoint(root: &Path, job_id: &str) -> Result<()> {
    let workspace = open_workspace(root)?;
    let job = workspace.open_job(&parse_id(job_id)?)?;
    println!("{}", job.state_point().to_json()?);
    Ok(())
}

fn cmd_document_get(root: &Path, job_id: &str, key: Option<&str>) -> Result<()> {
    let workspace = open_workspace(root)?;
    let job = workspace.open_job(&parse_id(job_id)?)?;
    let doc = job.read_document()?;

    match key {
        None => println!("{}", doc.to_json()?),
        Some(key) => match doc.get(key) {
            Some(value) => println!("{}", value),
            None => anyhow::bail!("No such document key: {}", key),
        },
    }
    Ok(())
}

fn cmd_document_set(root: &Path, job_id: &str, key: &str, value: &str) -> Result<()> {
    let workspace = open_workspace(root)?;
    let job = workspace.open_job(&parse_id(job_id)?)?;

    let value: serde_json::Value =
        serde_json::from_str(value).with_context(|| format!("Invalid JSON value: {}", value))?;

    let mut doc = job.read_document()?;
    doc.set(key, value)?;
    job.write_document(&doc)
        .with_context(|| format!("Failed to write document for job {}", job.id()))?;
    Ok(())
}

fn cmd_document_unset(root: &Path, job_id: &str, key: &str) -> Result<()> {
    let workspace = open_workspace(root)?;
    let job = workspace.open_job(&parse_id(job_id)?)?;

    let mut doc = job.read_document()?;
    if doc.remove(key).is_none() {
        anyhow::bail!("No such document key: {}", key);
    }
    job.write_document(&doc)
        .with_context(|| format!("Failed to write document for job {}", job.id()))?;
    Ok(())
}

fn cmd_rm(root: &Path, job_id: &str) -> Result<()> {
    let workspace = open_workspace(root)?;
    let id = parse_id(job_id)?;
    let job = workspace.open_job(&id)?;

    // Snapshot the persisted cache before removal: the removal changes the
    // workspace fingerprint, after which the old cache no longer loads.
    let cache = Cache::load(&workspace)?;
    job.try_remove()?;

    if let Some(mut cache) = cache {
        cache.invalidate(&id);
        cache.save(&workspace)?;
    }

    println!("Removed job {}", id);
    Ok(())
}

fn cmd_clone(root: &Path, job_id: &str, dest: &Path, overwrite: bool) -> Result<()> {
    let workspace = open_workspace(root)?;
    let job = workspace.open_job(&parse_id(job_id)?)?;
    let target = Workspace::init(dest)
        .with_context(|| format!("Failed to open destination workspace at {}", dest.display()))?;

    let cloned = job.clone_to(&target, overwrite)?;
    println!("Cloned {} to {}", cloned.id(), dest.display());
    Ok(())
}

fn cmd_mv(root: &Path, job_id: &str, dest: &Path, overwrite: bool) -> Result<()> {
    let workspace = open_workspace(root)?;
    let job = workspace.open_job(&parse_id(job_id)?)?;
    let target = Workspace::init(dest)
        .with_context(|| format!("Failed to open destination workspace at {}", dest.display()))?;

    let moved = job.move_to(&target, overwrite)?;
    println!("Moved {} to {}", moved.id(), dest.display());
    Ok(())
}

fn cmd_find(root: &Path, filter: Option<&str>, out: &OutputWriter) -> Result<()> {
    let workspace = open_workspace(root)?;
    let filter = match filter {
        Some(text) => {
            Filter::from_json(text).with_context(|| format!("Invalid filter: {}", text))?
        }
        None => Filter::new(),
    };

    let ids = workspace.find(&filter)?;
    out.write(&ids, || {
        ids.iter().map(JobId::to_hex).collect::<Vec<_>>().join("\n")
    })
}

#[derive(Serialize)]
struct IndexReport {
    records: Vec<IndexLine>,
    skipped: Vec<SkipLine>,
}

#[derive(Serialize)]
struct IndexLine {
    job_id: JobId,
    state_point: StatePoint,
    document: Document,
    files: Vec<PathBuf>,
}

#[derive(Serialize)]
struct SkipLine {
    path: PathBuf,
    reason: String,
}

fn cmd_index(root: &Path, out: &OutputWriter) -> Result<()> {
    let workspace = open_workspace(root)?;

    let mut report = IndexReport {
        records: Vec::new(),
        skipped: Vec::new(),
    };
    for entry in crawl(&workspace) {
        match entry {
            CrawlEntry::Record(record) => report.records.push(IndexLine {
                job_id: record.job_id,
                state_point: record.state_point,
                document: record.document,
                files: record.files,
            }),
            CrawlEntry::Skipped(skip) => {
                // Diagnostics go to stderr so stdout stays parseable.
                eprintln!("skipped {}: {}", skip.path.display(), skip.reason);
                report.skipped.push(SkipLine {
                    path: skip.path,
                    reason: skip.reason.to_string(),
                });
            }
        }
    }

    out.write(&report, || {
        let mut lines: Vec<String> = report
            .records
            .iter()
            .map(|r| format!("{} {}", r.job_id, serde_json::Value::Object(r.state_point.as_map().clone())))
            .collect();
        lines.push(format!(
            "{} job(s), {} skipped",
            report.records.len(),
            report.skipped.len()
        ));
        lines.join("\n")
    })
}

fn cmd_schema(root: &Path, out: &OutputWriter) -> Result<()> {
    let workspace = open_workspace(root)?;

    let mut builder = SchemaBuilder::new();
    for entry in crawl(&workspace) {
        if let CrawlEntry::Record(record) = entry {
            builder.add(record.state_point.as_map());
        }
    }
    let schema: Schema = builder.finish();

    out.write(&schema, || schema.to_string())
}

fn cmd_sync(source: &Path, dest: &Path, strategy: &str, out: &OutputWriter) -> Result<()> {
    let strategy = match strategy {
        "skip" => SyncStrategy::Skip,
        "update" => SyncStrategy::Update,
        "raise" => SyncStrategy::Raise,
        other => anyhow::bail!("Unsupported strategy: {} (expected skip, update or raise)", other),
    };

    let source_ws = Workspace::open(source)
        .with_context(|| format!("Failed to open source workspace at {}", source.display()))?;
    let dest_ws = Workspace::open(dest)
        .with_context(|| format!("Failed to open destination workspace at {}", dest.display()))?;

    let report = sync(&source_ws, &dest_ws, strategy)?;

    out.write(&report, || {
        let mut text = format!(
            "copied {}, updated {}, skipped {}, unchanged {}",
            report.copied.len(),
            report.updated.len(),
            report.skipped.len(),
            report.unchanged.len()
        );
        for (id, reason) in &report.errored {
            text.push_str(&format!("\nerror {}: {}", id, reason));
        }
        text
    })
}

fn cmd_cache_refresh(root: &Path) -> Result<()> {
    let workspace = open_workspace(root)?;
    let cache = Cache::build(&workspace).context("Failed to build cache")?;
    cache.save(&workspace).context("Failed to persist cache")?;

    println!(
        "Cached {} job(s), rejected {}",
        cache.len(),
        cache.rejected().len()
    );
    for rejected in cache.rejected() {
        eprintln!("rejected {}: {}", rejected.path.display(), rejected.reason);
    }
    Ok(())
}

fn cmd_cache_show(root: &Path, out: &OutputWriter) -> Result<()> {
    let workspace = open_workspace(root)?;
    let cache = Cache::load_or_build(&workspace)?;

    let entries: Vec<(JobId, StatePoint)> = cache
        .iter()
        .map(|(id, point)| (*id, point.clone()))
        .collect();

    out.write(&entries, || {
        entries
            .iter()
            .map(|(id, point)| {
                format!(
                    "{} {}",
                    id,
                    serde_json::Value::Object(point.as_map().clone())
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}
