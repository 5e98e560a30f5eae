use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use revu_runs::{
    diff::build_file_patch,
    replay::ReplayBackend,
    review::ReviewRun,
    run_session,
    settings::Settings,
    ParsedPatch, ReviewScope, ReviewSession, SessionCommand, SessionSnapshot,
};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};

#[derive(Parser, Debug)]
#[command(name = "revu-runs")]
#[command(about = "Scope unified diffs and reconcile AI review runs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the files and hunks of a patch with their change counts
    Files {
        /// Path to a unified diff
        patch: PathBuf,
    },

    /// Print the part of a patch covered by a file or hunk scope
    Scope {
        /// Path to a unified diff
        patch: PathBuf,

        /// Restrict to this file
        #[arg(short, long)]
        file: Option<String>,

        /// Restrict to this 1-based hunk of --file
        #[arg(long, requires = "file")]
        hunk: Option<usize>,
    },

    /// Build a patch from two revisions of a file
    Compare {
        old: PathBuf,
        new: PathBuf,

        /// Path to record in the patch headers (defaults to NEW)
        #[arg(short, long)]
        path: Option<String>,
    },

    /// List recently compared paths, newest first
    Recent,

    /// Replay recorded progress events against persisted runs
    Replay {
        /// JSON-lines file of progress events
        events: PathBuf,

        /// JSON array of persisted runs
        #[arg(short, long)]
        persisted: Option<PathBuf>,

        /// Review thread to follow (defaults to the configured thread)
        #[arg(short, long)]
        thread: Option<String>,

        /// Diff to start an optimistic review run for
        #[arg(short, long)]
        diff: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut settings = Settings::load().unwrap_or_default();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Files { patch } => list_files(&patch),
        Command::Scope { patch, file, hunk } => print_scope(&patch, file, hunk),
        Command::Compare { old, new, path } => compare(&mut settings, &old, &new, path),
        Command::Recent => {
            for reference in &settings.recent_refs {
                println!("{reference}");
            }
            Ok(())
        }
        Command::Replay {
            events,
            persisted,
            thread,
            diff,
        } => replay(&settings, &events, persisted.as_deref(), thread, diff.as_deref()).await,
    }
}

fn read_patch(path: &Path) -> Result<ParsedPatch> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read patch {}", path.display()))?;
    Ok(ParsedPatch::parse(&text))
}

fn list_files(path: &Path) -> Result<()> {
    let patch = read_patch(path)?;
    if patch.files().is_empty() {
        eprintln!("No file sections found in {}", path.display());
        return Ok(());
    }

    for file in patch.files() {
        let stats = file.stats();
        let name = if file.file_path.is_empty() {
            "(unknown path)"
        } else {
            file.file_path.as_str()
        };
        println!("{name}  +{} -{}", stats.insertions, stats.deletions);
        for hunk in &file.hunks {
            println!(
                "  hunk {}  +{} -{}  {}",
                hunk.hunk_index,
                hunk.insertions(),
                hunk.deletions(),
                hunk.header
            );
        }
    }
    Ok(())
}

fn print_scope(path: &Path, file: Option<String>, hunk: Option<usize>) -> Result<()> {
    let patch = read_patch(path)?;
    let requested = match (file, hunk) {
        (Some(file), Some(hunk)) => ReviewScope::hunk(file, hunk),
        (Some(file), None) => ReviewScope::file(file),
        _ => ReviewScope::Full,
    };

    let scope = patch.resolve_scope(&requested).unwrap_or_else(|| {
        eprintln!(
            "Warning: {} is not part of this diff, using the full diff",
            revu_runs::review_scope_label(&requested)
        );
        ReviewScope::Full
    });

    let Some(scoped) = patch.scoped_diff(&scope) else {
        eprintln!("Nothing to review: the diff is empty");
        return Ok(());
    };

    println!(
        "# {} ({} files, +{} -{})",
        revu_runs::review_scope_label(&scope),
        scoped.stats.files_changed,
        scoped.stats.insertions,
        scoped.stats.deletions
    );
    println!("{}", scoped.diff);
    Ok(())
}

fn compare(settings: &mut Settings, old: &Path, new: &Path, path: Option<String>) -> Result<()> {
    let read = |p: &Path| -> Result<String> {
        if p.exists() {
            fs::read_to_string(p).with_context(|| format!("Failed to read {}", p.display()))
        } else {
            // A missing side is an added or deleted file.
            Ok(String::new())
        }
    };
    let old_text = read(old)?;
    let new_text = read(new)?;
    let label = path.unwrap_or_else(|| new.display().to_string());

    match build_file_patch(&label, &old_text, &new_text) {
        Some(patch) => print!("{patch}"),
        None => eprintln!("No differences"),
    }

    if let Err(e) = settings.record_ref(&label) {
        tracing::warn!(error = %e, "failed to save recent compare path");
    }
    Ok(())
}

async fn replay(
    settings: &Settings,
    events: &Path,
    persisted: Option<&Path>,
    thread: Option<String>,
    diff: Option<&Path>,
) -> Result<()> {
    let backend =
        ReplayBackend::from_files(events, persisted).context("Failed to load replay fixtures")?;

    let thread_id = thread
        .or_else(|| settings.thread_id.clone())
        .unwrap_or_else(|| "default".to_string());
    let session = ReviewSession::new(Some(thread_id)).with_model(settings.default_model.clone());

    let (command_tx, command_rx) = mpsc::channel(8);
    let (update_tx, _update_rx) = watch::channel(SessionSnapshot::default());

    if let Some(diff) = diff {
        let text = fs::read_to_string(diff)
            .with_context(|| format!("Failed to read diff {}", diff.display()))?;
        command_tx.send(SessionCommand::SetDiff(text)).await?;
        command_tx.send(SessionCommand::StartReview).await?;
    }
    // Closing the channel stops the session once the recorded events are drained.
    drop(command_tx);

    let session = run_session(
        session,
        &backend,
        command_rx,
        update_tx,
        settings.poll_interval(),
    )
    .await;

    for run in session.runs() {
        print_run(run);
    }
    Ok(())
}

fn print_run(run: &ReviewRun) {
    println!(
        "{}  {}  {}  chunks={} findings={} events={}",
        run.id,
        run.status,
        run.scope_label,
        run.chunks.len(),
        run.findings.len(),
        run.progress_events.len()
    );
    if let Some(error) = &run.error {
        println!("  error: {error}");
    }
    if let Some(review) = run.review.as_deref().filter(|r| !r.is_empty()) {
        println!("  review: {review}");
    }
}
