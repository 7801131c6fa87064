//! `checkpoint` - snapshot, diff and restore a working directory from the shell.
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout.

use checkpoint_core::{
    delete_checkpoints, CheckpointError, CheckpointResult, CheckpointTracker, DiffEntry,
    EngineConfig, ShellMutation,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "checkpoint",
    version,
    about = "Shadow-repository checkpoints for a working directory"
)]
struct Cli {
    /// Task the checkpoints belong to
    #[arg(long, global = true, default_value = "default")]
    task: String,

    /// Working directory to checkpoint (defaults to the current directory)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Storage root for shadow repositories (defaults to ~/.checkpoints)
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create (or verify) the shadow repository and print the latest checkpoint
    Init,
    /// Stage the working directory and record a checkpoint
    Snapshot,
    /// List changed files between two checkpoints
    Diff {
        /// Base checkpoint (defaults to the first one)
        #[arg(long)]
        from: Option<String>,
        /// Target checkpoint (defaults to the live working directory)
        #[arg(long)]
        to: Option<String>,
        /// Include before/after file content
        #[arg(long)]
        content: bool,
    },
    /// Restore the working directory to a checkpoint
    Restore { hash: String },
    /// Print a file as it was at a checkpoint
    Show { hash: String, path: String },
    /// Files changed since the latest checkpoint
    Status,
    /// Recent checkpoints, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Run a command between two checkpoints
    Run {
        /// Shell invocation to use instead of `$SHELL -l -c`
        #[arg(long)]
        shell: Option<String>,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Discard this task's checkpoints
    Delete,
}

/// Diff entry without file content.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DiffSummary<'a> {
    relative_path: &'a str,
    status: checkpoint_core::FileStatus,
}

impl<'a> From<&'a DiffEntry> for DiffSummary<'a> {
    fn from(entry: &'a DiffEntry) -> Self {
        Self {
            relative_path: &entry.relative_path,
            status: entry.status,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> CheckpointResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_config(cli: &Cli) -> CheckpointResult<EngineConfig> {
    let mut builder = EngineConfig::builder();
    if let Some(storage) = &cli.storage {
        builder = builder.storage_root(storage);
    }
    match &cli.workspace {
        Some(dir) => builder = builder.working_dir(dir),
        None => {
            if let Ok(cwd) = std::env::current_dir() {
                builder = builder.working_dir(cwd);
            }
        }
    }
    builder.build()
}

async fn run(cli: Cli) -> CheckpointResult<ExitCode> {
    let config = build_config(&cli)?;

    if let Command::Delete = cli.command {
        delete_checkpoints(&cli.task, &config).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(tracker) = CheckpointTracker::create(&cli.task, &config).await? else {
        eprintln!("Checkpoints are disabled");
        return Ok(ExitCode::SUCCESS);
    };

    match cli.command {
        Command::Init => {
            let latest = tracker.history(1).await?;
            if let Some(snapshot) = latest.first() {
                println!("{}", snapshot.hash);
            }
        }
        Command::Snapshot => {
            if !tracker.stage_workspace_changes().await.success {
                log::warn!("Some files could not be staged");
            }
            match tracker.commit().await {
                Some(hash) => println!("{hash}"),
                None => return Ok(ExitCode::FAILURE),
            }
        }
        Command::Diff { from, to, content } => {
            let entries = tracker
                .get_diff_set(from.as_deref(), to.as_deref())
                .await?;
            if content {
                print_json(&entries)?;
            } else {
                let summary: Vec<DiffSummary> = entries.iter().map(DiffSummary::from).collect();
                print_json(&summary)?;
            }
        }
        Command::Restore { hash } => {
            tracker.reset_head(&hash).await?;
            println!("{hash}");
        }
        Command::Show { hash, path } => {
            match tracker.get_file_content_at_commit(&hash, &path).await? {
                Some(content) => print!("{content}"),
                None => {
                    eprintln!("{path} does not exist at {hash}");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Status => print_json(&tracker.status().await?)?,
        Command::History { limit } => print_json(&tracker.history(limit).await?)?,
        Command::Run { shell, command } => {
            let mut mutation = ShellMutation::from_argv(&command)?;
            if let Some(prefix) = shell {
                mutation = mutation.with_shell_prefix(prefix);
            }
            let pair = tracker.run_checkpointed(&mutation).await?;
            let success = pair.outcome.success;
            print_json(&pair)?;
            if !success {
                return Ok(ExitCode::FAILURE);
            }
        }
        // Handled before tracker creation.
        Command::Delete => {}
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e}");
            match e {
                CheckpointError::InvalidHash(_) | CheckpointError::InvalidTaskId(_) => {
                    ExitCode::from(2)
                }
                _ => ExitCode::FAILURE,
            }
        }
    }
}
