mod cli;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use warden::config::WardenConfig;
use warden::error::WardenError;
use warden::index::CancelToken;
use warden::memory::types::DEFAULT_NAMESPACE;

use cli::Workspace;

#[derive(Parser)]
#[command(name = "warden", version, about = "Local code intelligence and commit gate")]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to <root>/.warden/config.toml, then ~/.warden/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the project and assemble context for the recently changed files
    Autocontext,
    /// Bring the project index up to date
    Scan,
    /// Search indexed files and symbols
    Search {
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// List files affected by a change to PATH
    Impact {
        path: String,
        /// Traversal depth (clamped to 1..=6)
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Predict bug risk for a file
    PredictBugs { path: String },
    /// Scan a file for security findings
    Security { path: String },
    /// Advisory review of a file
    Review { path: String },
    /// Aggregate risk over files (defaults to the last changed set)
    RiskScore { paths: Vec<String> },
    /// Store a value under KEY
    Remember { key: String, value: String },
    /// Recall memories matching QUERY (most recent when empty)
    Recall {
        #[arg(default_value = "")]
        query: String,
    },
    /// Delete the memory under KEY
    Forget { key: String },
    /// Record a free-text observation
    Learn {
        text: String,
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },
    /// List TODO/FIXME markers
    Todos,
    /// Gate a commit (defaults to the staged files); exits 2 on block
    Gate { files: Vec<String> },
    /// Install the pre-commit hook
    SetupHook {
        /// Replace an existing hook not installed by warden
        #[arg(long)]
        force: bool,
    },
    /// Check the memory store and index snapshot
    Doctor,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            if let Some(hint) = err.downcast_ref::<WardenError>().and_then(hint_for) {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(1)
        }
    }
}

fn hint_for(err: &WardenError) -> Option<&'static str> {
    match err {
        WardenError::NotFound { .. } => {
            Some("the path is outside the project root or matched by index.exclude")
        }
        err if err.is_retryable() => Some("another warden process holds the lock; try again"),
        _ => None,
    }
}

fn run(cli: Cli) -> Result<u8> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    let config = WardenConfig::load(&root, cli.config.as_deref())?;

    // Log to stderr so stdout stays clean for --json output.
    let filter = EnvFilter::try_new(&config.logging.log_level)
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let limit = config.storage.command_timeout();
    let ws = Workspace::new(Some(&root), config, cli.json)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let outcome = runtime.block_on(async move {
        let cancel = CancelToken::new();

        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling");
                interrupt.cancel();
            }
        });

        let worker_cancel = cancel.clone();
        let command = cli.command;
        let task = tokio::task::spawn_blocking(move || dispatch(&ws, command, &worker_cancel));

        match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined.context("command panicked")?,
            Err(_) => {
                cancel.cancel();
                anyhow::bail!("command timed out after {}ms", limit.as_millis())
            }
        }
    });
    // A timed-out worker may still be running; do not wait on it.
    runtime.shutdown_background();
    outcome
}

fn dispatch(ws: &Workspace, command: Command, cancel: &CancelToken) -> Result<u8> {
    match command {
        Command::Autocontext => cli::context::autocontext(ws, cancel)?,
        Command::Scan => cli::index::scan(ws, cancel)?,
        Command::Search { query, limit } => cli::index::search(ws, &query, limit, cancel)?,
        Command::Impact { path, depth } => cli::index::impact(ws, &path, depth, cancel)?,
        Command::Todos => cli::index::todos(ws, cancel)?,
        Command::PredictBugs { path } => cli::risk::predict_bugs(ws, &path, cancel)?,
        Command::Security { path } => cli::risk::security(ws, &path, cancel)?,
        Command::Review { path } => cli::risk::review(ws, &path, cancel)?,
        Command::RiskScore { paths } => cli::risk::risk_score(ws, &paths, cancel)?,
        Command::Remember { key, value } => cli::memory::remember(ws, &key, &value)?,
        Command::Recall { query } => cli::memory::recall(ws, &query)?,
        Command::Forget { key } => cli::memory::forget(ws, &key)?,
        Command::Learn { text, namespace } => cli::memory::learn(ws, &text, &namespace)?,
        Command::Gate { files } => return cli::gate::gate(ws, &files, cancel),
        Command::SetupHook { force } => cli::gate::setup_hook(ws, force)?,
        Command::Doctor => {
            if !cli::doctor::doctor(ws)? {
                return Ok(1);
            }
        }
    }
    Ok(0)
}
