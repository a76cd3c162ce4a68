//! switchyard: a headless session multiplexer driven over stdin/stdout.
//!
//! Reads JSON requests from stdin, one per line, and writes JSON events to
//! stdout. Logs go to stderr.

mod host;
mod ipc;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;
use switchyard_mux::{EventBus, Multiplexer};
use switchyard_pty::{PtyBackend, PtyConfig};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::host::Host;

#[derive(Parser, Debug)]
#[command(name = "switchyard", version, about = "Multiplex coding-agent and shell sessions")]
struct Cli {
    /// Working directory for plain shell tabs. Defaults to the home directory.
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Directory for switchyard's state. Defaults to ~/.switchyard.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Settings database. Defaults to <data-dir>/switchyard.db.
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => home_dir()
            .context("HOME is not set; pass --data-dir")?
            .join(".switchyard"),
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let db_path = cli.db.unwrap_or_else(|| data_dir.join("switchyard.db"));
    let conn = switchyard_db::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    switchyard_db::seed_defaults(&conn).context("failed to seed settings")?;
    let launch = switchyard_db::read_launch_settings(&conn).context("failed to read settings")?;
    drop(conn);

    let config = PtyConfig {
        shell: launch.default_shell,
        agent_program: launch.agent_program,
        plan_args: launch.plan_args,
        env: launch.env,
    };
    let working_dir = cli.working_dir.unwrap_or_else(dirs_or_cwd);
    info!(
        "starting switchyard (working dir {}, database {})",
        working_dir.display(),
        db_path.display()
    );

    let bus = Arc::new(EventBus::new());
    let backend = Arc::new(PtyBackend::new(config, bus.clone()));
    let (mux, status_rx) = Multiplexer::new(backend, bus, working_dir);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let writer = host::spawn_writer(tokio::io::stdout(), events_rx);
    let requests = host::start_stdin_reader().context("failed to start stdin reader")?;

    host::run(Host::new(mux, events_tx), requests, status_rx).await;

    // Every event sender is gone once the host is dropped, so the writer
    // drains what is queued and returns.
    writer
        .await
        .context("event writer panicked")?
        .context("failed to write events")?;
    info!("switchyard exited");
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Fall back to the home directory, then the current directory.
fn dirs_or_cwd() -> PathBuf {
    home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
