// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print Mirror command-line service.
//
// Entry point. Initialises logging, loads settings, and either runs the
// mirror engine over a spool directory until interrupted or edits and shows
// the stored settings.

mod data_dir;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use printmirror_core::error::{MirrorError, Result};
use printmirror_core::types::EngineState;
use printmirror_core::MirrorSettings;
use printmirror_engine::status::EngineStatus;
use printmirror_engine::{EngineController, SpoolDirProvider};

/// How often a running service logs its counters.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(
    name = "printmirror",
    version,
    about = "Mirror print jobs from source queues to a destination queue"
)]
struct Cli {
    /// Settings file (defaults to the data directory's config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the mirror in the foreground until Ctrl-C.
    Run {
        /// Directory holding one subdirectory per print queue.
        #[arg(long)]
        spool_root: Option<PathBuf>,
        /// Create missing source and destination queue directories.
        #[arg(long)]
        create_queues: bool,
    },
    /// Set the source queues and the destination queue.
    Config {
        /// Source queues, comma separated.
        #[arg(value_delimiter = ',', required = true)]
        sources: Vec<String>,
        /// Destination queue.
        destination: String,
        /// Poll interval in seconds.
        #[arg(long)]
        interval: Option<f64>,
    },
    /// Show the stored settings and whether they are usable.
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(data_dir::config_path);

    let result = match cli.command {
        Command::Run {
            spool_root,
            create_queues,
        } => {
            let root = spool_root.unwrap_or_else(data_dir::spool_root);
            run(config_path, root, create_queues).await
        }
        Command::Config {
            sources,
            destination,
            interval,
        } => configure(config_path, sources, destination, interval),
        Command::Status => show_status(config_path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "printmirror failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: PathBuf, spool_root: PathBuf, create_queues: bool) -> Result<()> {
    let settings = MirrorSettings::load(&config_path)?;
    let config = settings.to_mirror_config()?;

    info!(
        config = %config_path.display(),
        spool_root = %spool_root.display(),
        "Print Mirror starting"
    );

    let provider = Arc::new(SpoolDirProvider::new(spool_root));
    if create_queues {
        for queue in config.sources.iter().chain(std::iter::once(&config.destination)) {
            provider.create_queue(queue).await?;
        }
    }

    let mut controller = EngineController::new(provider);
    controller.start(config).await?;

    let mut ticker = tokio::time::interval(STATUS_LOG_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "could not listen for Ctrl-C, stopping");
                }
                break;
            }
            _ = ticker.tick() => {
                let status = controller.status();
                log_status(&status);
                if status.state == EngineState::Error {
                    break;
                }
            }
        }
    }

    controller.stop().await?;
    let status = controller.status();
    log_status(&status);
    match status.state {
        EngineState::Error => Err(MirrorError::TaskJoin(
            status.last_error.unwrap_or_else(|| "engine failed".into()),
        )),
        _ => Ok(()),
    }
}

fn configure(
    config_path: PathBuf,
    sources: Vec<String>,
    destination: String,
    interval: Option<f64>,
) -> Result<()> {
    let mut settings = MirrorSettings::load(&config_path)?;
    settings.source_printers = sources;
    settings.dest_printer = destination;
    if let Some(interval) = interval {
        settings.interval = interval;
    }

    // Refuse to store settings the service could not start with.
    let config = settings.to_mirror_config()?;
    settings.save(&config_path)?;

    println!("Sources:     {}", config.sources.join(", "));
    println!("Destination: {}", config.destination);
    println!("Interval:    {:?}", config.poll_interval);
    println!("Saved to {}", config_path.display());
    Ok(())
}

fn show_status(config_path: PathBuf) -> Result<()> {
    let settings = MirrorSettings::load(&config_path)?;
    println!("Settings file: {}", config_path.display());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    match settings.to_mirror_config() {
        Ok(_) => println!("Configuration: valid"),
        Err(e) => println!("Configuration: invalid ({e})"),
    }
    Ok(())
}

fn log_status(status: &EngineStatus) {
    info!(
        state = ?status.state,
        cycles = status.totals.cycles,
        relayed = status.totals.relayed,
        skipped = status.totals.skipped,
        failed = status.totals.failed,
        source_errors = status.totals.source_errors,
        fingerprints = status.fingerprints,
        "mirror status"
    );
    if let Some(e) = &status.last_error {
        warn!(error = %e, "last mirror error");
    }
}
