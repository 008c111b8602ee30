//! deploywatch
//!
//! Follows the event file written by the provisioning playbooks, tracks every
//! VM and teardown resource, and writes a Markdown audit log of the run.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use eyre::{eyre, WrapErr};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use deploywatch_core::{DeploymentManifest, TailMode, EVENT_FILE_ENV};

mod config;
mod run;

use config::Config;
use run::RunPlan;

#[derive(Parser)]
#[command(name = "deploywatch")]
#[command(about = "Deployment state tracker and audit logger", long_about = None)]
struct Cli {
    /// Config file (default: $DEPLOYWATCH_CONFIG, ./deploywatch.toml, ...)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow a live event file and write the audit log
    Watch {
        /// Deployment manifest
        #[arg(long)]
        manifest: PathBuf,
        /// Event file (default: config, then $RUSE_EVENT_FILE)
        #[arg(long)]
        events: Option<PathBuf>,
        /// Directory for the audit log
        #[arg(long)]
        logs_dir: Option<PathBuf>,
        /// Stop after this many playbooks end (0 = only on Ctrl-C)
        #[arg(long)]
        stop_after: Option<usize>,
    },
    /// Process a finished event file
    Replay {
        /// Deployment manifest
        #[arg(long)]
        manifest: PathBuf,
        /// Event file
        #[arg(long)]
        events: PathBuf,
        /// Directory for the audit log
        #[arg(long)]
        logs_dir: Option<PathBuf>,
    },
    /// List the VMs a manifest expands to
    Plan {
        /// Deployment manifest
        #[arg(long)]
        manifest: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(Config::find_default_path);
    let mut config = match &config_path {
        Some(path) => Config::load(path)
            .wrap_err_with(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    init_logging(&config.watch.log_level);
    match &config_path {
        Some(path) => debug!(path = %path.display(), "config loaded"),
        None => warn!("no config file found, using defaults"),
    }

    match cli.command {
        Commands::Plan { manifest } => {
            let manifest_data = load_manifest(&manifest)?;
            run::print_plan(&manifest_data, &run_name(&manifest_data, &manifest));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Watch {
            manifest,
            events,
            logs_dir,
            stop_after,
        } => {
            if let Some(dir) = logs_dir {
                config.watch.logs_dir = dir;
            }
            if let Some(n) = stop_after {
                config.watch.stop_after_playbooks = n;
            }
            let events = events
                .or_else(|| config.watch.resolve_event_file())
                .ok_or_else(|| eyre!("no event file: pass --events or set {EVENT_FILE_ENV}"))?;

            execute(&manifest, events, TailMode::Follow, &config).await
        }
        Commands::Replay {
            manifest,
            events,
            logs_dir,
        } => {
            if let Some(dir) = logs_dir {
                config.watch.logs_dir = dir;
            }
            config.watch.wait_for_file = false;

            execute(&manifest, events, TailMode::Replay, &config).await
        }
    }
}

async fn execute(
    manifest_path: &Path,
    events: PathBuf,
    mode: TailMode,
    config: &Config,
) -> Result<ExitCode> {
    let manifest = load_manifest(manifest_path)?;
    let run_name = run_name(&manifest, manifest_path);

    let plan = RunPlan {
        manifest,
        run_name: run_name.clone(),
        events,
        mode,
    };
    let (outcome, stats) = run::track(plan, &config.watch).await?;
    run::print_outcome(&run_name, &outcome, &stats);

    Ok(if outcome.verdict.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn load_manifest(path: &Path) -> Result<DeploymentManifest> {
    DeploymentManifest::load(path).wrap_err("failed to load deployment manifest")
}

/// Manifest name, falling back to the manifest file stem
fn run_name(manifest: &DeploymentManifest, path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "deploy".to_string());
    manifest.run_name(&stem).to_string()
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
