mod cli;
mod error;

use crate::cli::{Cli, Command, ConfigCommand};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use futures::StreamExt;
use std::pin::pin;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tsm_config::{Config, DirectoryKind, Overrides};
use tsm_pipeline::{BatchEvent, Destinations, Outcome, Pipeline, WatchEvent};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_logging(verbose: u8, quiet: u8) {
    let level = match (verbose, quiet) {
        (0, 0) => "info",
        (1, _) => "debug",
        (2.., _) => "trace",
        (_, 1) => "warn",
        _ => "error",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .init();
}

fn open_pipeline(config: &Config) -> Result<Pipeline> {
    let directories = config.directories().or_raise(|| ErrorKind::Config)?;
    tracing::info!(primary = %directories.primary.display(), mirror = %directories.mirror.display(), "Destinations");
    Pipeline::open(
        Destinations::new(directories.primary, directories.mirror),
        config.rules.clone(),
        &config.state_dir,
        VERSION,
    )
    .or_raise(|| ErrorKind::Journal)
}

/// Log one batch event, returning `true` if it is a failure worth a
/// non-zero exit code.
fn report_batch(event: &BatchEvent) -> bool {
    match event {
        BatchEvent::Started => tracing::debug!("Batch started"),
        BatchEvent::Discovered(total) => tracing::info!(total, "Processing batch"),
        BatchEvent::Skipped { input, reason, done, total } => {
            let progress = format!("{done}/{total}");
            tracing::warn!(%input, %reason, %progress, "Skipped");
        },
        BatchEvent::Processed { path, outcome, done, total } => {
            let progress = format!("{done}/{total}");
            if outcome.is_success() || *outcome == Outcome::SkipInvalid {
                tracing::info!(path = %path.display(), %outcome, %progress, "Processed");
            } else {
                tracing::error!(path = %path.display(), %outcome, %progress, "Processing failed");
                return true;
            }
        },
        BatchEvent::Complete => tracing::info!("All files processed"),
    }
    false
}

fn report_watch(event: &WatchEvent) {
    match event {
        WatchEvent::Started { dir } => tracing::info!(dir = %dir.display(), "Watch started, press Ctrl-C to stop"),
        WatchEvent::AlreadyProcessed { path, digest } => {
            tracing::info!(path = %path.display(), %digest, "Skipped, already processed");
        },
        WatchEvent::Invalid { path } => tracing::warn!(path = %path.display(), "Skipped, not a manifest package"),
        WatchEvent::Processed { path, outcome } if outcome.is_success() => {
            tracing::info!(path = %path.display(), %outcome, "Processed");
        },
        WatchEvent::Processed { path, outcome } => tracing::error!(path = %path.display(), %outcome, "Processing failed"),
        WatchEvent::ScanFailed { reason } => tracing::warn!(%reason, "Scan failed"),
        WatchEvent::Stopped => tracing::info!("Watch stopped"),
    }
}

async fn process(config: &Config, files: Vec<String>) -> Result<ExitCode> {
    let pipeline = open_pipeline(config)?;
    let mut events = pin!(tsm_pipeline::batch(pipeline, files));
    let mut failed = false;
    while let Some(event) = events.next().await {
        failed |= report_batch(&event);
    }
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

async fn watch(config: &Config) -> Result<ExitCode> {
    let dir = config.resolve(DirectoryKind::Watch).or_raise(|| ErrorKind::Config)?;
    let pipeline = open_pipeline(config)?;
    let (stop, shutdown) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Stop requested, finishing the current package");
                // The watcher may already be gone.
                let _ = stop.send(true);
            },
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl-C handler unavailable");
                // Keep the sender alive: dropping it would stop the watcher.
                std::future::pending::<()>().await;
                drop(stop);
            },
        }
    });
    let mut events = pin!(tsm_pipeline::watch(pipeline, dir, config.poll_interval(), shutdown));
    while let Some(event) = events.next().await {
        report_watch(&event);
    }
    Ok(ExitCode::SUCCESS)
}

fn show(config: &Config) {
    println!("state_dir     = {}", config.state_dir.display());
    println!("poll_interval = {}s", config.poll_interval().as_secs());
    println!("rules         = {:?}", config.rules);
    for kind in DirectoryKind::ALL {
        let resolved = match config.resolve(kind) {
            Ok(dir) => dir.display().to_string(),
            Err(e) => format!("<{}>", *e),
        };
        println!("{:<13} = {resolved}", format!("{kind}_dir"));
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut overrides = Overrides {
        primary_dir: cli.global.primary,
        mirror_dir: cli.global.mirror,
        state_dir: cli.global.state_dir,
        ..Overrides::default()
    };
    if let Command::Watch { dir, interval } = &cli.command {
        overrides.watch_dir = dir.clone();
        overrides.poll_interval = *interval;
    }
    let config = Config::load(cli.global.config.as_deref(), &overrides).or_raise(|| ErrorKind::Config)?;

    match cli.command {
        Command::Process { files } => process(&config, files).await,
        Command::Watch { .. } => watch(&config).await,
        Command::Config(ConfigCommand::Show) => {
            show(&config);
            Ok(ExitCode::SUCCESS)
        },
        Command::Config(ConfigCommand::Set { kind, dir }) => {
            let kind = DirectoryKind::from(kind);
            let remembered = config.remember(kind, &dir).or_raise(|| ErrorKind::Config)?;
            println!("{kind} directory set to {}", remembered.display());
            Ok(ExitCode::SUCCESS)
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose, cli.global.quiet);
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = ?e, "{}", *e);
            ExitCode::FAILURE
        },
    }
}
