//! # Log Downloader
//!
//! Retrieve onboard flight logs from a vehicle over a lossy telemetry link.
//!
//! This binary runs the download engine against the built-in simulated
//! vehicle: it lists the vehicle's logs, downloads the chosen ones into the
//! output directory and prints a summary.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use log_downloader::config::{Config, LoggingConfig, PartialListingPolicy};
use log_downloader::driver::{self, Command};
use log_downloader::protocol::ChannelLink;
use log_downloader::sim::SimulatedVehicle;
use log_downloader::transfer::rate::format_bytes;
use log_downloader::transfer::{DownloadEvent, ListingOutcome, LogDownloader};

/// Prefix of the rolling log files
const LOG_FILE_PREFIX: &str = "log-downloader.log";

#[derive(Parser, Debug)]
#[command(name = "log-downloader", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to write logs into (overrides the configuration)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Erase the vehicle's logs once every selected log is downloaded
    #[arg(long)]
    erase: bool,

    /// Log ids to download, comma separated (default: all)
    #[arg(long, value_delimiter = ',')]
    ids: Vec<u16>,
}

/// Main entry point for the log downloader
///
/// # Control Flow
///
/// 1. Load configuration and set up logging
/// 2. Start the simulated vehicle and the engine driver
/// 3. Refresh the log list, select, download
/// 4. Optionally erase, then print a summary
///
/// Ctrl+C cancels the operation in flight and exits.
///
/// # Errors
///
/// Returns error if:
/// - Configuration cannot be loaded
/// - Logging cannot be initialized
/// - The driver stops unexpectedly or the operation is interrupted
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(output) = &cli.output {
        config.download.output_dir = output.to_string_lossy().into_owned();
    }

    let _guard = init_tracing(&config.logging)?;
    info!("Log Downloader v{} starting...", env!("CARGO_PKG_VERSION"));

    let vehicle = SimulatedVehicle::from_config(&config.simulator, config.vehicle.firmware);
    info!(
        "Simulated {:?} vehicle with {} log(s), dropping every {} reply",
        config.vehicle.firmware,
        vehicle.logs().len(),
        config.simulator.drop_every
    );

    let (link, requests) = ChannelLink::pair();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let simulator = tokio::spawn(vehicle.serve(requests, event_tx));

    let engine = LogDownloader::with_link(&config, link);
    let mut events = engine.subscribe();
    let (commands, command_rx) = mpsc::unbounded_channel();
    let driver = tokio::spawn(driver::run(engine, event_rx, command_rx));

    commands.send(Command::Refresh)?;
    let mut listed: Vec<u16> = Vec::new();
    let outcome = wait_for_event(&mut events, &commands, |event| match event {
        DownloadEvent::EntryListed { id, .. } => {
            if !listed.contains(&id) {
                listed.push(id);
            }
            None
        }
        DownloadEvent::ListingFinished(outcome) => Some(outcome),
        _ => None,
    })
    .await?;

    let listing_usable = match &outcome {
        ListingOutcome::Complete { count } => {
            info!("Vehicle has {} log(s)", count);
            true
        }
        ListingOutcome::Partial { missing } => {
            warn!("Log list incomplete, missing ids {:?}", missing);
            config.download.partial_listing == PartialListingPolicy::Accept
        }
        ListingOutcome::Empty => {
            info!("Vehicle has no logs");
            false
        }
        ListingOutcome::NoResponse => {
            warn!("Vehicle did not answer the log list request");
            false
        }
    };

    let wanted: Vec<u16> = if cli.ids.is_empty() {
        listed.clone()
    } else {
        for id in cli.ids.iter().filter(|id| !listed.contains(id)) {
            warn!("Log {} is not on the vehicle", id);
        }
        cli.ids.iter().copied().filter(|id| listed.contains(id)).collect()
    };

    if listing_usable && !wanted.is_empty() {
        for &id in &wanted {
            commands.send(Command::Select { id, selected: true })?;
        }
        commands.send(Command::Download(None))?;

        let (downloaded, failed) = wait_for_event(&mut events, &commands, |event| match event {
            DownloadEvent::DownloadFinished { downloaded, failed } => Some((downloaded, failed)),
            _ => None,
        })
        .await?;

        if cli.erase {
            if failed == 0 && downloaded > 0 {
                commands.send(Command::EraseAll)?;
            } else {
                warn!("Not erasing: {} log(s) failed to download", failed);
            }
        }
    }

    commands.send(Command::Shutdown)?;
    let engine = driver.await.context("Driver task failed")?;

    println!("{:>4}  {:>10}  {:<20}  {}", "ID", "SIZE", "DATE", "STATUS");
    for entry in engine.catalog().iter() {
        let date = entry
            .valid_time()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}  {:>10}  {:<20}  {}",
            entry.id,
            format_bytes(f64::from(entry.size_bytes)),
            date,
            entry.status_text
        );
    }

    drop(engine);
    if let Ok(vehicle) = simulator.await {
        debug!("Simulator dropped {} replies", vehicle.dropped());
    }

    Ok(())
}

/// Wait for the first event `pick` accepts, logging progress on the way
///
/// Ctrl+C cancels whatever the engine is doing and fails the wait.
async fn wait_for_event<T>(
    events: &mut broadcast::Receiver<DownloadEvent>,
    commands: &mpsc::UnboundedSender<Command<ChannelLink>>,
    mut pick: impl FnMut(DownloadEvent) -> Option<T>,
) -> Result<T> {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    log_event(&event);
                    if let Some(found) = pick(event) {
                        return Ok(found);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Skipped {} engine events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => bail!("Engine stopped unexpectedly"),
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, canceling...");
                commands.send(Command::Cancel)?;
                commands.send(Command::Shutdown)?;
                bail!("Interrupted");
            }
        }
    }
}

fn log_event(event: &DownloadEvent) {
    match event {
        DownloadEvent::EntryStarted { id, path } => {
            info!("Log {} -> {}", id, path.display());
        }
        DownloadEvent::Progress { id, fraction, avg_rate, .. } => {
            debug!(
                "Log {}: {:.0}% ({}/s)",
                id,
                fraction * 100.0,
                format_bytes(*avg_rate)
            );
        }
        DownloadEvent::EntryFinished { id, status, .. } => info!("Log {}: {}", id, status),
        DownloadEvent::Erased => info!("Vehicle logs erased"),
        _ => {}
    }
}

/// Set up console logging plus an optional daily rolling file
///
/// The returned guard must live until exit so buffered file output is flushed.
fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level: tracing::Level = logging
        .level
        .parse()
        .with_context(|| format!("Invalid log level: {}", logging.level))?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if logging.log_dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    }

    std::fs::create_dir_all(&logging.log_dir)
        .with_context(|| format!("Failed to create log directory {}", logging.log_dir))?;
    let appender = tracing_appender::rolling::daily(&logging.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok(Some(guard))
}
