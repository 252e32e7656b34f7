//! bulksend CLI entry point.
//!
//! Provides `run` to deliver an imported row file and `status` to check the
//! WhatsApp bridge. Progress events are printed to stdout as JSON lines;
//! logs go to stderr and the rotated log file.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use bulksend::config;
use bulksend::import;
use bulksend::logging;
use bulksend::messaging::control::ControlRequest;
use bulksend::messaging::events::{BroadcastPublisher, ChannelStatus, EventPublisher, ProgressEvent};
use bulksend::messaging::orchestrator::Orchestrator;
use bulksend::whatsapp::client::WhatsAppClient;
use bulksend::whatsapp::events::{spawn_event_listener, WhatsAppEvent};

/// Per-subscriber buffer for progress events.
const EVENT_BUFFER: usize = 1024;

/// bulksend: bulk WhatsApp messaging with pause, resume, and live progress.
#[derive(Parser)]
#[command(name = "bulksend", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Deliver every row of an imported JSON row file.
    ///
    /// Reads control requests from stdin: `pause`, `resume`, `cancel`, or a
    /// JSON control request per line.
    Run {
        /// Path to the JSON row file.
        #[arg(long)]
        rows: PathBuf,
        /// Config file (defaults to `~/.bulksend/config.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the WhatsApp bridge connection status and exit.
    Status {
        /// Config file (defaults to `~/.bulksend/config.toml`).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { rows, config } => handle_run(&rows, config.as_deref()).await,
        Command::Status { config } => handle_status(config.as_deref()).await,
    }
}

/// Run one sending session to completion or cancellation.
async fn handle_run(rows_path: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = config::load_or_default(config_path)?;
    let logs_dir = config::logs_dir(&config)?;
    let _logging_guard = logging::init_production(&logs_dir)?;

    let rows = import::load_rows(rows_path)?;
    info!(rows = rows.len(), path = %rows_path.display(), "rows loaded");

    let client = Arc::new(WhatsAppClient::from_config(&config.bridge));
    client
        .wait_healthy()
        .await
        .with_context(|| format!("WhatsApp bridge at {} is not connected", client.base_url()))?;

    let publisher = Arc::new(BroadcastPublisher::new(EVENT_BUFFER));
    let printer = tokio::spawn(print_events(publisher.subscribe()));
    publisher.publish(ProgressEvent::channel_status(ChannelStatus::Ready));

    let (event_tx, event_rx) = mpsc::channel(32);
    let listener = spawn_event_listener(client.base_url().to_owned(), event_tx);
    let relay = tokio::spawn(relay_channel_status(event_rx, Arc::clone(&publisher)));

    let orchestrator = Arc::new(Orchestrator::new(
        client,
        Arc::clone(&publisher) as Arc<dyn EventPublisher>,
        config.delivery.clone(),
    ));
    orchestrator.start(rows)?;

    let control = tokio::spawn(dispatch_control(spawn_stdin_reader(), Arc::clone(&orchestrator)));

    tokio::select! {
        state = orchestrator.wait_finished() => {
            info!(%state, "session finished");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for interrupt");
            }
            warn!("interrupt received, cancelling session");
            if let Err(e) = orchestrator.cancel() {
                debug!(error = %e, "cancel after interrupt was a no-op");
            }
            let state = orchestrator.wait_finished().await;
            info!(%state, "session finished after interrupt");
        }
    }

    let stats = orchestrator.stats();
    info!(
        total = stats.total,
        sent = stats.sent,
        failed = stats.failed,
        remaining = stats.remaining,
        "final stats"
    );

    // Drop every publisher handle so the printer drains and exits.
    listener.abort();
    relay.abort();
    control.abort();
    let _ = relay.await;
    let _ = control.await;
    drop(orchestrator);
    drop(publisher);
    if let Err(e) = printer.await {
        warn!(error = %e, "event printer task failed");
    }
    Ok(())
}

/// Print the bridge status as JSON.
async fn handle_status(config_path: Option<&Path>) -> anyhow::Result<()> {
    logging::init_cli();
    let config = config::load_or_default(config_path)?;
    let client = WhatsAppClient::from_config(&config.bridge);
    let status = client
        .status()
        .await
        .with_context(|| format!("failed to query bridge at {}", client.base_url()))?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Write every progress event to stdout as one JSON line.
async fn print_events(mut rx: broadcast::Receiver<ProgressEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, event = event.name(), "failed to encode event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event printer lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Republish bridge connection events as channel status updates.
async fn relay_channel_status(
    mut rx: mpsc::Receiver<WhatsAppEvent>,
    publisher: Arc<BroadcastPublisher>,
) {
    while let Some(event) = rx.recv().await {
        if let WhatsAppEvent::Disconnected { reason } = &event {
            warn!(reason = reason.as_deref().unwrap_or("unknown"), "WhatsApp disconnected");
        }
        publisher.publish(ProgressEvent::channel_status(event.channel_status()));
    }
}

/// Read stdin lines on a plain thread so a pending read never blocks
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Apply operator control requests to the orchestrator.
async fn dispatch_control(mut lines: mpsc::Receiver<String>, orchestrator: Arc<Orchestrator>) {
    while let Some(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        let result = ControlRequest::parse_line(&line).and_then(|req| orchestrator.handle(req));
        match result {
            Ok(state) => info!(%state, "control request applied"),
            Err(e) => warn!(error = %e, "control request rejected"),
        }
    }
}
