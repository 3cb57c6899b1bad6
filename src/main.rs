//! Event Stats - Binary Entry Point
//!
//! Reads JSON-lines events from stdin (or `EVENTS_INPUT`), counts them and
//! flushes the counts to the configured storage until the input ends or
//! Ctrl+C is pressed.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use event_stats::transport::open_input;
use event_stats::{
    logging, open_storage, AppConfig, EventSource, FlushController, JsonLinesTransport,
    StatsAggregator, NAME, VERSION,
};

const TRANSPORT_JOIN_GRACE: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    info!(version = VERSION, "Starting {}", NAME);

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let input = open_input(config.input.as_deref()).context("Failed to open event input")?;

    let storage = open_storage(&config.storage)
        .await
        .context("Failed to open data storage")?;
    storage
        .initialize()
        .await
        .context("Failed to initialize data storage")?;

    let aggregator = Arc::new(StatsAggregator::new());
    let controller = FlushController::start(aggregator, storage, config.flush.clone());
    let source = Arc::new(EventSource::new());
    source.subscribe(controller.clone())?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("Failed to install Ctrl+C handler")?;
    }

    // Blocking reads stay off the runtime
    let transport = {
        let source = Arc::clone(&source);
        let cancel = cancel.clone();
        thread::Builder::new()
            .name("event-transport".to_string())
            .spawn(move || JsonLinesTransport::with_cancellation(input, cancel).run(&source))
            .context("Failed to start event transport")?
    };

    info!("Consuming events");
    tokio::select! {
        _ = cancel.cancelled() => info!("Shutdown signal received"),
        _ = controller.closed() => {}
    }

    // Returns once any delivery in progress has reached the controller
    source.unsubscribe();
    controller.shutdown().await;

    info!(
        events = controller.events_seen(),
        flushes_saved = controller.flushes_saved(),
        flushes_failed = controller.flushes_failed(),
        pending = controller.aggregator().pending_events(),
        "Event stats stopped"
    );

    // A reader blocked on stdin cannot be interrupted; leave it to process exit
    let deadline = tokio::time::Instant::now() + TRANSPORT_JOIN_GRACE;
    while !transport.is_finished() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    if !transport.is_finished() {
        warn!("Event transport still blocked on input, exiting without it");
        return Ok(());
    }

    match transport.join() {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e).context("Event stream failed"),
        Err(_) => {
            error!("Event transport panicked");
            anyhow::bail!("Event transport panicked")
        }
    }
}
