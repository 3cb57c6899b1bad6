//! Flush controller - dual-trigger persistence of aggregated counts

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::timer::run_timer;
use crate::aggregator::StatsAggregator;
use crate::config::FlushOptions;
use crate::source::Subscriber;
use crate::storage::DataStorage;
use crate::transport::TransportError;
use crate::types::{total_count, UserEvent};

/// What asked for a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Batch,
    Timer,
    Manual,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlushTrigger::Batch => "batch",
            FlushTrigger::Timer => "timer",
            FlushTrigger::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Result of one flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing pending
    Skipped,
    /// Counts were saved and subtracted from the aggregator
    Saved { keys: usize, events: i64 },
    /// Storage rejected the batch; counts stay in memory for the next flush
    Failed,
}

#[derive(Debug, Default)]
struct FlushCounters {
    requested: AtomicU64,
    saved: AtomicU64,
    failed: AtomicU64,
}

/// Drives the aggregator from the event stream and persists it on triggers
///
/// Create it with [`FlushController::start`] inside a Tokio runtime and
/// always finish with [`FlushController::shutdown`], which runs the final
/// flush.
pub struct FlushController {
    aggregator: Arc<StatsAggregator>,
    storage: Arc<dyn DataStorage>,
    options: FlushOptions,
    /// Events seen since start
    event_count: AtomicU64,
    /// Single pending flush request; repeated notifications collapse
    flush_requested: Notify,
    /// Held for the whole duration of a flush
    flush_lock: AsyncMutex<()>,
    /// Fires when the stream terminates or shutdown begins
    closed: CancellationToken,
    /// Set while a flush for events that arrived after close is queued
    late_flush_pending: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    counters: FlushCounters,
    runtime: Handle,
    this: Weak<Self>,
}

impl FlushController {
    /// Create the controller and spawn its flush worker and timer
    pub fn start(
        aggregator: Arc<StatsAggregator>,
        storage: Arc<dyn DataStorage>,
        options: FlushOptions,
    ) -> Arc<Self> {
        let controller = Arc::new_cyclic(|this| Self {
            aggregator,
            storage,
            options,
            event_count: AtomicU64::new(0),
            flush_requested: Notify::new(),
            flush_lock: AsyncMutex::new(()),
            closed: CancellationToken::new(),
            late_flush_pending: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            counters: FlushCounters::default(),
            runtime: Handle::current(),
            this: this.clone(),
        });

        let mut tasks = vec![tokio::spawn(Arc::clone(&controller).run_worker())];
        if let Some(period) = controller.options.timer_period {
            tasks.push(tokio::spawn(run_timer(Arc::clone(&controller), period)));
        }
        *controller.tasks.lock() = tasks;

        info!(
            mode = %controller.options.mode,
            batch_size = ?controller.options.batch_size,
            timer_period = ?controller.options.timer_period,
            storage = controller.storage.name(),
            "Flush controller started"
        );
        controller
    }

    /// The aggregator this controller feeds
    pub fn aggregator(&self) -> &Arc<StatsAggregator> {
        &self.aggregator
    }

    /// Count an event and request a flush every `batch_size` events
    ///
    /// Never waits for the flush itself. An event that arrives after the
    /// controller closed is saved by a separate flush, which the next
    /// [`FlushController::shutdown`] waits for.
    pub fn on_event(&self, event: UserEvent) {
        self.aggregator.record_event(&event);
        let seen = self.event_count.fetch_add(1, Ordering::SeqCst) + 1;

        // The final flush may already have taken its snapshot
        if self.is_closed() {
            self.spawn_late_flush();
            return;
        }

        if let Some(batch_size) = self.options.batch_size {
            if batch_size > 0 && seen % batch_size == 0 {
                self.request_flush(FlushTrigger::Batch);
            }
        }
    }

    /// Ask the worker for a flush without waiting for it
    pub fn request_flush(&self, trigger: FlushTrigger) {
        self.counters.requested.fetch_add(1, Ordering::SeqCst);
        debug!(%trigger, "Flush requested");
        self.flush_requested.notify_one();
    }

    /// Flush now, waiting for any flush already in progress
    pub async fn flush(&self) -> FlushOutcome {
        let _guard = self.flush_lock.lock().await;
        self.flush_locked().await
    }

    /// Queue a flush for counts recorded after close
    ///
    /// Events arriving while one is queued ride along with it.
    fn spawn_late_flush(&self) {
        if self.late_flush_pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(controller) = self.this.upgrade() else {
            warn!("Event arrived after the controller was dropped; it will not be saved");
            return;
        };

        warn!("Event arrived after the event stream closed, saving it separately");
        let task = self.runtime.spawn(async move {
            // Cleared before the snapshot so later arrivals queue a new flush
            controller.late_flush_pending.store(false, Ordering::SeqCst);
            let outcome = controller.flush().await;
            info!(?outcome, "Late flush finished");
        });
        self.tasks.lock().push(task);
    }

    /// Flush unless another flush is running, in which case the request is dropped
    async fn try_flush(&self) -> Option<FlushOutcome> {
        match self.flush_lock.try_lock() {
            Ok(_guard) => Some(self.flush_locked().await),
            Err(_) => {
                debug!("Flush already in progress, dropping request");
                None
            }
        }
    }

    /// Snapshot, save, then subtract what was saved. Caller holds `flush_lock`.
    async fn flush_locked(&self) -> FlushOutcome {
        let stats = self.aggregator.snapshot();
        if stats.is_empty() {
            return FlushOutcome::Skipped;
        }

        let keys = stats.len();
        let events = total_count(&stats);

        match self.storage.save_stats(&stats).await {
            Ok(()) => {
                self.aggregator.remove_exact(&stats);
                self.counters.saved.fetch_add(1, Ordering::SeqCst);
                info!(keys, events, "Saved statistics batch");
                FlushOutcome::Saved { keys, events }
            }
            Err(e) => {
                // Counts stay in the aggregator and are re-sent by the next flush
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                error!(error = %e, keys, events, "Error while saving statistics");
                FlushOutcome::Failed
            }
        }
    }

    async fn run_worker(self: Arc<Self>) {
        loop {
            tokio::select! {
                biased;
                _ = self.flush_requested.notified() => {
                    self.try_flush().await;
                }
                _ = self.closed.cancelled() => break,
            }
        }

        let outcome = self.flush().await;
        info!(?outcome, "Final flush finished");
    }

    /// Stop accepting triggers; the worker runs the final flush and exits
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Check if the stream has terminated or shutdown has begun
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Wait until the stream terminates or shutdown begins
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Close and wait for the timer and the worker's final flush
    ///
    /// Later calls only wait for flushes queued by events that arrived
    /// after close.
    pub async fn shutdown(&self) {
        self.close();

        let tasks = mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Flush task failed");
            }
        }
    }

    /// Events seen since start
    pub fn events_seen(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }

    /// Flush requests made by triggers
    pub fn flushes_requested(&self) -> u64 {
        self.counters.requested.load(Ordering::SeqCst)
    }

    /// Flushes whose batch was saved
    pub fn flushes_saved(&self) -> u64 {
        self.counters.saved.load(Ordering::SeqCst)
    }

    /// Flushes whose save failed
    pub fn flushes_failed(&self) -> u64 {
        self.counters.failed.load(Ordering::SeqCst)
    }
}

impl Subscriber for FlushController {
    fn on_event(&self, event: UserEvent) {
        FlushController::on_event(self, event);
    }

    fn on_error(&self, error: &TransportError) {
        error!(error = %error, "Error occurred in the event stream");
        self.close();
    }

    fn on_completed(&self) {
        info!("Event stream completed. Saving pending statistics...");
        self.close();
    }
}
