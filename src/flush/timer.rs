//! Wall-clock flush trigger

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::controller::{FlushController, FlushTrigger};

/// Request a flush every `period` until the controller closes
///
/// The first tick fires one full period after start.
pub(super) async fn run_timer(controller: Arc<FlushController>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = controller.closed() => break,
            _ = ticker.tick() => controller.request_flush(FlushTrigger::Timer),
        }
    }
}
