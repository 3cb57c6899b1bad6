//! Event Generator - synthetic event producer
//!
//! Writes one JSON-encoded user event per line to stdout, ready to be piped
//! into `event-stats-server`.
//!
//! | Variable | Default |
//! |---|---|
//! | `GENERATOR_INTERVAL_MS` | `1000` |
//! | `GENERATOR_MAX_EVENTS` | unlimited |

use std::env;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use tracing::info;

use event_stats::{logging, UserEvent};

const EVENT_TYPES: [&str; 3] = ["click", "hover", "hold"];
const BUTTON_IDS: [&str; 6] = ["submit", "cancel", "save", "delete", "edit", "close"];
const MAX_USER_ID: i64 = 1000;
const FLUSH_EVERY: u64 = 10;

/// Build one random event
fn random_event<R: Rng>(rng: &mut R) -> UserEvent {
    let user_id = rng.gen_range(1..=MAX_USER_ID);
    let event_type = EVENT_TYPES.choose(rng).copied().unwrap_or("click");
    let event = UserEvent::new(user_id, event_type);

    if rng.gen_bool(0.5) {
        let button_id = BUTTON_IDS.choose(rng).copied().unwrap_or("submit");
        event.with_data(json!({ "buttonId": button_id }))
    } else {
        event
    }
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value {:?} for {}", raw, key)),
        _ => Ok(None),
    }
}

fn main() -> Result<()> {
    logging::init();

    let interval = Duration::from_millis(env_u64("GENERATOR_INTERVAL_MS")?.unwrap_or(1000));
    let max_events = env_u64("GENERATOR_MAX_EVENTS")?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("Failed to install Ctrl+C handler")?;
    }

    info!(?interval, ?max_events, "Producing events");

    let mut rng = rand::thread_rng();
    let mut out = BufWriter::new(io::stdout().lock());
    let mut produced: u64 = 0;

    while running.load(Ordering::SeqCst) && max_events.map_or(true, |max| produced < max) {
        let event = random_event(&mut rng);
        serde_json::to_writer(&mut out, &event)?;
        out.write_all(b"\n")?;
        produced += 1;

        if produced % FLUSH_EVERY == 0 {
            out.flush()?;
        }
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }

    out.flush()?;
    info!(produced, "Event generator stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_events_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let event = random_event(&mut rng);
            assert!((1..=MAX_USER_ID).contains(&event.user_id));
            assert!(EVENT_TYPES.contains(&event.event_type.as_str()));
            if let Some(data) = &event.data {
                let button = data["buttonId"].as_str().unwrap();
                assert!(BUTTON_IDS.contains(&button));
            }
        }
    }
}
