//! Flush orchestration
//!
//! The [`FlushController`] subscribes to the event stream, feeds the
//! aggregator and decides when counts are written to storage.
//!
//! # Architecture
//!
//! ```text
//! EventSource ──► on_event ──► StatsAggregator.record_event
//!                    │
//!                    └─ every N events ─┐
//!   timer task ── every period ─────────┼──► flush request (single slot)
//!                                       ▼
//!                                  flush worker
//!                      snapshot ─► save_stats ─► remove_exact
//! ```
//!
//! Requests collapse into one pending slot, so a burst of triggers costs a
//! single flush. At most one flush runs at a time. When the stream ends
//! the worker performs a final flush before it exits.

mod controller;
mod timer;

pub use controller::{FlushController, FlushOutcome, FlushTrigger};
