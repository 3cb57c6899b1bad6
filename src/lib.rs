//! Event Stats
//!
//! Consumes a stream of user interaction events, keeps a running count per
//! (user id, event type) pair in memory and periodically adds those counts
//! to durable storage.
//!
//! # Features
//!
//! - **Lock-sharded counters**: events are counted without blocking flushes
//! - **Dual flush triggers**: every N events, on a timer, or both
//! - **Loss-free flushing**: only persisted amounts are subtracted, and a
//!   failed save keeps the counts for the next attempt
//! - **Two backends**: a JSON file or a PostgreSQL table, both additive
//!
//! # Modules
//!
//! - `types`: Events, aggregate keys and counter records
//! - `aggregator`: Concurrent in-memory counters
//! - `storage`: The `DataStorage` contract and its backends
//! - `flush`: Flush controller and triggers
//! - `source`: Single-subscriber event stream
//! - `transport`: JSON-lines consume loop
//! - `config`: Environment-based configuration
//! - `logging`: Tracing subscriber setup
//! - `utils`: Atomic file writes
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use event_stats::{FlushController, FlushOptions, JsonFileStorage, StatsAggregator, UserEvent};
//! use event_stats::storage::DataStorage;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(JsonFileStorage::new("user_event_stats.json"));
//! storage.initialize().await?;
//!
//! let aggregator = Arc::new(StatsAggregator::new());
//! let controller = FlushController::start(aggregator, storage, FlushOptions::batch(100));
//!
//! controller.on_event(UserEvent::new(42, "click"));
//! controller.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod flush;
pub mod logging;
pub mod source;
pub mod storage;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use aggregator::StatsAggregator;
pub use config::{AppConfig, EventSavingMode, FlushOptions, StorageConfig, StorageType};
pub use flush::{FlushController, FlushOutcome, FlushTrigger};
pub use source::{EventSource, Subscriber};
pub use storage::{open_storage, DataStorage, JsonFileStorage, PostgresStorage, StorageError};
pub use transport::{JsonLinesTransport, TransportError};
pub use types::{AggregateKey, UserEvent, UserEventStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
