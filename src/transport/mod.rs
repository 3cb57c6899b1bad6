//! Event transport - JSON-lines consume loop
//!
//! Reads one JSON-encoded [`UserEvent`] per line from a blocking reader
//! (stdin or a file) and publishes it into an [`EventSource`].
//!
//! - a line that cannot be decoded is logged and skipped
//! - a read failure is fatal: it is published as a stream error and the
//!   loop stops
//! - end of input or cancellation completes the stream

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::source::EventSource;
use crate::types::UserEvent;

/// Errors raised while consuming messages
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to read from input: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Message payload is null")]
    NullPayload,
}

impl TransportError {
    /// Fatal errors end the stream; the rest only skip one message
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Io(e) => e.kind() != io::ErrorKind::InvalidData,
            TransportError::Decode(_) | TransportError::NullPayload => false,
        }
    }
}

/// Counters reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Events published to the source
    pub delivered: u64,
    /// Messages skipped after a non-fatal error
    pub skipped: u64,
}

/// Decode one message payload
pub fn decode_event(payload: &str) -> Result<UserEvent, TransportError> {
    let event: Option<UserEvent> = serde_json::from_str(payload)?;
    event.ok_or(TransportError::NullPayload)
}

/// Open the input: a file if `path` is given, stdin otherwise
pub fn open_input(path: Option<&Path>) -> io::Result<Box<dyn BufRead + Send>> {
    match path {
        Some(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

/// Blocking pull loop over newline-delimited JSON events
pub struct JsonLinesTransport<R> {
    reader: R,
    cancel: CancellationToken,
}

impl<R: BufRead> JsonLinesTransport<R> {
    /// Create a transport that runs until end of input
    pub fn new(reader: R) -> Self {
        Self::with_cancellation(reader, CancellationToken::new())
    }

    /// Create a transport that also stops when `cancel` fires
    ///
    /// Cancellation is checked between messages; a read that is already
    /// blocked finishes first.
    pub fn with_cancellation(reader: R, cancel: CancellationToken) -> Self {
        Self { reader, cancel }
    }

    /// Consume messages until end of input, cancellation or a fatal error
    pub fn run(&mut self, source: &EventSource) -> Result<TransportStats, TransportError> {
        let mut stats = TransportStats::default();
        let mut line = String::new();
        let mut line_number: u64 = 0;

        loop {
            if self.cancel.is_cancelled() {
                info!("Event transport cancelled");
                break;
            }

            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => line_number += 1,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    line_number += 1;
                    let err = TransportError::from(e);
                    if err.is_fatal() {
                        error!(error = %err, "Fatal error");
                        source.publish_error(&err);
                        return Err(err);
                    }
                    warn!(line = line_number, error = %err, "Error while consuming message");
                    stats.skipped += 1;
                    continue;
                }
            }

            let payload = line.trim();
            if payload.is_empty() {
                continue;
            }

            match decode_event(payload) {
                Ok(event) => {
                    source.publish_event(event);
                    stats.delivered += 1;
                }
                Err(e) => {
                    warn!(line = line_number, error = %e, "Error while consuming message");
                    stats.skipped += 1;
                }
            }
        }

        info!(
            delivered = stats.delivered,
            skipped = stats.skipped,
            "Event transport finished"
        );
        source.complete();
        Ok(stats)
    }
}
