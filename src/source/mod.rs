//! Single-subscriber push stream of user events
//!
//! The transport loop publishes into an [`EventSource`]; exactly one
//! [`Subscriber`] (the flush controller) receives the events. An error or a
//! completion terminates the stream and nothing is delivered afterwards.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::transport::TransportError;
use crate::types::UserEvent;

/// Receiver side of an [`EventSource`]
///
/// `on_error` and `on_completed` are terminal and called at most once,
/// and never both.
pub trait Subscriber: Send + Sync {
    fn on_event(&self, event: UserEvent);

    fn on_error(&self, error: &TransportError);

    fn on_completed(&self);
}

/// Errors returned by [`EventSource::subscribe`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscribeError {
    #[error("Event source already has a subscriber")]
    AlreadySubscribed,
    #[error("Event source has terminated")]
    Terminated,
}

#[derive(Default)]
struct SourceState {
    subscriber: Option<Arc<dyn Subscriber>>,
    terminated: bool,
}

/// Push stream with at most one active subscriber
#[derive(Default)]
pub struct EventSource {
    state: RwLock<SourceState>,
}

impl EventSource {
    /// Create a source with no subscriber
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the single subscriber
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Result<(), SubscribeError> {
        let mut state = self.state.write();
        if state.terminated {
            return Err(SubscribeError::Terminated);
        }
        if state.subscriber.is_some() {
            return Err(SubscribeError::AlreadySubscribed);
        }

        state.subscriber = Some(subscriber);
        Ok(())
    }

    /// Detach the current subscriber, if any
    ///
    /// Waits for a delivery in progress, so no event reaches the old
    /// subscriber once this returns.
    pub fn unsubscribe(&self) {
        self.state.write().subscriber = None;
    }

    /// Check if the stream has terminated
    pub fn is_terminated(&self) -> bool {
        self.state.read().terminated
    }

    /// Deliver an event to the subscriber
    ///
    /// Events published without a subscriber or after termination are dropped.
    /// The state lock stays held for the call, so `on_event` must not call
    /// back into this source.
    pub fn publish_event(&self, event: UserEvent) {
        let state = self.state.read();
        if state.terminated {
            debug!("Dropping event published after stream termination");
            return;
        }

        if let Some(subscriber) = &state.subscriber {
            subscriber.on_event(event);
        }
    }

    /// Terminate the stream with an error
    pub fn publish_error(&self, error: &TransportError) {
        if let Some(subscriber) = self.terminate() {
            subscriber.on_error(error);
        }
    }

    /// Terminate the stream normally
    pub fn complete(&self) {
        if let Some(subscriber) = self.terminate() {
            subscriber.on_completed();
        }
    }

    /// Mark terminated; returns the subscriber only on the first call
    fn terminate(&self) -> Option<Arc<dyn Subscriber>> {
        let mut state = self.state.write();
        if state.terminated {
            debug!("Event stream already terminated");
            return None;
        }

        state.terminated = true;
        state.subscriber.clone()
    }
}
