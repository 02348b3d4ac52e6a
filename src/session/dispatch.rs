//! Event fan-out to the external collaborator.
//!
//! The session stays decoupled from presentation by emitting
//! [`SessionEvent`]s through a dispatcher; observers register callbacks, and
//! [`ChannelForwarder`] bridges the synchronous dispatch onto an `mpsc`
//! stream for collaborators that live on another thread.

use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::models::{ConnectionState, ErrorKind, SessionEvent};

/// Receiver side of the session's outbound events.
///
/// Every method defaults to a no-op so observers implement only what they
/// care about. Dispatch happens synchronously on the session's thread;
/// anything that must run elsewhere forwards from here.
pub trait SessionObserver: Send {
    fn on_state_changed(&self, _state: ConnectionState) {}
    fn on_data_changed(&self, _value: &[u8]) {}
    fn on_read_completed(&self, _value: &[u8]) {}
    fn on_write_completed(&self, _value: &[u8]) {}
    fn on_operation_failed(&self, _error: &ErrorKind) {}
}

/// Synchronous fan-out to the registered observers, in registration order.
///
/// Holds nothing but the observer list; there is no buffering, so observers
/// that register late only see events emitted after registration.
#[derive(Default)]
pub struct EventDispatcher {
    observers: Vec<Box<dyn SessionObserver>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn emit(&self, event: &SessionEvent) {
        trace!("dispatching {:?}", event);
        for observer in &self.observers {
            match event {
                SessionEvent::StateChanged(state) => observer.on_state_changed(*state),
                SessionEvent::DataChanged(value) => observer.on_data_changed(value),
                SessionEvent::ReadCompleted(value) => observer.on_read_completed(value),
                SessionEvent::WriteCompleted(value) => observer.on_write_completed(value),
                SessionEvent::OperationFailed(error) => observer.on_operation_failed(error),
            }
        }
    }
}

/// Observer that clones every event into an unbounded channel.
pub struct ChannelForwarder {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelForwarder {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { events }
    }

    fn forward(&self, event: SessionEvent) {
        // A dropped receiver means the collaborator is gone; nothing to do.
        let _ = self.events.send(event);
    }
}

impl SessionObserver for ChannelForwarder {
    fn on_state_changed(&self, state: ConnectionState) {
        self.forward(SessionEvent::StateChanged(state));
    }

    fn on_data_changed(&self, value: &[u8]) {
        self.forward(SessionEvent::DataChanged(value.to_vec()));
    }

    fn on_read_completed(&self, value: &[u8]) {
        self.forward(SessionEvent::ReadCompleted(value.to_vec()));
    }

    fn on_write_completed(&self, value: &[u8]) {
        self.forward(SessionEvent::WriteCompleted(value.to_vec()));
    }

    fn on_operation_failed(&self, error: &ErrorKind) {
        self.forward(SessionEvent::OperationFailed(error.clone()));
    }
}
