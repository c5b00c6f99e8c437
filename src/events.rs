//! Asynchronous event dispatch.
//!
//! Model, state and status changes are enqueued on the runtime's
//! [`EventQueue`] together with a snapshot of the interested listeners.
//! A single dispatcher thread drains the queue in FIFO order, so delivery
//! is serialized and a slow or panicking listener never runs on the thread
//! that caused the change.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};

use crate::provider::Status;

/// Change of a component model feature
#[derive(Debug, Clone)]
pub struct ModelEvent {
    pub path: String,
    pub feature: String,
    pub old_value: String,
    pub new_value: String,
    pub timestamp: DateTime<Utc>,
}

/// Change of a provider's declarative state
#[derive(Debug, Clone)]
pub struct StateEvent {
    pub path: String,
    pub provider: u64,
    pub old_state: String,
    pub new_state: String,
    pub timestamp: DateTime<Utc>,
}

/// Change of a provider's lifecycle status
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub path: String,
    pub provider: u64,
    pub old_status: Status,
    pub new_status: Status,
    pub timestamp: DateTime<Utc>,
}

/// Any runtime event
#[derive(Debug, Clone)]
pub enum Event {
    Model(ModelEvent),
    State(StateEvent),
    Status(StatusEvent),
}

impl Event {
    pub fn path(&self) -> &str {
        match self {
            Event::Model(e) => &e.path,
            Event::State(e) => &e.path,
            Event::Status(e) => &e.path,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Model(e) => e.timestamp,
            Event::State(e) => e.timestamp,
            Event::Status(e) => e.timestamp,
        }
    }
}

/// Receives events on the dispatcher thread
pub trait EventListener: Send + Sync {
    fn notify(&self, event: &Event);
}

impl<F> EventListener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn notify(&self, event: &Event) {
        self(event)
    }
}

/// Ordered listener registry owned by one event source
#[derive(Default)]
pub(crate) struct Listeners {
    entries: Mutex<Vec<Arc<dyn EventListener>>>,
}

impl Listeners {
    pub(crate) fn add(&self, listener: Arc<dyn EventListener>) {
        self.entries.lock().push(listener);
    }

    pub(crate) fn remove(&self, listener: &Arc<dyn EventListener>) {
        self.entries.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn EventListener>> {
        self.entries.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

struct Envelope {
    event: Event,
    listeners: Vec<Arc<dyn EventListener>>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Envelope>,
    in_flight: bool,
    shutdown: bool,
    delivered: u64,
}

struct QueueShared {
    state: Mutex<QueueState>,
    ready: Condvar,
    idle: Condvar,
}

/// FIFO event queue drained by one dispatcher thread
pub struct EventQueue {
    shared: Arc<QueueShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: Option<ThreadId>,
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("EventQueue")
            .field("pending", &state.pending.len())
            .field("delivered", &state.delivered)
            .finish()
    }
}

impl EventQueue {
    /// Starts the dispatcher thread.
    pub fn new() -> Self {
        let shared = Arc::new(QueueShared {
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
            idle: Condvar::new(),
        });
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("metro-event-dispatch".to_string())
            .spawn(move || dispatch(worker_shared));
        let (worker, worker_id) = match worker {
            Ok(handle) => {
                let id = handle.thread().id();
                (Some(handle), Some(id))
            }
            Err(error) => {
                tracing::error!(%error, "unable to start event dispatcher; events will be delivered inline");
                (None, None)
            }
        };
        Self {
            shared,
            worker: Mutex::new(worker),
            worker_id,
        }
    }

    /// Enqueues an event for the given listeners.
    pub fn enqueue(&self, event: Event, listeners: Vec<Arc<dyn EventListener>>) {
        if listeners.is_empty() {
            return;
        }
        if self.worker_id.is_none() {
            deliver(&Envelope { event, listeners });
            return;
        }
        let mut state = self.shared.state.lock();
        if state.shutdown {
            tracing::debug!(path = event.path(), "event queue closed; dropping event");
            return;
        }
        state.pending.push_back(Envelope { event, listeners });
        self.shared.ready.notify_one();
    }

    /// Blocks until every event enqueued so far has been delivered.
    ///
    /// Returns immediately when called from a listener.
    pub fn flush(&self) {
        if self.worker_id.is_none() || self.worker_id == Some(thread::current().id()) {
            return;
        }
        let mut state = self.shared.state.lock();
        while !state.shutdown && (!state.pending.is_empty() || state.in_flight) {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Number of events delivered so far.
    pub fn delivered(&self) -> u64 {
        self.shared.state.lock().delivered
    }

    /// Number of events waiting for delivery.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending.len()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.ready.notify_all();
            self.shared.idle.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn dispatch(shared: Arc<QueueShared>) {
    loop {
        let envelope = {
            let mut state = shared.state.lock();
            loop {
                if let Some(envelope) = state.pending.pop_front() {
                    state.in_flight = true;
                    break envelope;
                }
                shared.idle.notify_all();
                if state.shutdown {
                    return;
                }
                shared.ready.wait(&mut state);
            }
        };

        deliver(&envelope);
        drop(envelope);

        let mut state = shared.state.lock();
        state.in_flight = false;
        state.delivered += 1;
        if state.pending.is_empty() {
            shared.idle.notify_all();
        }
    }
}

fn deliver(envelope: &Envelope) {
    for listener in &envelope.listeners {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.notify(&envelope.event)));
        if outcome.is_err() {
            tracing::warn!(path = envelope.event.path(), "event listener panicked; continuing delivery");
        }
    }
}
