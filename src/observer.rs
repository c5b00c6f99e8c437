//! Lifecycle observers for component traceability.
//!
//! Observers receive synchronous callbacks as handlers commission and
//! decommission and as providers come and go. Unlike event listeners they
//! run on the thread performing the work, so implementations should stay
//! lightweight.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::ControlError;

/// Observer trait for component lifecycle events.
///
/// Every method has an empty default so implementations only override the
/// hooks they care about.
///
/// # Examples
///
/// ```
/// use ferrous_metro::LifecycleObserver;
/// use std::time::Duration;
///
/// struct Timing;
///
/// impl LifecycleObserver for Timing {
///     fn commissioned(&self, path: &str, duration: Duration) {
///         println!("{} ready in {:?}", path, duration);
///     }
/// }
/// ```
pub trait LifecycleObserver: Send + Sync {
    /// A handler started commissioning.
    fn commissioning(&self, _path: &str) {}

    /// A handler finished commissioning.
    fn commissioned(&self, _path: &str, _duration: Duration) {}

    /// A handler returned to the inactive state.
    fn decommissioned(&self, _path: &str) {}

    /// A provider reached the available status.
    fn instantiated(&self, _path: &str, _provider: u64) {}

    /// A provider was disposed.
    fn disposed(&self, _path: &str, _provider: u64) {}

    /// A lifecycle operation failed.
    fn failure(&self, _path: &str, _error: &ControlError) {}
}

/// Observer that writes lifecycle events through `tracing`
#[derive(Debug)]
pub struct LoggingObserver {
    prefix: String,
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self::with_prefix("[metro]")
    }
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl LifecycleObserver for LoggingObserver {
    fn commissioning(&self, path: &str) {
        tracing::debug!(path, "{} commissioning", self.prefix);
    }

    fn commissioned(&self, path: &str, duration: Duration) {
        tracing::info!(path, ?duration, "{} commissioned", self.prefix);
    }

    fn decommissioned(&self, path: &str) {
        tracing::info!(path, "{} decommissioned", self.prefix);
    }

    fn instantiated(&self, path: &str, provider: u64) {
        tracing::debug!(path, provider, "{} instantiated", self.prefix);
    }

    fn disposed(&self, path: &str, provider: u64) {
        tracing::debug!(path, provider, "{} disposed", self.prefix);
    }

    fn failure(&self, path: &str, error: &ControlError) {
        tracing::warn!(path, %error, "{} lifecycle failure", self.prefix);
    }
}

/// Observer that records lifecycle events as `"<event>:<path>"` strings
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: &str, path: &str) {
        self.events.lock().push(format!("{}:{}", event, path));
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Recorded events of one kind, in order, as paths.
    pub fn paths(&self, event: &str) -> Vec<String> {
        let prefix = format!("{}:", event);
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl LifecycleObserver for RecordingObserver {
    fn commissioning(&self, path: &str) {
        self.record("commissioning", path);
    }

    fn commissioned(&self, path: &str, _duration: Duration) {
        self.record("commissioned", path);
    }

    fn decommissioned(&self, path: &str) {
        self.record("decommissioned", path);
    }

    fn instantiated(&self, path: &str, _provider: u64) {
        self.record("instantiated", path);
    }

    fn disposed(&self, path: &str, _provider: u64) {
        self.record("disposed", path);
    }

    fn failure(&self, path: &str, _error: &ControlError) {
        self.record("failure", path);
    }
}

/// Container for managing multiple observers.
#[derive(Default, Clone)]
pub(crate) struct Observers {
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl Observers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn commissioning(&self, path: &str) {
        for observer in &self.observers {
            observer.commissioning(path);
        }
    }

    pub(crate) fn commissioned(&self, path: &str, duration: Duration) {
        for observer in &self.observers {
            observer.commissioned(path, duration);
        }
    }

    pub(crate) fn decommissioned(&self, path: &str) {
        for observer in &self.observers {
            observer.decommissioned(path);
        }
    }

    pub(crate) fn instantiated(&self, path: &str, provider: u64) {
        for observer in &self.observers {
            observer.instantiated(path, provider);
        }
    }

    pub(crate) fn disposed(&self, path: &str, provider: u64) {
        for observer in &self.observers {
            observer.disposed(path, provider);
        }
    }

    pub(crate) fn failure(&self, path: &str, error: &ControlError) {
        for observer in &self.observers {
            observer.failure(path, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_paths() {
        let recorder = Arc::new(RecordingObserver::new());
        let mut observers = Observers::new();
        assert!(!observers.has_observers());
        observers.add(recorder.clone());
        observers.add(Arc::new(LoggingObserver::new()));

        observers.commissioning("/a");
        observers.commissioned("/a", Duration::from_millis(1));
        observers.decommissioned("/b");
        observers.decommissioned("/a");

        assert_eq!(observers.len(), 2);
        assert_eq!(recorder.paths("decommissioned"), vec!["/b", "/a"]);
        assert_eq!(recorder.events().len(), 4);
        recorder.clear();
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_logging_observer_prefix() {
        assert_eq!(LoggingObserver::default().prefix(), "[metro]");
        assert_eq!(LoggingObserver::new().prefix(), LoggingObserver::default().prefix());
        assert_eq!(LoggingObserver::with_prefix("[edge]").prefix(), "[edge]");
    }
}
