//! Shared runtime context.
//!
//! A [`Runtime`] bundles everything the components of one controller share:
//! configuration, the event queue and its dispatcher thread, logging levels,
//! lifecycle observers, the type cache and the registry of handlers holding
//! reclaimable (soft) singletons. It is passed explicitly to every model and
//! handler; nothing here is process-global.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::RuntimeConfig;
use crate::events::{Event, EventListener, EventQueue};
use crate::logging::{Logger, LoggingLevels};
use crate::observer::{LifecycleObserver, Observers};
use crate::type_loader::TypeLoader;

/// Something holding references the runtime may reclaim
pub(crate) trait Reclaimable: Send + Sync {
    /// Releases soft references idle for at least `idle` (all when `None`).
    fn reclaim(&self, idle: Option<Duration>) -> usize;
}

/// Cheaply clonable handle to the shared runtime state
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    config: RuntimeConfig,
    events: EventQueue,
    levels: Arc<LoggingLevels>,
    observers: Observers,
    types: TypeLoader,
    reclaimable: Mutex<Vec<Weak<dyn Reclaimable>>>,
    ids: AtomicU64,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("events", &self.inner.events)
            .field("observers", &self.inner.observers.len())
            .field("types", &self.inner.types.len())
            .finish()
    }
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_observers(config, Vec::new())
    }

    pub fn with_observers(config: RuntimeConfig, observers: Vec<Arc<dyn LifecycleObserver>>) -> Self {
        let mut registered = Observers::new();
        for observer in observers {
            registered.add(observer);
        }
        Self {
            inner: Arc::new(RuntimeInner {
                levels: Arc::new(LoggingLevels::new(config.log_level)),
                config,
                events: EventQueue::new(),
                observers: registered,
                types: TypeLoader::new(),
                reclaimable: Mutex::new(Vec::new()),
                ids: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &EventQueue {
        &self.inner.events
    }

    pub fn levels(&self) -> &Arc<LoggingLevels> {
        &self.inner.levels
    }

    /// Logger for an arbitrary category.
    pub fn logger(&self, category: impl Into<String>) -> Logger {
        Logger::new(category, self.inner.levels.clone())
    }

    pub fn type_loader(&self) -> &TypeLoader {
        &self.inner.types
    }

    pub(crate) fn observers(&self) -> &Observers {
        &self.inner.observers
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.inner.ids.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn publish(&self, event: Event, listeners: Vec<Arc<dyn EventListener>>) {
        self.inner.events.enqueue(event, listeners);
    }

    pub(crate) fn register_reclaimable(&self, target: Weak<dyn Reclaimable>) {
        let mut registry = self.inner.reclaimable.lock();
        registry.retain(|w| w.strong_count() > 0);
        registry.push(target);
    }

    fn reclaim(&self, idle: Option<Duration>) -> usize {
        let targets: Vec<Arc<dyn Reclaimable>> = {
            let mut registry = self.inner.reclaimable.lock();
            registry.retain(|w| w.strong_count() > 0);
            registry.iter().filter_map(Weak::upgrade).collect()
        };
        targets.iter().map(|t| t.reclaim(idle)).sum()
    }

    /// Simulates memory pressure: every soft singleton becomes reclaimable.
    ///
    /// Returns the number of soft references released. A released provider
    /// is disposed once no caller holds it, and re-created on next demand.
    pub fn collect(&self) -> usize {
        let released = self.reclaim(None);
        tracing::debug!(released, "reclaimed soft references");
        released
    }

    /// Releases soft singletons idle longer than the configured TTL.
    pub fn collect_idle(&self) -> usize {
        match self.inner.config.soft_reference_ttl {
            Some(ttl) => self.reclaim(Some(ttl)),
            None => 0,
        }
    }

    /// Blocks until all queued events were delivered.
    pub fn flush_events(&self) {
        self.inner.events.flush();
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}
