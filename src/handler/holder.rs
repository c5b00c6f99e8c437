//! Lifestyle holders.
//!
//! A holder maps provider requests to live providers according to the
//! component's lifestyle: one shared provider (retained hard, soft or
//! weak), a fresh provider per request, or one provider per thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::ControlResult;
use crate::handler::ComponentHandler;
use crate::policy::{CollectionPolicy, LifestylePolicy};
use crate::provider::{Provider, WeakProvider};
use crate::traits::Disposable;

pub(crate) trait Holder: Send + Sync {
    /// Returns a provider, creating and initializing one when required.
    fn get_provider(&self, handler: &ComponentHandler) -> ControlResult<Provider>;

    /// Number of live providers.
    fn size(&self) -> usize;

    /// Disposes every provider the holder can still reach.
    fn dispose(&self);

    /// Drops soft references idle for at least `idle` (all when `None`).
    fn reclaim(&self, _idle: Option<Duration>) -> usize {
        0
    }

    /// Releases the calling thread's provider, if the holder keeps one.
    fn release_current_thread(&self) -> bool {
        false
    }

    fn providers(&self) -> Vec<Provider>;
}

pub(crate) fn create_holder(lifestyle: LifestylePolicy, collection: CollectionPolicy) -> Box<dyn Holder> {
    match lifestyle {
        LifestylePolicy::Singleton => Box::new(SingletonHolder::new(collection)),
        LifestylePolicy::Transient => Box::new(TransientHolder::default()),
        LifestylePolicy::Thread => Box::new(ThreadHolder::default()),
    }
}

enum Reference {
    Hard(Provider),
    Soft {
        strong: Option<Provider>,
        weak: WeakProvider,
        touched: Instant,
    },
    Weak(WeakProvider),
}

impl Reference {
    fn new(collection: CollectionPolicy, provider: &Provider) -> Self {
        match collection {
            CollectionPolicy::Soft => Reference::Soft {
                strong: Some(provider.clone()),
                weak: provider.downgrade(),
                touched: Instant::now(),
            },
            CollectionPolicy::Weak => Reference::Weak(provider.downgrade()),
            CollectionPolicy::Hard | CollectionPolicy::System => Reference::Hard(provider.clone()),
        }
    }

    /// Live provider, refreshing a soft reference's access time.
    fn get(&mut self) -> Option<Provider> {
        match self {
            Reference::Hard(provider) => Some(provider.clone()),
            Reference::Soft { strong, weak, touched } => {
                let provider = strong.clone().or_else(|| weak.upgrade())?;
                *strong = Some(provider.clone());
                *touched = Instant::now();
                Some(provider)
            }
            Reference::Weak(weak) => weak.upgrade(),
        }
    }

    fn peek(&self) -> Option<Provider> {
        match self {
            Reference::Hard(provider) => Some(provider.clone()),
            Reference::Soft { strong, weak, .. } => strong.clone().or_else(|| weak.upgrade()),
            Reference::Weak(weak) => weak.upgrade(),
        }
    }
}

/// Zero or one provider shared by all callers
pub(crate) struct SingletonHolder {
    collection: CollectionPolicy,
    slot: Mutex<Option<Reference>>,
}

impl SingletonHolder {
    pub(crate) fn new(collection: CollectionPolicy) -> Self {
        Self {
            collection,
            slot: Mutex::new(None),
        }
    }
}

impl Holder for SingletonHolder {
    fn get_provider(&self, handler: &ComponentHandler) -> ControlResult<Provider> {
        let mut slot = self.slot.lock();
        if let Some(provider) = slot.as_mut().and_then(Reference::get) {
            if !provider.is_disposed() {
                return Ok(provider);
            }
        }
        let provider = Provider::create(handler)?;
        *slot = Some(Reference::new(self.collection, &provider));
        Ok(provider)
    }

    fn size(&self) -> usize {
        let slot = self.slot.lock();
        slot.as_ref().and_then(Reference::peek).map_or(0, |_| 1)
    }

    fn dispose(&self) {
        let taken = self.slot.lock().take();
        if let Some(provider) = taken.as_ref().and_then(Reference::peek) {
            provider.dispose();
        }
    }

    fn reclaim(&self, idle: Option<Duration>) -> usize {
        let released = {
            let mut slot = self.slot.lock();
            match slot.as_mut() {
                Some(Reference::Soft { strong, touched, .. })
                    if idle.map_or(true, |idle| touched.elapsed() >= idle) =>
                {
                    strong.take()
                }
                _ => None,
            }
        };
        // dropped outside the lock; the last owner disposes the provider
        released.map_or(0, |provider| {
            drop(provider);
            1
        })
    }

    fn providers(&self) -> Vec<Provider> {
        self.slot.lock().as_ref().and_then(Reference::peek).into_iter().collect()
    }
}

/// A new provider per request, tracked weakly for disposal
#[derive(Default)]
pub(crate) struct TransientHolder {
    issued: Mutex<Vec<WeakProvider>>,
}

impl Holder for TransientHolder {
    fn get_provider(&self, handler: &ComponentHandler) -> ControlResult<Provider> {
        let provider = Provider::create(handler)?;
        let mut issued = self.issued.lock();
        issued.retain(WeakProvider::is_alive);
        issued.push(provider.downgrade());
        Ok(provider)
    }

    fn size(&self) -> usize {
        self.issued.lock().iter().filter(|p| p.is_alive()).count()
    }

    fn dispose(&self) {
        let issued = std::mem::take(&mut *self.issued.lock());
        for provider in issued.iter().rev().filter_map(WeakProvider::upgrade) {
            provider.dispose();
        }
    }

    fn providers(&self) -> Vec<Provider> {
        self.issued.lock().iter().filter_map(WeakProvider::upgrade).collect()
    }
}

type ThreadProviders = Mutex<HashMap<ThreadId, Provider>>;

/// One provider per calling thread, disposed when that thread exits
#[derive(Default)]
pub(crate) struct ThreadHolder {
    providers: Arc<ThreadProviders>,
}

impl Holder for ThreadHolder {
    fn get_provider(&self, handler: &ComponentHandler) -> ControlResult<Provider> {
        let id = thread::current().id();
        if let Some(provider) = self.providers.lock().get(&id) {
            if !provider.is_disposed() {
                return Ok(provider.clone());
            }
        }
        // only this thread ever creates the entry for its id
        let provider = Provider::create(handler)?;
        self.providers.lock().insert(id, provider.clone());

        let registry: Weak<ThreadProviders> = Arc::downgrade(&self.providers);
        on_thread_exit(Box::new(move || {
            let Some(registry) = registry.upgrade() else {
                return;
            };
            let released = registry.lock().remove(&id);
            if let Some(provider) = released {
                provider.dispose();
            }
        }));
        Ok(provider)
    }

    fn size(&self) -> usize {
        self.providers.lock().len()
    }

    fn dispose(&self) {
        let drained: Vec<Provider> = self.providers.lock().drain().map(|(_, p)| p).collect();
        for provider in drained {
            provider.dispose();
        }
    }

    fn release_current_thread(&self) -> bool {
        let released = self.providers.lock().remove(&thread::current().id());
        match released {
            Some(provider) => {
                provider.dispose();
                true
            }
            None => false,
        }
    }

    fn providers(&self) -> Vec<Provider> {
        self.providers.lock().values().cloned().collect()
    }
}

#[derive(Default)]
struct ExitHooks(RefCell<Vec<Box<dyn FnOnce()>>>);

impl Drop for ExitHooks {
    fn drop(&mut self) {
        let hooks = std::mem::take(self.0.get_mut());
        for hook in hooks.into_iter().rev() {
            hook();
        }
    }
}

thread_local! {
    static EXIT_HOOKS: ExitHooks = ExitHooks::default();
}

fn on_thread_exit(hook: Box<dyn FnOnce()>) {
    let registered = EXIT_HOOKS.try_with(|hooks| hooks.0.borrow_mut().push(hook));
    if registered.is_err() {
        tracing::debug!("thread is exiting; per-thread provider left to holder disposal");
    }
}
