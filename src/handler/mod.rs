//! Component handlers.
//!
//! A [`ComponentHandler`] is the runtime control surface of one component
//! model. It commissions and decommissions the component, hands out
//! providers through its lifestyle holder, answers service lookups for its
//! children and carries the handler-level context override map.
//!
//! Commissioning sets category log levels, instantiates a `Startup`
//! component eagerly and then commissions `Startup` parts in declaration
//! order. Any failure rolls the handler back to inactive.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{ReentrantMutex, RwLock};

use crate::cancellation::CancellationToken;
use crate::control::ComponentController;
use crate::error::{ControlError, ControlResult};
use crate::events::{EventListener, Listeners};
use crate::info::AnyArc;
use crate::internal::ResolutionGuard;
use crate::loader::ClassLoader;
use crate::logging::{category_for_path, Logger};
use crate::model::ComponentModel;
use crate::parts::PartsManager;
use crate::policy::{ActivationPolicy, CollectionPolicy, LifestylePolicy};
use crate::provider::Provider;
use crate::runtime::{Reclaimable, Runtime};
use crate::service::Service;
use crate::traits::{Commissionable, Disposable};

mod holder;

use holder::{create_holder, Holder};

/// Activation state of a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandlerState {
    Inactive = 0,
    Commissioning = 1,
    Active = 2,
    Decommissioning = 3,
}

impl HandlerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => HandlerState::Commissioning,
            2 => HandlerState::Active,
            3 => HandlerState::Decommissioning,
            _ => HandlerState::Inactive,
        }
    }
}

/// Handler-level context overrides
///
/// Values put here take precedence over the model's directives for every
/// provider of the handler; a provider's own overrides take precedence
/// over these.
#[derive(Clone, Default)]
pub struct ContextMap {
    entries: Arc<RwLock<HashMap<String, AnyArc>>>,
}

impl fmt::Debug for ContextMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextMap").field("keys", &self.keys()).finish()
    }
}

impl ContextMap {
    pub fn put(&self, key: impl Into<String>, value: AnyArc) -> Option<AnyArc> {
        self.entries.write().insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<AnyArc> {
        self.entries.read().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<AnyArc> {
        self.entries.write().remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Runtime control surface of one component
///
/// Cheap to clone; clones share the same handler.
#[derive(Clone)]
pub struct ComponentHandler {
    inner: Arc<HandlerInner>,
}

pub(crate) struct HandlerInner {
    model: ComponentModel,
    parent: Option<Weak<HandlerInner>>,
    classloader: ClassLoader,
    controller: ComponentController,
    runtime: Runtime,
    holder: Box<dyn Holder>,
    parts: Arc<PartsManager>,
    state: AtomicU8,
    monitor: ReentrantMutex<()>,
    overrides: ContextMap,
    symbols: HashMap<String, String>,
    logger: Logger,
    activation: ActivationPolicy,
    collection: CollectionPolicy,
    managed: bool,
    disposed: AtomicBool,
    pub(crate) listeners: Listeners,
}

impl HandlerInner {
    pub(crate) fn is_active(&self) -> bool {
        HandlerState::from_u8(self.state.load(Ordering::Acquire)) == HandlerState::Active
    }
}

impl Reclaimable for HandlerInner {
    fn reclaim(&self, idle: Option<std::time::Duration>) -> usize {
        self.holder.reclaim(idle)
    }
}

/// Construction inputs for a handler
pub(crate) struct HandlerSettings<'a> {
    pub parent: Option<&'a ComponentHandler>,
    pub classloader: ClassLoader,
    pub model: ComponentModel,
    pub controller: ComponentController,
    pub managed: bool,
}

impl fmt::Debug for ComponentHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandler")
            .field("path", &self.path())
            .field("state", &self.state())
            .field("lifestyle", &self.inner.model.lifestyle_policy())
            .field("collection", &self.inner.collection)
            .field("size", &self.size())
            .finish()
    }
}

impl ComponentHandler {
    pub(crate) fn new(settings: HandlerSettings<'_>) -> Self {
        let HandlerSettings {
            parent,
            classloader,
            model,
            controller,
            managed,
        } = settings;
        let runtime = model.runtime().clone();
        let config = runtime.config();
        let activation = model.activation_policy().resolve(config.default_activation);
        let collection =
            model
                .collection_policy()
                .resolve(parent.is_some(), config.root_collection, config.nested_collection);
        let lifestyle = model.lifestyle_policy();
        let logger = runtime.logger(category_for_path(model.path()));
        let symbols = symbols_for(&model, &runtime);

        let inner = Arc::new_cyclic(|weak: &Weak<HandlerInner>| HandlerInner {
            parts: Arc::new(PartsManager::new(weak.clone(), model.clone(), controller.clone())),
            holder: create_holder(lifestyle, collection),
            parent: parent.map(|p| Arc::downgrade(&p.inner)),
            model,
            classloader,
            controller,
            runtime: runtime.clone(),
            state: AtomicU8::new(HandlerState::Inactive as u8),
            monitor: ReentrantMutex::new(()),
            overrides: ContextMap::default(),
            symbols,
            logger,
            activation,
            collection,
            managed,
            disposed: AtomicBool::new(false),
            listeners: Listeners::default(),
        });
        if lifestyle == LifestylePolicy::Singleton && collection == CollectionPolicy::Soft {
            let weak: Weak<dyn Reclaimable> = Arc::downgrade(&inner) as Weak<dyn Reclaimable>;
            runtime.register_reclaimable(weak);
        }
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<HandlerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<HandlerInner> {
        &self.inner
    }

    pub fn model(&self) -> &ComponentModel {
        &self.inner.model
    }

    pub fn path(&self) -> &str {
        self.inner.model.path()
    }

    pub fn name(&self) -> &str {
        self.inner.model.name()
    }

    pub fn classloader(&self) -> &ClassLoader {
        &self.inner.classloader
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub(crate) fn controller(&self) -> &ComponentController {
        &self.inner.controller
    }

    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    pub fn parts_manager(&self) -> &Arc<PartsManager> {
        &self.inner.parts
    }

    pub fn parent(&self) -> Option<ComponentHandler> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(ComponentHandler::from_inner)
    }

    /// Activation policy with `System` resolved against the runtime default.
    pub fn activation_policy(&self) -> ActivationPolicy {
        self.inner.activation
    }

    /// Collection policy with `System` resolved for this handler's position.
    pub fn collection_policy(&self) -> CollectionPolicy {
        self.inner.collection
    }

    pub fn state(&self) -> HandlerState {
        HandlerState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    fn set_state(&self, state: HandlerState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    /// Symbol table for `${name}` expansion in literal context values.
    pub fn symbols(&self) -> &HashMap<String, String> {
        &self.inner.symbols
    }

    pub fn context_map(&self) -> &ContextMap {
        &self.inner.overrides
    }

    fn ensure_live(&self) -> ControlResult<()> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(ControlError::IllegalState(format!("handler [{}] is disposed", self.path())));
        }
        Ok(())
    }

    /// Brings the handler to `Active`.
    ///
    /// No-op when already active or commissioning on this thread. On
    /// failure everything started so far is torn down and the handler is
    /// left inactive.
    pub fn commission(&self) -> ControlResult<()> {
        let _monitor = self.inner.monitor.lock();
        self.ensure_live()?;
        if matches!(self.state(), HandlerState::Active | HandlerState::Commissioning) {
            return Ok(());
        }

        let started = Instant::now();
        self.set_state(HandlerState::Commissioning);
        self.inner.runtime.observers().commissioning(self.path());
        match self.activate() {
            Ok(()) => {
                self.set_state(HandlerState::Active);
                let elapsed = started.elapsed();
                self.inner.runtime.observers().commissioned(self.path(), elapsed);
                self.inner.logger.debug(format_args!("commissioned in {:?}", elapsed));
                Ok(())
            }
            Err(error) => {
                self.inner.runtime.observers().failure(self.path(), &error);
                self.inner.logger.warn(format_args!("commissioning failed: {}", error));
                self.deactivate();
                Err(error)
            }
        }
    }

    fn activate(&self) -> ControlResult<()> {
        let category = self.inner.logger.category();
        for directive in self.inner.model.categories() {
            let name = if directive.name.is_empty() {
                category.to_string()
            } else {
                format!("{}.{}", category, directive.name)
            };
            self.inner.runtime.levels().set(name, directive.priority);
        }
        if self.inner.activation == ActivationPolicy::Startup {
            self.get_provider()?;
        }
        self.inner.parts.commission()
    }

    /// Returns the handler to `Inactive`, disposing every provider.
    ///
    /// Teardown problems are logged, never returned. No-op when inactive.
    pub fn decommission(&self) {
        let _monitor = self.inner.monitor.lock();
        if self.state() == HandlerState::Inactive {
            return;
        }
        self.deactivate();
    }

    fn deactivate(&self) {
        self.set_state(HandlerState::Decommissioning);
        if panic::catch_unwind(AssertUnwindSafe(|| self.inner.holder.dispose())).is_err() {
            self.inner.logger.warn("provider disposal panicked; continuing with parts");
        }
        self.inner.parts.decommission();
        self.set_state(HandlerState::Inactive);
        self.inner.runtime.observers().decommissioned(self.path());
        self.inner.logger.debug("decommissioned");
    }

    /// Returns a provider according to the component's lifestyle.
    ///
    /// An inactive handler is commissioned first. A context model whose
    /// directives changed since the last check is re-validated.
    pub fn get_provider(&self) -> ControlResult<Provider> {
        self.ensure_live()?;
        if !matches!(self.state(), HandlerState::Active | HandlerState::Commissioning) {
            self.commission()?;
        }
        if self.inner.model.context_model().is_dirty() {
            self.inner.model.validate()?;
        }
        let _guard = ResolutionGuard::enter(self.path())?;
        self.inner.holder.get_provider(self)
    }

    /// Releases the calling thread's provider of a `Thread` lifestyle handler.
    pub fn release_thread_provider(&self) -> bool {
        self.inner.holder.release_current_thread()
    }

    /// Number of live providers.
    pub fn size(&self) -> usize {
        self.inner.holder.size()
    }

    /// Resolves a service against the parts of this handler, then its ancestors.
    pub fn lookup(&self, service: &Service) -> ControlResult<Provider> {
        for (_, part) in self.inner.parts.handlers()?.iter() {
            if part.is_a_candidate(service) {
                return part.get_provider();
            }
        }
        match self.parent() {
            Some(parent) => parent.lookup(service),
            None => Err(ControlError::ServiceNotFound(service.to_string())),
        }
    }

    /// True when this component publishes a service satisfying `service`.
    pub fn is_a_candidate(&self, service: &Service) -> bool {
        self.inner
            .model
            .component_type()
            .services()
            .iter()
            .any(|s| service.matches(&s.classname, s.version.as_ref()))
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.inner.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn EventListener>) {
        self.inner.listeners.remove(listener);
    }

    pub fn ptr_eq(&self, other: &ComponentHandler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Renders the handler tree with states and provider counts.
    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        let mut out = String::new();
        self.write_tree(&mut out, 0);
        out
    }

    #[cfg(feature = "diagnostics")]
    fn write_tree(&self, out: &mut String, depth: usize) {
        use std::fmt::Write;

        let _ = writeln!(
            out,
            "{}{} [{:?}] {:?}/{:?} providers={}",
            "  ".repeat(depth),
            self.path(),
            self.state(),
            self.inner.model.lifestyle_policy(),
            self.inner.collection,
            self.size()
        );
        if let Some(parts) = self.inner.parts.built_handlers() {
            for (_, part) in parts.iter() {
                part.write_tree(out, depth + 1);
            }
        }
    }
}

impl Commissionable for ComponentHandler {
    fn label(&self) -> String {
        self.path().to_string()
    }

    fn commission(&self, token: &CancellationToken) -> ControlResult<()> {
        token.throw_if_cancelled()?;
        ComponentHandler::commission(self)
    }
}

impl Disposable for ComponentHandler {
    fn dispose(&self) {
        let _monitor = self.inner.monitor.lock();
        if self.inner.disposed.load(Ordering::Acquire) {
            return;
        }
        self.decommission();
        self.inner.disposed.store(true, Ordering::Release);
        self.inner.parts.dispose();
        self.inner.listeners.clear();
        if self.inner.managed {
            self.inner.model.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

fn symbols_for(model: &ComponentModel, runtime: &Runtime) -> HashMap<String, String> {
    let config = runtime.config();
    HashMap::from([
        ("name".to_string(), model.name().to_string()),
        ("path".to_string(), model.path().to_string()),
        ("work".to_string(), config.work_dir.display().to_string()),
        ("temp".to_string(), config.temp_dir.display().to_string()),
        ("uri".to_string(), format!("component:{}", model.path())),
    ])
}
