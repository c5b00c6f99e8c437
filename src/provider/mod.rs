//! Component providers.
//!
//! A [`Provider`] owns exactly one component instance for its whole life.
//! Handlers create providers through their holder; the provider then runs
//! the instance through commissioning (parts first, then construction,
//! proxy and state-machine initialization) and, on disposal, through
//! termination, nested-component teardown and release.
//!
//! Status only moves forward:
//! `Instantiated -> Commissioning -> Available -> Decommissioning -> Disposed`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::control::ComponentController;
use crate::error::{ControlError, ControlResult};
use crate::events::{Event, EventListener, Listeners, StateEvent, StatusEvent};
use crate::handler::{ComponentHandler, HandlerInner};
use crate::info::{AnyArc, Type};
use crate::internal::{run_hooks, DisposeBag};
use crate::logging::Logger;
use crate::machine::{StateChange, StateInfo, StateMachine, Target};
use crate::parts::PartsManager;
use crate::runtime::Runtime;
use crate::traits::Disposable;

mod value;

pub use value::{ComponentValue, ServiceProxy};
use value::{service_views, ServiceViews};

/// Lifecycle status of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    Instantiated,
    Commissioning,
    Available,
    Decommissioning,
    Disposed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Instantiated => "instantiated",
            Status::Commissioning => "commissioning",
            Status::Available => "available",
            Status::Decommissioning => "decommissioning",
            Status::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Owner of one component instance
///
/// Cloning a provider clones the handle, not the instance.
#[derive(Clone)]
pub struct Provider {
    inner: Arc<ProviderInner>,
}

/// Non-owning provider handle held by transient holders and contexts
#[derive(Clone)]
pub(crate) struct WeakProvider(Weak<ProviderInner>);

impl WeakProvider {
    pub(crate) fn upgrade(&self) -> Option<Provider> {
        self.0.upgrade().map(|inner| Provider { inner })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

pub(crate) struct ProviderInner {
    id: u64,
    path: String,
    ty: Arc<Type>,
    handler: Weak<HandlerInner>,
    controller: ComponentController,
    runtime: Runtime,
    parts: Arc<PartsManager>,
    logger: Logger,
    status: Mutex<Status>,
    lifecycle: ReentrantMutex<()>,
    instance: RwLock<Option<AnyArc>>,
    views: RwLock<Option<ServiceViews>>,
    machine: StateMachine,
    overrides: RwLock<HashMap<String, AnyArc>>,
    nested: Mutex<NestedComponents>,
    listeners: Listeners,
    disposed: AtomicBool,
}

#[derive(Default)]
struct NestedComponents {
    handlers: HashMap<String, ComponentHandler>,
    teardown: DisposeBag,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.inner.id)
            .field("path", &self.inner.path)
            .field("status", &self.status())
            .finish()
    }
}

impl Provider {
    /// Creates an uninitialized provider for `handler`.
    pub(crate) fn new(handler: &ComponentHandler) -> Self {
        let model = handler.model();
        let ty = model.component_type().clone();
        let runtime = handler.runtime().clone();
        Self {
            inner: Arc::new(ProviderInner {
                id: runtime.next_id(),
                path: model.path().to_string(),
                machine: StateMachine::new(ty.state_graph().clone()),
                ty,
                handler: Arc::downgrade(handler.inner()),
                controller: handler.controller().clone(),
                parts: handler.parts_manager().clone(),
                logger: handler.logger().clone(),
                runtime,
                status: Mutex::new(Status::Instantiated),
                lifecycle: ReentrantMutex::new(()),
                instance: RwLock::new(None),
                views: RwLock::new(None),
                overrides: RwLock::new(HashMap::new()),
                nested: Mutex::new(NestedComponents::default()),
                listeners: Listeners::default(),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Creates and initializes a provider; a failed initialization leaves nothing behind.
    pub(crate) fn create(handler: &ComponentHandler) -> ControlResult<Self> {
        let provider = Self::new(handler);
        provider.initialize()?;
        Ok(provider)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn status(&self) -> Status {
        *self.inner.status.lock()
    }

    /// The handler that created this provider.
    pub fn handler(&self) -> ControlResult<ComponentHandler> {
        self.inner
            .handler
            .upgrade()
            .map(ComponentHandler::from_inner)
            .ok_or_else(|| ControlError::IllegalState(format!("handler of [{}] is gone", self.inner.path)))
    }

    pub(crate) fn downgrade(&self) -> WeakProvider {
        WeakProvider(Arc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Provider) -> bool {
        Arc::ptr_eq(&self.inner, other.inner())
    }

    fn inner(&self) -> &Arc<ProviderInner> {
        &self.inner
    }

    /// Commissions the provider: parts, instance, proxy, then state-machine initialization.
    ///
    /// Idempotent once past `Instantiated`. On failure the provider is
    /// disposed and the error returned.
    pub fn initialize(&self) -> ControlResult<()> {
        let _lifecycle = self.inner.lifecycle.lock();
        if self.status() != Status::Instantiated {
            return Ok(());
        }
        self.inner.set_status(Status::Commissioning);
        match self.commission_instance() {
            Ok(()) => {
                self.inner.set_status(Status::Available);
                self.inner.runtime.observers().instantiated(&self.inner.path, self.inner.id);
                self.inner.logger.debug(format_args!("provider {} available", self.inner.id));
                Ok(())
            }
            Err(error) => {
                self.inner.runtime.observers().failure(&self.inner.path, &error);
                self.inner.logger.warn(format_args!("provider {} failed to initialize: {}", self.inner.id, error));
                self.inner.dispose();
                Err(error)
            }
        }
    }

    fn commission_instance(&self) -> ControlResult<()> {
        self.inner.parts.commission()?;
        let instance = self.inner.controller.create_instance(self)?;
        *self.inner.instance.write() = Some(instance.clone());
        *self.inner.views.write() = service_views(&self.inner.ty, &instance);
        let changes = self.inner.machine.initialize(&self.inner.target(&instance))?;
        self.inner.publish_changes(changes);
        Ok(())
    }

    /// Returns the instance, or its isolating proxy when `isolate` is set.
    ///
    /// A provider still in `Instantiated` is initialized first. Isolation
    /// falls back to the raw instance when the type publishes no interfaces.
    pub fn get_value(&self, isolate: bool) -> ControlResult<ComponentValue> {
        if self.status() == Status::Instantiated {
            self.initialize()?;
        }
        let status = self.status();
        if status != Status::Available {
            return Err(ControlError::IllegalState(format!(
                "provider {} of [{}] is {}",
                self.inner.id, self.inner.path, status
            )));
        }
        if isolate {
            if let Some(views) = self.inner.views.read().clone() {
                return Ok(ComponentValue::Proxy(ServiceProxy::new(views, self.clone())));
            }
        }
        self.inner
            .instance
            .read()
            .clone()
            .map(ComponentValue::Instance)
            .ok_or_else(|| ControlError::IllegalState(format!("provider {} has no instance", self.inner.id)))
    }

    /// Typed access to the raw instance.
    pub fn instance<T: std::any::Any + Send + Sync>(&self) -> ControlResult<Arc<T>> {
        self.get_value(false)?.downcast::<T>().ok_or_else(|| {
            ControlError::IllegalState(format!(
                "instance of [{}] is not a {}",
                self.inner.path,
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn state(&self) -> StateInfo {
        self.inner.machine.state()
    }

    /// Transition names available from the current state.
    pub fn transitions(&self) -> Vec<String> {
        self.inner.machine.transitions()
    }

    pub fn operations(&self) -> Vec<String> {
        self.inner.machine.operations()
    }

    /// Applies a named transition and publishes the resulting state change.
    pub fn apply(&self, transition: &str) -> ControlResult<StateInfo> {
        let instance = self.available_instance()?;
        let change = self.inner.machine.apply(transition, &self.inner.target(&instance))?;
        self.inner.publish_changes(vec![change]);
        Ok(self.state())
    }

    /// Executes a named operation in the current state.
    pub fn exec(&self, operation: &str) -> ControlResult<()> {
        let instance = self.available_instance()?;
        self.inner.machine.exec(operation, &self.inner.target(&instance))
    }

    fn available_instance(&self) -> ControlResult<AnyArc> {
        match self.get_value(false)? {
            ComponentValue::Instance(instance) => Ok(instance),
            ComponentValue::Proxy(_) => Err(ControlError::IllegalState("unexpected proxy".to_string())),
        }
    }

    /// Overrides a context entry for this provider only.
    pub fn set_context_value(&self, key: impl Into<String>, value: AnyArc) -> Option<AnyArc> {
        self.inner.overrides.write().insert(key.into(), value)
    }

    pub fn remove_context_value(&self, key: &str) -> Option<AnyArc> {
        self.inner.overrides.write().remove(key)
    }

    pub(crate) fn context_override(&self, key: &str) -> Option<AnyArc> {
        self.inner.overrides.read().get(key).cloned()
    }

    /// Returns the nested component handler for `key`, creating it on first use.
    ///
    /// Nested handlers are decommissioned and disposed with the provider,
    /// most recently created first.
    pub(crate) fn nested_component<F>(&self, key: &str, create: F) -> ControlResult<ComponentHandler>
    where
        F: FnOnce() -> ControlResult<ComponentHandler>,
    {
        let mut nested = self.inner.nested.lock();
        if let Some(handler) = nested.handlers.get(key) {
            return Ok(handler.clone());
        }
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(ControlError::IllegalState(format!("provider of [{}] is disposed", self.inner.path)));
        }
        let handler = create()?;
        nested.handlers.insert(key.to_string(), handler.clone());
        let teardown = handler.clone();
        nested.teardown.push(
            format!("{}#{}", self.inner.path, key),
            Box::new(move || {
                teardown.decommission();
                teardown.dispose();
            }),
        );
        Ok(handler)
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.inner.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn EventListener>) {
        self.inner.listeners.remove(listener);
    }
}

impl Disposable for Provider {
    fn dispose(&self) {
        self.inner.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl ProviderInner {
    fn target<'a>(&'a self, instance: &'a AnyArc) -> Target<'a> {
        Target {
            instance,
            ty: &self.ty,
            path: &self.path,
        }
    }

    fn listener_snapshot(&self) -> Vec<Arc<dyn EventListener>> {
        let mut listeners = self.listeners.snapshot();
        if let Some(handler) = self.handler.upgrade() {
            listeners.extend(handler.listeners.snapshot());
        }
        listeners
    }

    fn set_status(&self, status: Status) {
        let old = {
            let mut current = self.status.lock();
            if *current >= status {
                return;
            }
            std::mem::replace(&mut *current, status)
        };
        self.runtime.publish(
            Event::Status(StatusEvent {
                path: self.path.clone(),
                provider: self.id,
                old_status: old,
                new_status: status,
                timestamp: Utc::now(),
            }),
            self.listener_snapshot(),
        );
    }

    fn publish_changes(&self, changes: Vec<StateChange>) {
        if changes.is_empty() {
            return;
        }
        let listeners = self.listener_snapshot();
        for change in changes {
            self.runtime.publish(
                Event::State(StateEvent {
                    path: self.path.clone(),
                    provider: self.id,
                    old_state: change.old,
                    new_state: change.new,
                    timestamp: Utc::now(),
                }),
                listeners.clone(),
            );
        }
    }

    fn handler_is_active(&self) -> bool {
        self.handler.upgrade().map(|h| h.is_active()).unwrap_or(false)
    }

    fn dispose(&self) {
        let _lifecycle = self.lifecycle.lock();
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let instance = self.instance.read().clone();
        if let Some(instance) = instance {
            self.set_status(Status::Decommissioning);
            match self.machine.terminate(&self.target(&instance)) {
                Ok(changes) => self.publish_changes(changes),
                Err(error) => self.logger.warn(format_args!("termination of provider {} failed: {}", self.id, error)),
            }
        }

        let hooks = {
            let mut nested = self.nested.lock();
            nested.handlers.clear();
            nested.teardown.take_reverse()
        };
        run_hooks(&self.path, hooks);

        if !self.handler_is_active() {
            self.parts.decommission();
        }

        self.machine.dispose();
        *self.views.write() = None;
        *self.instance.write() = None;
        self.overrides.write().clear();
        self.set_status(Status::Disposed);
        self.runtime.observers().disposed(&self.path, self.id);
        self.logger.debug(format_args!("provider {} disposed", self.id));
        self.listeners.clear();
    }
}

impl Drop for ProviderInner {
    fn drop(&mut self) {
        self.dispose();
    }
}
