//! Component models.
//!
//! A [`ComponentModel`] is the mutable, event-emitting configuration of one
//! declared component: its resolved type and class loader, its policies,
//! its context model and its ordered part models. Models are created by the
//! component controller from a directive; setters publish a
//! [`ModelEvent`](crate::ModelEvent) to registered listeners instead of
//! exposing lock-free state.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use crate::directive::{CategoryDirective, Classpath, ComponentDirective, EntryDirective};
use crate::error::{ControlError, ControlResult};
use crate::events::{Event, EventListener, Listeners, ModelEvent};
use crate::info::Type;
use crate::loader::ClassLoader;
use crate::policy::{ActivationPolicy, CollectionPolicy, LifestylePolicy};
use crate::runtime::Runtime;
use crate::traits::Disposable;

mod context;

pub use context::ContextModel;

#[derive(Debug, Clone, Copy)]
struct Policies {
    activation: ActivationPolicy,
    lifestyle: LifestylePolicy,
    collection: CollectionPolicy,
}

/// Configuration of one component and its nested parts
#[derive(Clone)]
pub struct ComponentModel {
    inner: Arc<ModelInner>,
}

struct ModelInner {
    name: String,
    path: String,
    partition: String,
    directive: ComponentDirective,
    ty: Arc<Type>,
    classloader: ClassLoader,
    policies: RwLock<Policies>,
    context: ContextModel,
    parts: Vec<(String, ComponentModel)>,
    listeners: Listeners,
    runtime: Runtime,
    disposed: AtomicBool,
}

impl fmt::Debug for ComponentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policies = *self.inner.policies.read();
        f.debug_struct("ComponentModel")
            .field("path", &self.inner.path)
            .field("classname", &self.inner.ty.classname())
            .field("activation", &policies.activation)
            .field("lifestyle", &policies.lifestyle)
            .field("collection", &policies.collection)
            .field("parts", &self.part_keys())
            .finish()
    }
}

pub(crate) struct ModelParts {
    pub partition: String,
    pub directive: ComponentDirective,
    pub ty: Arc<Type>,
    pub classloader: ClassLoader,
    pub context: ContextModel,
    pub parts: Vec<(String, ComponentModel)>,
    pub runtime: Runtime,
}

impl ComponentModel {
    pub(crate) fn new(parts: ModelParts) -> ControlResult<Self> {
        let ModelParts {
            partition,
            directive,
            ty,
            classloader,
            context,
            parts,
            runtime,
        } = parts;

        let info = ty.info();
        let policies = Policies {
            activation: directive.activation.unwrap_or(info.activation),
            lifestyle: directive.lifestyle.unwrap_or(info.lifestyle),
            collection: directive.collection.unwrap_or(info.collection),
        };
        let path = format!("{}{}", partition, directive.name);

        for (i, (key, _)) in parts.iter().enumerate() {
            if parts[..i].iter().any(|(k, _)| k == key) {
                return Err(ControlError::DuplicatePart {
                    key: key.clone(),
                    path,
                });
            }
        }

        Ok(Self {
            inner: Arc::new(ModelInner {
                name: directive.name.clone(),
                path,
                partition,
                directive,
                ty,
                classloader,
                policies: RwLock::new(policies),
                context,
                parts,
                listeners: Listeners::default(),
                runtime,
                disposed: AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Slash-separated context path, unique within the partition.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn partition(&self) -> &str {
        &self.inner.partition
    }

    pub fn classname(&self) -> &str {
        self.inner.ty.classname()
    }

    pub fn component_type(&self) -> &Arc<Type> {
        &self.inner.ty
    }

    pub fn classloader(&self) -> &ClassLoader {
        &self.inner.classloader
    }

    pub fn classpath(&self) -> &Classpath {
        &self.inner.directive.classpath
    }

    pub fn directive(&self) -> &ComponentDirective {
        &self.inner.directive
    }

    pub fn categories(&self) -> &[CategoryDirective] {
        &self.inner.directive.categories
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn activation_policy(&self) -> ActivationPolicy {
        self.inner.policies.read().activation
    }

    pub fn lifestyle_policy(&self) -> LifestylePolicy {
        self.inner.policies.read().lifestyle
    }

    pub fn collection_policy(&self) -> CollectionPolicy {
        self.inner.policies.read().collection
    }

    pub fn set_activation_policy(&self, policy: ActivationPolicy) {
        let old = std::mem::replace(&mut self.inner.policies.write().activation, policy);
        self.changed("activation.policy", old.to_string(), policy.to_string());
    }

    /// Changes the lifestyle recorded in the model.
    ///
    /// Handlers select their holder when created, so the change applies to
    /// handlers created afterwards.
    pub fn set_lifestyle_policy(&self, policy: LifestylePolicy) {
        let old = std::mem::replace(&mut self.inner.policies.write().lifestyle, policy);
        self.changed("lifestyle.policy", old.to_string(), policy.to_string());
    }

    pub fn set_collection_policy(&self, policy: CollectionPolicy) {
        let old = std::mem::replace(&mut self.inner.policies.write().collection, policy);
        self.changed("collection.policy", old.to_string(), policy.to_string());
    }

    pub fn context_model(&self) -> &ContextModel {
        &self.inner.context
    }

    /// Sets or clears the directive of one context entry.
    ///
    /// The context model becomes dirty and is re-validated before the next
    /// provider is produced.
    pub fn set_entry_directive(&self, key: &str, directive: Option<EntryDirective>) {
        let describe = |d: &Option<EntryDirective>| d.as_ref().map(|d| d.kind()).unwrap_or("none").to_string();
        let new = describe(&directive);
        let old = self.inner.context.set_entry_directive(key, directive);
        self.changed(&format!("context.{}", key), describe(&old), new);
    }

    /// Validates the context model, clearing the dirty flag on success.
    pub fn validate(&self) -> ControlResult<()> {
        let issues = self.inner.context.validate();
        if issues.is_empty() {
            self.inner.context.mark_clean();
            Ok(())
        } else {
            Err(ControlError::Validation {
                path: self.inner.path.clone(),
                issues,
            })
        }
    }

    /// Part keys in declaration order.
    pub fn part_keys(&self) -> Vec<String> {
        self.inner.parts.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn part(&self, key: &str) -> Option<&ComponentModel> {
        self.inner.parts.iter().find(|(k, _)| k == key).map(|(_, m)| m)
    }

    pub fn parts(&self) -> &[(String, ComponentModel)] {
        &self.inner.parts
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.inner.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn EventListener>) {
        self.inner.listeners.remove(listener);
    }

    pub fn ptr_eq(&self, other: &ComponentModel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn changed(&self, feature: &str, old_value: String, new_value: String) {
        if old_value == new_value && !feature.starts_with("context.") {
            return;
        }
        let listeners = self.inner.listeners.snapshot();
        if listeners.is_empty() {
            return;
        }
        self.inner.runtime.publish(
            Event::Model(ModelEvent {
                path: self.inner.path.clone(),
                feature: feature.to_string(),
                old_value,
                new_value,
                timestamp: Utc::now(),
            }),
            listeners,
        );
    }
}

impl Disposable for ComponentModel {
    fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.listeners.clear();
        for (_, part) in &self.inner.parts {
            part.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}
