//! The component controller.
//!
//! [`ComponentController`] turns directives into component models, models
//! into handlers, and handlers' providers into instances. It also answers
//! context-entry requests from component contexts, in this order:
//!
//! 1. the requesting provider's own overrides
//! 2. the handler's [`ContextMap`](crate::ContextMap)
//! 3. the model's entry directive (literal value, service lookup or
//!    nested component)
//!
//! An entry with none of these is an error when required and absent
//! otherwise.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::directive::{ComponentDirective, EntryDirective, LookupDirective, ValueDirective};
use crate::error::{ControlError, ControlResult};
use crate::handler::{ComponentHandler, HandlerSettings};
use crate::info::{AnyArc, Arguments, EntryDescriptor};
use crate::invocation::{ComponentContext, Parts};
use crate::loader::{self, ClassLoader, Repository};
use crate::model::{ComponentModel, ContextModel, ModelParts};
use crate::provider::Provider;
use crate::runtime::Runtime;
use crate::service::Service;

mod value;

/// Factory for models, handlers and instances
#[derive(Clone)]
pub struct ComponentController {
    runtime: Runtime,
    repository: Arc<dyn Repository>,
}

impl fmt::Debug for ComponentController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentController").field("runtime", &self.runtime).finish()
    }
}

impl ComponentController {
    pub fn new(runtime: Runtime, repository: Arc<dyn Repository>) -> Self {
        Self { runtime, repository }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// Builds a validated model (and its part models) from a directive.
    ///
    /// The component's path is `partition` followed by the directive name;
    /// parts are created under `path + "/"`, keyed and named by their part
    /// key. Type-declared parts come before directive-declared parts.
    pub fn create_component_model(
        &self,
        anchor: &ClassLoader,
        directive: &ComponentDirective,
        partition: &str,
    ) -> ControlResult<ComponentModel> {
        let path = format!("{}{}", partition, directive.name);
        let classloader = loader::compose(anchor, &directive.classpath, self.repository.as_ref(), &path)?;
        let ty = self.runtime.type_loader().load_type(&classloader, &directive.classname)?;

        let directives: HashMap<String, EntryDirective> = directive
            .context
            .iter()
            .map(|entry| (entry.key.clone(), entry.directive.clone()))
            .collect();
        let context = ContextModel::new(ty.entries().to_vec(), directives);
        let issues = context.validate();
        if !issues.is_empty() {
            return Err(ControlError::Validation { path, issues });
        }

        let child_partition = format!("{}/", path);
        let mut keys = HashSet::new();
        let mut parts = Vec::new();
        for reference in ty.parts().iter().chain(directive.parts.iter()) {
            if !keys.insert(reference.key.as_str()) {
                return Err(ControlError::DuplicatePart {
                    key: reference.key.clone(),
                    path,
                });
            }
            let mut part = reference.directive.clone();
            part.name = reference.key.clone();
            let model = self
                .create_component_model(&classloader, &part, &child_partition)
                .map_err(|error| {
                    ControlError::controller(
                        format!("Unable to create the part [{}] in component [{}]", reference.key, path),
                        error,
                    )
                })?;
            parts.push((reference.key.clone(), model));
        }

        ComponentModel::new(ModelParts {
            partition: partition.to_string(),
            directive: directive.clone(),
            ty,
            classloader,
            context,
            parts,
            runtime: self.runtime.clone(),
        })
    }

    /// Creates a handler for `model`; child handlers are built lazily.
    ///
    /// A model whose class loader does not descend from `anchor` is given
    /// a freshly composed loader chain on top of it.
    pub fn create_component_handler(
        &self,
        parent: Option<&ComponentHandler>,
        anchor: &ClassLoader,
        model: &ComponentModel,
        managed: bool,
    ) -> ControlResult<ComponentHandler> {
        let classloader = if model.classloader().descends_from(anchor) {
            model.classloader().clone()
        } else {
            loader::compose(anchor, model.classpath(), self.repository.as_ref(), model.path())?
        };
        Ok(ComponentHandler::new(HandlerSettings {
            parent,
            classloader,
            model: model.clone(),
            controller: self.clone(),
            managed,
        }))
    }

    /// Instantiates the component behind `provider` through its single constructor.
    pub(crate) fn create_instance(&self, provider: &Provider) -> ControlResult<AnyArc> {
        let handler = provider.handler()?;
        let model = handler.model();
        let ty = model.component_type();
        let constructor = ty.constructor()?;

        let context = ComponentContext::new(provider, self.clone());
        let parts = Parts::new(handler.parts_manager().clone());
        let mut arguments = Arguments::default();
        for (position, kind) in constructor.parameters.iter().enumerate() {
            if !arguments.supply(kind, handler.logger(), &context, &parts) {
                return Err(ControlError::UnresolvedParameter {
                    component: model.path().to_string(),
                    classname: ty.classname().to_string(),
                    parameter: kind.to_string(),
                    position,
                    loader: handler.classloader().identity(),
                });
            }
        }

        let factory = constructor.factory.clone();
        handler
            .classloader()
            .with_context(|| factory(arguments))
            .map_err(|error| ControlError::invocation(model.path(), error))
    }

    /// Resolves a context entry for `provider`.
    ///
    /// Returns `Ok(None)` for an optional entry without any solution.
    pub fn get_context_value(&self, provider: &Provider, key: &str) -> ControlResult<Option<AnyArc>> {
        if let Some(value) = provider.context_override(key) {
            return Ok(Some(value));
        }
        let handler = provider.handler()?;
        if let Some(value) = handler.context_map().get(key) {
            return Ok(Some(value));
        }

        let model = handler.model();
        let context = model.context_model();
        let descriptor = context.descriptor(key);
        match context.entry_directive(key) {
            Some(EntryDirective::Value(directive)) => self.resolve_literal(&handler, descriptor, &directive).map(Some),
            Some(EntryDirective::Lookup(directive)) => self.resolve_lookup(&handler, &directive).map(Some),
            Some(EntryDirective::Component(directive)) => {
                self.resolve_component(provider, &handler, key, &directive).map(Some)
            }
            None => match descriptor {
                None => Err(ControlError::UnknownKey {
                    key: key.to_string(),
                    path: model.path().to_string(),
                }),
                Some(descriptor) if descriptor.required => Err(ControlError::NoSolution {
                    key: key.to_string(),
                    path: model.path().to_string(),
                }),
                Some(_) => Ok(None),
            },
        }
    }

    fn resolve_literal(
        &self,
        handler: &ComponentHandler,
        descriptor: Option<&EntryDescriptor>,
        directive: &ValueDirective,
    ) -> ControlResult<AnyArc> {
        let text = value::expand_symbols(&directive.value, handler.symbols());
        let target = directive
            .target
            .as_deref()
            .or_else(|| descriptor.map(|d| d.classname.as_str()))
            .unwrap_or("string");
        handler.classloader().with_context(|| value::convert(target, &text))
    }

    fn resolve_lookup(&self, handler: &ComponentHandler, directive: &LookupDirective) -> ControlResult<AnyArc> {
        let service: Service = directive.service.parse().map_err(|reason| ControlError::Value {
            value: directive.service.clone(),
            target: "service".to_string(),
            reason,
        })?;
        let parent = handler
            .parent()
            .ok_or_else(|| ControlError::ServiceNotFound(service.to_string()))?;
        let found = parent.lookup(&service)?;
        Ok(found.get_value(false)?.into_any())
    }

    fn resolve_component(
        &self,
        provider: &Provider,
        handler: &ComponentHandler,
        key: &str,
        directive: &ComponentDirective,
    ) -> ControlResult<AnyArc> {
        let nested = provider.nested_component(key, || {
            let mut directive = directive.clone();
            directive.name = key.to_string();
            // nested components sit under their owning provider, apart from the handler's parts
            let partition = format!("{}/#{}/", handler.path(), provider.id());
            let model = self.create_component_model(handler.classloader(), &directive, &partition)?;
            let child = self.create_component_handler(Some(handler), handler.classloader(), &model, true)?;
            if let Err(error) = child.commission() {
                crate::traits::Disposable::dispose(&child);
                return Err(error);
            }
            Ok(child)
        })?;
        Ok(nested.get_provider()?.get_value(false)?.into_any())
    }
}
