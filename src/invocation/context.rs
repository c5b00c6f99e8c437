//! Context entry access for component constructors.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::{decapitalize, Argument, Reply};
use crate::control::ComponentController;
use crate::error::{ControlError, ControlResult};
use crate::info::AnyArc;
use crate::provider::{Provider, WeakProvider};

/// Resolves the context entries of one provider
///
/// Handed to constructors declaring a `Context` parameter. The context
/// refers to its provider weakly; values are resolved on every call, so
/// overrides put in place after construction are observed.
#[derive(Clone)]
pub struct ComponentContext {
    provider: WeakProvider,
    path: Arc<str>,
    controller: ComponentController,
}

impl fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContext").field("path", &self.path).finish()
    }
}

impl ComponentContext {
    pub(crate) fn new(provider: &Provider, controller: ComponentController) -> Self {
        Self {
            provider: provider.downgrade(),
            path: Arc::from(provider.path()),
            controller,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn provider(&self) -> ControlResult<Provider> {
        self.provider
            .upgrade()
            .ok_or_else(|| ControlError::IllegalState(format!("provider of [{}] is gone", self.path)))
    }

    /// Keys declared by the component type.
    pub fn keys(&self) -> ControlResult<Vec<String>> {
        let handler = self.provider()?.handler()?;
        Ok(handler.model().context_model().keys())
    }

    /// Resolves an entry; `None` when an optional entry has no solution.
    pub fn get(&self, key: &str) -> ControlResult<Option<AnyArc>> {
        let provider = self.provider()?;
        self.controller.get_context_value(&provider, key)
    }

    /// Resolves an entry, falling back to `default` when it has no solution.
    pub fn get_or(&self, key: &str, default: AnyArc) -> ControlResult<AnyArc> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Resolves an entry that must be present and of type `T`.
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> ControlResult<Arc<T>> {
        let value = self.get(key)?.ok_or_else(|| ControlError::NoSolution {
            key: key.to_string(),
            path: self.path.to_string(),
        })?;
        value.downcast::<T>().map_err(|_| ControlError::Value {
            value: key.to_string(),
            target: std::any::type_name::<T>().to_string(),
            reason: "context value has a different type".to_string(),
        })
    }

    pub fn get_string(&self, key: &str) -> ControlResult<String> {
        self.get_as::<String>(key).map(|s| s.as_ref().clone())
    }

    pub fn get_i64(&self, key: &str) -> ControlResult<i64> {
        self.get_as::<i64>(key).map(|v| *v)
    }

    pub fn get_bool(&self, key: &str) -> ControlResult<bool> {
        self.get_as::<bool>(key).map(|v| *v)
    }

    /// Dispatches an accessor by name; see [`ContextInvocationHandler`].
    pub fn invoke(&self, method: &str, args: &[Argument]) -> ControlResult<Reply> {
        ContextInvocationHandler::new(self.clone()).invoke(method, args)
    }
}

/// Name-based dispatch over a [`ComponentContext`]
///
/// `get<Key>()` resolves the entry `key` (first letter lowercased).
/// `get<Key>(default)` returns `default` when the entry has no solution.
/// Any other method name is rejected.
pub struct ContextInvocationHandler {
    context: ComponentContext,
}

impl ContextInvocationHandler {
    pub fn new(context: ComponentContext) -> Self {
        Self { context }
    }

    pub fn invoke(&self, method: &str, args: &[Argument]) -> ControlResult<Reply> {
        let key = match method.strip_prefix("get") {
            Some(rest) if !rest.is_empty() => decapitalize(rest),
            _ => return Err(ControlError::NoSuchMethod(format!("{}#{}", self.context.path(), method))),
        };
        match (self.context.get(&key)?, args) {
            (Some(value), _) => Ok(Reply::Value(Some(value))),
            (None, [default]) => Ok(Reply::Value(Some(default.clone().into_any()))),
            (None, []) => Err(ControlError::NoSolution {
                key,
                path: self.context.path().to_string(),
            }),
            (None, _) => Err(ControlError::NoSuchMethod(format!(
                "{}#{} with {} arguments",
                self.context.path(),
                method,
                args.len()
            ))),
        }
    }
}
