//! Part access for component constructors.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::{decapitalize, Argument, Reply};
use crate::error::{ControlError, ControlResult};
use crate::handler::{ComponentHandler, ContextMap};
use crate::parts::PartsManager;
use crate::provider::{ComponentValue, Provider};

/// Accessor over a component's parts
///
/// Handed to constructors declaring a `Parts` parameter.
#[derive(Clone)]
pub struct Parts {
    manager: Arc<PartsManager>,
}

impl fmt::Debug for Parts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parts").field("keys", &self.keys()).finish()
    }
}

impl Parts {
    pub(crate) fn new(manager: Arc<PartsManager>) -> Self {
        Self { manager }
    }

    /// Part keys in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.manager.keys()
    }

    pub fn handler(&self, key: &str) -> ControlResult<ComponentHandler> {
        self.manager.handler(key)
    }

    pub fn provider(&self, key: &str) -> ControlResult<Provider> {
        self.handler(key)?.get_provider()
    }

    /// The part's value, isolated behind its service proxy when requested.
    pub fn value(&self, key: &str, isolate: bool) -> ControlResult<ComponentValue> {
        self.provider(key)?.get_value(isolate)
    }

    /// The part's raw instance as `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> ControlResult<Arc<T>> {
        self.provider(key)?.instance::<T>()
    }

    pub fn context_map(&self, key: &str) -> ControlResult<ContextMap> {
        Ok(self.handler(key)?.context_map().clone())
    }

    /// Dispatches an accessor by name; see [`PartsInvocationHandler`].
    pub fn invoke(&self, method: &str, args: &[Argument]) -> ControlResult<Reply> {
        PartsInvocationHandler::new(self.clone()).invoke(method, args)
    }
}

enum Accessor {
    Value,
    Component,
    Provider,
    Handler,
    Map,
}

const SUFFIXES: [(&str, Accessor); 5] = [
    ("Component", Accessor::Component),
    ("Provider", Accessor::Provider),
    ("Manager", Accessor::Handler),
    ("Handler", Accessor::Handler),
    ("Map", Accessor::Map),
];

/// Name-based dispatch over [`Parts`]
///
/// | method | result |
/// |---|---|
/// | `get<Key>()` / `get<Key>(isolate)` | the part's value |
/// | `get<Key>Component()` | the part's handler |
/// | `get<Key>Handler()`, `get<Key>Manager()` | the part's handler |
/// | `get<Key>Provider()` | a provider from the part's handler |
/// | `get<Key>Map()` | the part's context map |
/// | `release<Key>(value)` | no-op |
pub struct PartsInvocationHandler {
    parts: Parts,
}

impl PartsInvocationHandler {
    pub fn new(parts: Parts) -> Self {
        Self { parts }
    }

    pub fn invoke(&self, method: &str, args: &[Argument]) -> ControlResult<Reply> {
        if let Some(rest) = method.strip_prefix("release") {
            if !rest.is_empty() {
                if args.len() != 1 {
                    return Err(ControlError::NoSuchMethod(format!(
                        "illegal number of parameters supplied to [{}]",
                        method
                    )));
                }
                return Ok(Reply::Unit);
            }
        }
        let Some(rest) = method.strip_prefix("get").filter(|r| !r.is_empty()) else {
            return Err(ControlError::NoSuchMethod(method.to_string()));
        };

        let (name, accessor) = SUFFIXES
            .iter()
            .find_map(|(suffix, accessor)| {
                rest.strip_suffix(suffix)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name, accessor))
            })
            .unwrap_or((rest, &Accessor::Value));
        let key = decapitalize(name);

        match accessor {
            Accessor::Value => {
                let isolate = match args {
                    [] => false,
                    [Argument::Bool(flag)] => *flag,
                    [_] => {
                        return Err(ControlError::NoSuchMethod(format!(
                            "part accessor parameter type not supported in [{}]",
                            method
                        )))
                    }
                    _ => {
                        return Err(ControlError::NoSuchMethod(format!("illegal number of parameters in [{}]", method)))
                    }
                };
                Ok(Reply::Component(self.parts.value(&key, isolate)?))
            }
            Accessor::Component | Accessor::Handler => Ok(Reply::Handler(self.parts.handler(&key)?)),
            Accessor::Provider => Ok(Reply::Provider(self.parts.provider(&key)?)),
            Accessor::Map => Ok(Reply::Map(self.parts.context_map(&key)?)),
        }
    }
}
