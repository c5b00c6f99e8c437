//! Constructor-injected accessors and dynamic dispatch.
//!
//! Components receive a [`ComponentContext`] for their context entries and
//! a [`Parts`] accessor for their children. Both also support name-based
//! dispatch ([`ComponentContext::invoke`], [`Parts::invoke`]) following the
//! accessor conventions `get<Key>` and `get<Key>Component`,
//! `get<Key>Provider`, `get<Key>Handler`, `get<Key>Manager`,
//! `get<Key>Map` and `release<Key>`.

use std::fmt;
use std::sync::Arc;

use crate::handler::{ComponentHandler, ContextMap};
use crate::info::AnyArc;
use crate::provider::{ComponentValue, Provider};

mod context;
mod parts;

pub use context::{ComponentContext, ContextInvocationHandler};
pub use parts::{Parts, PartsInvocationHandler};

/// Argument to a dynamically dispatched accessor
#[derive(Clone)]
pub enum Argument {
    Bool(bool),
    Value(AnyArc),
}

impl Argument {
    pub(crate) fn into_any(self) -> AnyArc {
        match self {
            Argument::Bool(flag) => Arc::new(flag),
            Argument::Value(value) => value,
        }
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Bool(flag) => f.debug_tuple("Bool").field(flag).finish(),
            Argument::Value(_) => f.write_str("Value(..)"),
        }
    }
}

/// Result of a dynamically dispatched accessor
#[derive(Clone)]
pub enum Reply {
    Unit,
    Value(Option<AnyArc>),
    Component(ComponentValue),
    Handler(ComponentHandler),
    Provider(Provider),
    Map(ContextMap),
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Unit => f.write_str("Unit"),
            Reply::Value(value) => f.debug_tuple("Value").field(&value.is_some()).finish(),
            Reply::Component(value) => f.debug_tuple("Component").field(value).finish(),
            Reply::Handler(handler) => f.debug_tuple("Handler").field(&handler.path()).finish(),
            Reply::Provider(provider) => f.debug_tuple("Provider").field(provider).finish(),
            Reply::Map(map) => f.debug_tuple("Map").field(map).finish(),
        }
    }
}

/// Lowercases the first character of an accessor key.
///
/// Acronym keys whose first two characters are uppercase (`URL`) are kept as-is.
fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && second.is_uppercase() => name.to_string(),
        (Some(first), _) => first.to_lowercase().chain(name[first.len_utf8()..].chars()).collect(),
        (None, _) => String::new(),
    }
}
