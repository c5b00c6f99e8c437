//! Values handed out by providers.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::info::{AnyArc, Type};
use crate::provider::{Provider, Status};

/// Interface views of one instance, keyed by service classname
pub(crate) type ServiceViews = Arc<HashMap<String, AnyArc>>;

/// Builds the views of `instance`, or `None` when any service lacks a view.
pub(crate) fn service_views(ty: &Type, instance: &AnyArc) -> Option<ServiceViews> {
    if !ty.is_proxy_capable() {
        return None;
    }
    let mut views = HashMap::new();
    for service in ty.services() {
        let view = service.view.as_ref()?;
        views.insert(service.classname.clone(), view(instance)?);
    }
    Some(Arc::new(views))
}

/// Isolating view over a component instance
///
/// Exposes only the services the component's type publishes, each through
/// its declared interface view. Callers holding a proxy cannot reach the
/// concrete implementation.
///
/// A proxy keeps its provider alive, so a held proxy is never reclaimed
/// under a weak or soft collection policy. Once the provider leaves
/// `Available` (its handler was decommissioned) the proxy hands out nothing.
#[derive(Clone)]
pub struct ServiceProxy {
    views: ServiceViews,
    provider: Provider,
}

impl fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy").field("services", &self.classnames()).finish()
    }
}

impl ServiceProxy {
    pub(crate) fn new(views: ServiceViews, provider: Provider) -> Self {
        Self { views, provider }
    }

    /// Returns the service published under `classname` as its interface type.
    ///
    /// `T` is the interface the service view was declared with, typically a
    /// trait object such as `dyn Greeter`.
    pub fn service<T>(&self, classname: &str) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if self.provider.status() != Status::Available {
            return None;
        }
        self.views
            .get(classname)?
            .downcast_ref::<Arc<T>>()
            .cloned()
    }

    /// The provider backing this proxy.
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn classnames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.views.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Result of [`Provider::get_value`](crate::Provider::get_value)
#[derive(Clone)]
pub enum ComponentValue {
    /// The raw instance
    Instance(AnyArc),
    /// An isolating proxy over the instance
    Proxy(ServiceProxy),
}

impl fmt::Debug for ComponentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentValue::Instance(_) => f.write_str("Instance(..)"),
            ComponentValue::Proxy(proxy) => f.debug_tuple("Proxy").field(proxy).finish(),
        }
    }
}

impl ComponentValue {
    pub fn is_proxy(&self) -> bool {
        matches!(self, ComponentValue::Proxy(_))
    }

    /// Downcasts the raw instance. Always `None` for an isolated value.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            ComponentValue::Instance(instance) => instance.clone().downcast::<T>().ok(),
            ComponentValue::Proxy(_) => None,
        }
    }

    /// Returns a published service by its interface type.
    ///
    /// Works for proxies only; raw instances are reached via [`downcast`](Self::downcast).
    pub fn service<T>(&self, classname: &str) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self {
            ComponentValue::Proxy(proxy) => proxy.service(classname),
            ComponentValue::Instance(_) => None,
        }
    }

    /// Type-erased form; a proxy is returned as an `Arc<ServiceProxy>`.
    pub fn into_any(self) -> AnyArc {
        match self {
            ComponentValue::Instance(instance) => instance,
            ComponentValue::Proxy(proxy) => Arc::new(proxy),
        }
    }
}
