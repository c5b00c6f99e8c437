//! Component type metadata.
//!
//! A [`Type`] is the runtime's view of one implementation class: the
//! services it publishes, the context entries it consumes, its default
//! policies, its state graph, its constructors and the lifecycle methods
//! the state machine may invoke. Types are assembled once with
//! [`TypeBuilder`], published inside an artifact and cached by the type
//! loader.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::directive::PartReference;
use crate::error::{BoxError, ControlError, ControlResult};
use crate::invocation::{ComponentContext, Parts};
use crate::logging::Logger;
use crate::policy::{ActivationPolicy, CollectionPolicy, LifestylePolicy};
use crate::service::Version;

pub mod state;

pub use state::{Operation, State, StateGraph, Transition, Trigger};

/// Type-erased shared instance
pub type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type Factory = Arc<dyn Fn(Arguments) -> Result<AnyArc, BoxError> + Send + Sync>;
pub(crate) type LifecycleMethod = Arc<dyn Fn(&AnyArc) -> Result<(), BoxError> + Send + Sync>;
pub(crate) type ValueParser = Arc<dyn Fn(&str) -> Result<AnyArc, BoxError> + Send + Sync>;
pub(crate) type ServiceView = Arc<dyn Fn(&AnyArc) -> Option<AnyArc> + Send + Sync>;

/// Constructor parameter kinds the runtime knows how to supply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    /// Component logging channel
    Logger,
    /// Context entry accessor
    Context,
    /// Child part accessor
    Parts,
    /// Anything else; always unresolvable
    Other(String),
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKind::Logger => f.write_str("Logger"),
            ParameterKind::Context => f.write_str("Context"),
            ParameterKind::Parts => f.write_str("Parts"),
            ParameterKind::Other(name) => f.write_str(name),
        }
    }
}

/// Arguments handed to a component constructor
#[derive(Default)]
pub struct Arguments {
    logger: Option<Logger>,
    context: Option<ComponentContext>,
    parts: Option<Parts>,
}

impl Arguments {
    pub(crate) fn supply(&mut self, kind: &ParameterKind, logger: &Logger, context: &ComponentContext, parts: &Parts) -> bool {
        match kind {
            ParameterKind::Logger => self.logger = Some(logger.clone()),
            ParameterKind::Context => self.context = Some(context.clone()),
            ParameterKind::Parts => self.parts = Some(parts.clone()),
            ParameterKind::Other(_) => return false,
        }
        true
    }

    pub fn logger(&self) -> Option<&Logger> {
        self.logger.as_ref()
    }

    pub fn context(&self) -> Option<&ComponentContext> {
        self.context.as_ref()
    }

    pub fn parts(&self) -> Option<&Parts> {
        self.parts.as_ref()
    }

    /// Takes the context accessor, failing when the constructor did not declare one.
    pub fn take_context(&mut self) -> Result<ComponentContext, BoxError> {
        self.context.take().ok_or_else(|| "constructor did not declare a Context parameter".into())
    }

    /// Takes the parts accessor, failing when the constructor did not declare one.
    pub fn take_parts(&mut self) -> Result<Parts, BoxError> {
        self.parts.take().ok_or_else(|| "constructor did not declare a Parts parameter".into())
    }

    /// Takes the logger, failing when the constructor did not declare one.
    pub fn take_logger(&mut self) -> Result<Logger, BoxError> {
        self.logger.take().ok_or_else(|| "constructor did not declare a Logger parameter".into())
    }
}

/// One public constructor: declared parameter kinds plus a factory
#[derive(Clone)]
pub struct Constructor {
    pub parameters: Vec<ParameterKind>,
    pub(crate) factory: Factory,
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor").field("parameters", &self.parameters).finish()
    }
}

/// A service published by a type
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub classname: String,
    pub version: Option<Version>,
    pub(crate) view: Option<ServiceView>,
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("classname", &self.classname)
            .field("version", &self.version)
            .field("interface", &self.view.is_some())
            .finish()
    }
}

impl ServiceDescriptor {
    pub fn new(classname: impl Into<String>) -> Self {
        Self {
            classname: classname.into(),
            version: None,
            view: None,
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Declares the service as an interface by supplying its typed view.
    ///
    /// Providers of a type whose services all carry a view build a service
    /// proxy; isolated values are then handed out through those views.
    pub fn view<C, T, F>(mut self, f: F) -> Self
    where
        C: Any + Send + Sync,
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static,
    {
        self.view = Some(Arc::new(move |instance: &AnyArc| {
            let concrete = instance.clone().downcast::<C>().ok()?;
            Some(Arc::new(f(concrete)) as AnyArc)
        }));
        self
    }

    /// True when the service carries an interface view.
    pub fn is_interface(&self) -> bool {
        self.view.is_some()
    }
}

/// A context entry consumed by a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescriptor {
    pub key: String,
    pub classname: String,
    pub required: bool,
}

impl EntryDescriptor {
    pub fn required(key: impl Into<String>, classname: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            classname: classname.into(),
            required: true,
        }
    }

    pub fn optional(key: impl Into<String>, classname: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            classname: classname.into(),
            required: false,
        }
    }
}

/// Type-level naming and policy defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoDescriptor {
    pub name: String,
    pub version: Option<Version>,
    pub activation: ActivationPolicy,
    pub lifestyle: LifestylePolicy,
    pub collection: CollectionPolicy,
}

/// Reflected metadata for one implementation class
pub struct Type {
    classname: String,
    info: InfoDescriptor,
    services: Vec<ServiceDescriptor>,
    entries: Vec<EntryDescriptor>,
    parts: Vec<PartReference>,
    graph: Arc<StateGraph>,
    constructors: Vec<Constructor>,
    methods: HashMap<String, LifecycleMethod>,
    value_parser: Option<ValueParser>,
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("classname", &self.classname)
            .field("info", &self.info)
            .field("services", &self.services)
            .field("entries", &self.entries)
            .field("parts", &self.parts.len())
            .field("constructors", &self.constructors)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Type {
    pub fn builder(classname: impl Into<String>) -> TypeBuilder {
        TypeBuilder::new(classname)
    }

    pub fn classname(&self) -> &str {
        &self.classname
    }

    pub fn info(&self) -> &InfoDescriptor {
        &self.info
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn entries(&self) -> &[EntryDescriptor] {
        &self.entries
    }

    pub fn entry(&self, key: &str) -> Option<&EntryDescriptor> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn parts(&self) -> &[PartReference] {
        &self.parts
    }

    pub fn state_graph(&self) -> &Arc<StateGraph> {
        &self.graph
    }

    pub fn constructors(&self) -> &[Constructor] {
        &self.constructors
    }

    /// Returns the single public constructor.
    pub fn constructor(&self) -> ControlResult<&Constructor> {
        match self.constructors.as_slice() {
            [only] => Ok(only),
            [] => Err(ControlError::NoConstructor(self.classname.clone())),
            many => Err(ControlError::AmbiguousConstructor {
                classname: self.classname.clone(),
                count: many.len(),
            }),
        }
    }

    pub(crate) fn method(&self, name: &str) -> Option<&LifecycleMethod> {
        self.methods.get(name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub(crate) fn value_parser(&self) -> Option<&ValueParser> {
        self.value_parser.as_ref()
    }

    /// True when every published service is an interface.
    ///
    /// A type without services has nothing to proxy and reports false.
    pub fn is_proxy_capable(&self) -> bool {
        !self.services.is_empty() && self.services.iter().all(ServiceDescriptor::is_interface)
    }
}

/// Builder for [`Type`]
///
/// # Examples
///
/// ```rust
/// use ferrous_metro::{EntryDescriptor, LifestylePolicy, ParameterKind, Type};
///
/// struct Greeter {
///     name: String,
/// }
///
/// let ty = Type::builder("acme.Greeter")
///     .lifestyle(LifestylePolicy::Singleton)
///     .entry(EntryDescriptor::required("name", "string"))
///     .constructor(vec![ParameterKind::Context], |mut args| {
///         let context = args.take_context()?;
///         Ok(Greeter { name: context.get_string("name")? })
///     })
///     .build();
///
/// assert_eq!(ty.info().name, "greeter");
/// assert!(ty.constructor().is_ok());
/// ```
pub struct TypeBuilder {
    classname: String,
    info: InfoDescriptor,
    services: Vec<ServiceDescriptor>,
    entries: Vec<EntryDescriptor>,
    parts: Vec<PartReference>,
    graph: StateGraph,
    constructors: Vec<Constructor>,
    methods: HashMap<String, LifecycleMethod>,
    value_parser: Option<ValueParser>,
}

impl TypeBuilder {
    pub fn new(classname: impl Into<String>) -> Self {
        let classname = classname.into();
        let name = classname.rsplit('.').next().unwrap_or(&classname).to_ascii_lowercase();
        Self {
            info: InfoDescriptor {
                name,
                version: None,
                activation: ActivationPolicy::System,
                lifestyle: LifestylePolicy::Singleton,
                collection: CollectionPolicy::System,
            },
            classname,
            services: Vec::new(),
            entries: Vec::new(),
            parts: Vec::new(),
            graph: StateGraph::default(),
            constructors: Vec::new(),
            methods: HashMap::new(),
            value_parser: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.info.version = Some(version);
        self
    }

    pub fn activation(mut self, policy: ActivationPolicy) -> Self {
        self.info.activation = policy;
        self
    }

    pub fn lifestyle(mut self, policy: LifestylePolicy) -> Self {
        self.info.lifestyle = policy;
        self
    }

    pub fn collection(mut self, policy: CollectionPolicy) -> Self {
        self.info.collection = policy;
        self
    }

    pub fn service(mut self, service: ServiceDescriptor) -> Self {
        self.services.push(service);
        self
    }

    pub fn entry(mut self, entry: EntryDescriptor) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn part(mut self, part: PartReference) -> Self {
        self.parts.push(part);
        self
    }

    pub fn states(mut self, graph: StateGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Declares a public constructor.
    pub fn constructor<T, F>(mut self, parameters: Vec<ParameterKind>, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Arguments) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.constructors.push(Constructor {
            parameters,
            factory: Arc::new(move |args: Arguments| factory(args).map(|instance| Arc::new(instance) as AnyArc)),
        });
        self
    }

    /// Declares a lifecycle method the state machine may invoke.
    pub fn method<C, F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(&C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        let label = name.clone();
        self.methods.insert(
            name,
            Arc::new(move |instance: &AnyArc| match instance.downcast_ref::<C>() {
                Some(concrete) => method(concrete),
                None => Err(format!("instance does not implement method [{}]", label).into()),
            }),
        );
        self
    }

    /// Marks the type as a value type parsed from literal context values.
    pub fn value_parser<T, F>(mut self, parser: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&str) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.value_parser = Some(Arc::new(move |text: &str| parser(text).map(|v| Arc::new(v) as AnyArc)));
        self
    }

    pub fn build(self) -> Type {
        Type {
            classname: self.classname,
            info: self.info,
            services: self.services,
            entries: self.entries,
            parts: self.parts,
            graph: Arc::new(self.graph),
            constructors: self.constructors,
            methods: self.methods,
            value_parser: self.value_parser,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Widget;

    impl Named for Widget {
        fn name(&self) -> &str {
            "widget"
        }
    }

    #[test]
    fn test_constructor_cardinality() {
        let none = Type::builder("acme.None").build();
        assert!(matches!(none.constructor(), Err(ControlError::NoConstructor(_))));

        let two = Type::builder("acme.Two")
            .constructor(vec![], |_| Ok(Widget))
            .constructor(vec![ParameterKind::Logger], |_| Ok(Widget))
            .build();
        assert!(matches!(
            two.constructor(),
            Err(ControlError::AmbiguousConstructor { count: 2, .. })
        ));
    }

    #[test]
    fn test_service_view_produces_trait_object() {
        let service = ServiceDescriptor::new("acme.Named").view(|w: Arc<Widget>| w as Arc<dyn Named>);
        let instance: AnyArc = Arc::new(Widget);
        let view = (service.view.as_ref().unwrap())(&instance).unwrap();
        let named = view.downcast::<Arc<dyn Named>>().unwrap();
        assert_eq!(named.name(), "widget");
    }

    #[test]
    fn test_proxy_capability_requires_all_interfaces() {
        let mixed = Type::builder("acme.Mixed")
            .service(ServiceDescriptor::new("acme.Named").view(|w: Arc<Widget>| w as Arc<dyn Named>))
            .service(ServiceDescriptor::new("acme.Widget"))
            .build();
        assert!(!mixed.is_proxy_capable());
        assert!(!Type::builder("acme.Bare").build().is_proxy_capable());
    }

    #[test]
    fn test_method_rejects_foreign_instance() {
        let ty = Type::builder("acme.Widget").method("poke", |_: &Widget| Ok(())).build();
        let foreign: AnyArc = Arc::new(5u8);
        assert!((ty.method("poke").unwrap())(&foreign).is_err());
        let own: AnyArc = Arc::new(Widget);
        assert!((ty.method("poke").unwrap())(&own).is_ok());
    }
}
