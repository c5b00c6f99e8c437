//! # ferrous-metro
//!
//! A component lifecycle runtime: declarative directives are resolved into
//! component models, models are hosted by handlers, and handlers hand out
//! providers owning live component instances wired through constructor
//! injection.
//!
//! ## Features
//!
//! - **Directive-driven models**: classpath composition, type loading and
//!   context validation before anything is instantiated
//! - **Lifestyles**: singleton, transient and per-thread instances, with
//!   hard, soft or weak retention of singletons
//! - **Ordered commissioning**: startup parts start in declaration order,
//!   stop in reverse, and roll back on failure
//! - **Context and parts injection**: literal values with `${symbol}`
//!   expansion, service lookups through the parent chain, nested components
//! - **Declarative state machines**: initialization and termination
//!   triggers, transitions and operations bound to component methods
//! - **Events and observers**: asynchronous model/state/status events and
//!   synchronous lifecycle observers
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use ferrous_metro::{
//!     Artifact, Classpath, ComponentDirective, ControlError, Controller, EntryDescriptor,
//!     LifestylePolicy, MemoryRepository, ParameterKind, Type,
//! };
//!
//! struct Store {
//!     location: String,
//! }
//!
//! let repository = Arc::new(MemoryRepository::new());
//! repository.add_artifact(Artifact::new("artifact:store").with_type(
//!     Type::builder("acme.Store")
//!         .lifestyle(LifestylePolicy::Singleton)
//!         .entry(EntryDescriptor::required("location", "string"))
//!         .constructor(vec![ParameterKind::Context], |mut args| {
//!             let context = args.take_context()?;
//!             Ok(Store { location: context.get_string("location")? })
//!         })
//!         .build(),
//! ));
//! let controller = Controller::new(repository);
//!
//! // a required entry without a directive fails validation
//! let bare = ComponentDirective::new("store", "acme.Store").classpath(Classpath::private("artifact:store"));
//! assert!(matches!(controller.create_model_from(&bare), Err(ControlError::Validation { .. })));
//!
//! let directive = bare.value("location", "${work}/${name}");
//! let component = controller.create_component_from(&directive).unwrap();
//! component.commission().unwrap();
//!
//! let store = component.get_provider().unwrap().instance::<Store>().unwrap();
//! assert!(store.location.ends_with("/store"));
//! component.decommission();
//! ```
//!
//! ## Lifecycle
//!
//! Handlers move `Inactive -> Commissioning -> Active -> Decommissioning ->
//! Inactive`; providers move strictly forward through `Instantiated ->
//! Commissioning -> Available -> Decommissioning -> Disposed`. Construction
//! errors surface as [`ControlError`]; teardown errors are logged through
//! `tracing` and absorbed.

pub mod cancellation;
pub mod commissioner;
pub mod config;
pub mod control;
pub mod controller;
pub mod directive;
pub mod error;
pub mod events;
pub mod handler;
pub mod info;
pub mod invocation;
pub mod loader;
pub mod logging;
pub mod machine;
pub mod model;
pub mod observer;
pub mod parts;
pub mod policy;
pub mod provider;
pub mod runtime;
pub mod service;
pub mod traits;
pub mod type_loader;

// Internal modules
mod internal;

pub use cancellation::CancellationToken;
pub use commissioner::{Commissioner, Outcome};
pub use config::{
    ConfigProvider, ConfigSource, ConfigValue, EnvironmentConfigSource, JsonConfigSource, MapConfigSource,
    RuntimeConfig,
};
pub use control::ComponentController;
pub use controller::{Controller, ControllerBuilder};
pub use directive::{
    Category, CategoryDirective, Classpath, ComponentDirective, ContextEntry, EntryDirective, LookupDirective,
    PartReference, ValueDirective,
};
pub use error::{BoxError, ControlError, ControlResult};
pub use events::{Event, EventListener, EventQueue, ModelEvent, StateEvent, StatusEvent};
pub use handler::{ComponentHandler, ContextMap, HandlerState};
pub use info::{
    AnyArc, Arguments, Constructor, EntryDescriptor, InfoDescriptor, Operation, ParameterKind, ServiceDescriptor,
    State, StateGraph, Transition, Trigger, Type, TypeBuilder,
};
pub use invocation::{Argument, ComponentContext, ContextInvocationHandler, Parts, PartsInvocationHandler, Reply};
pub use loader::{compose, Artifact, ClassLoader, MemoryRepository, Repository};
pub use logging::{category_for_path, Logger, LoggingLevels};
pub use machine::StateInfo;
pub use model::{ComponentModel, ContextModel};
pub use observer::{LifecycleObserver, LoggingObserver, RecordingObserver};
pub use parts::PartsManager;
pub use policy::{ActivationPolicy, CollectionPolicy, LifestylePolicy, Priority};
pub use provider::{ComponentValue, Provider, ServiceProxy, Status};
pub use runtime::Runtime;
pub use service::{Service, Version};
pub use traits::{Commissionable, Disposable};
pub use type_loader::TypeLoader;
