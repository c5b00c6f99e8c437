//! Entry point for hosting components.
//!
//! A [`Controller`] ties a [`Runtime`], a [`Repository`] and an anchor
//! class loader together and exposes the top-level operations: load a
//! directive, build a model from it, and create a component handler for
//! that model.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use ferrous_metro::{
//!     Artifact, Classpath, ComponentDirective, Controller, EntryDescriptor, MemoryRepository,
//!     ParameterKind, Type,
//! };
//!
//! struct Greeter {
//!     name: String,
//! }
//!
//! let repository = Arc::new(MemoryRepository::new());
//! repository.add_artifact(Artifact::new("artifact:greeter").with_type(
//!     Type::builder("acme.Greeter")
//!         .entry(EntryDescriptor::required("name", "string"))
//!         .constructor(vec![ParameterKind::Context], |mut args| {
//!             let context = args.take_context()?;
//!             Ok(Greeter { name: context.get_string("name")? })
//!         })
//!         .build(),
//! ));
//!
//! let controller = Controller::builder().repository(repository).build();
//! let directive = ComponentDirective::new("greeter", "acme.Greeter")
//!     .classpath(Classpath::private("artifact:greeter"))
//!     .value("name", "demo");
//!
//! let component = controller.create_component_from(&directive).unwrap();
//! let greeter = component.get_provider().unwrap().instance::<Greeter>().unwrap();
//! assert_eq!(greeter.name, "demo");
//! ```

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::{ConfigProvider, RuntimeConfig};
use crate::control::ComponentController;
use crate::directive::ComponentDirective;
use crate::error::{ControlError, ControlResult};
use crate::handler::{ComponentHandler, HandlerInner};
use crate::loader::{ClassLoader, MemoryRepository, Repository};
use crate::model::ComponentModel;
use crate::observer::LifecycleObserver;
use crate::runtime::Runtime;
use crate::traits::Disposable;

/// Builder for [`Controller`]
#[derive(Default)]
pub struct ControllerBuilder {
    config: Option<RuntimeConfig>,
    repository: Option<Arc<dyn Repository>>,
    observers: Vec<Arc<dyn LifecycleObserver>>,
    anchor: Option<ClassLoader>,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Resolves the runtime configuration from a config provider.
    pub fn config_provider(mut self, provider: &ConfigProvider) -> ControlResult<Self> {
        self.config = Some(RuntimeConfig::load(provider)?);
        Ok(self)
    }

    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Loader every top-level component's chain is composed on.
    pub fn anchor(mut self, anchor: ClassLoader) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn build(self) -> Controller {
        let runtime = Runtime::with_observers(self.config.unwrap_or_default(), self.observers);
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(MemoryRepository::new()) as Arc<dyn Repository>);
        Controller {
            components: ComponentController::new(runtime.clone(), repository.clone()),
            anchor: self.anchor.unwrap_or_else(|| ClassLoader::root("system")),
            runtime,
            repository,
            roots: Mutex::new(Vec::new()),
        }
    }
}

/// Hosts top-level components
pub struct Controller {
    runtime: Runtime,
    repository: Arc<dyn Repository>,
    components: ComponentController,
    anchor: ClassLoader,
    roots: Mutex<Vec<Weak<HandlerInner>>>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("runtime", &self.runtime)
            .field("anchor", &self.anchor.identity())
            .finish()
    }
}

impl Controller {
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    /// Controller with default configuration over `repository`.
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self::builder().repository(repository).build()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn component_controller(&self) -> &ComponentController {
        &self.components
    }

    pub fn anchor(&self) -> &ClassLoader {
        &self.anchor
    }

    /// Loads a directive from the repository, or else from a JSON document.
    ///
    /// `uri` may be a `file:` URI or a plain filesystem path.
    pub fn load_directive(&self, uri: &str) -> ControlResult<ComponentDirective> {
        if let Some(directive) = self.repository.directive(uri) {
            return Ok(directive);
        }
        let path = uri.strip_prefix("file://").or_else(|| uri.strip_prefix("file:")).unwrap_or(uri);
        let document = std::fs::read_to_string(Path::new(path))?;
        let directive: ComponentDirective = serde_json::from_str(&document)?;
        tracing::debug!(uri, name = %directive.name, "loaded component directive");
        Ok(directive)
    }

    pub fn create_model(&self, uri: &str) -> ControlResult<ComponentModel> {
        let directive = self.load_directive(uri)?;
        self.create_model_from(&directive)
    }

    /// Builds a top-level model under the configured partition.
    pub fn create_model_from(&self, directive: &ComponentDirective) -> ControlResult<ComponentModel> {
        self.components
            .create_component_model(&self.anchor, directive, &self.runtime.config().partition)
    }

    /// Creates a top-level component that owns its model.
    pub fn create_component(&self, uri: &str) -> ControlResult<ComponentHandler> {
        let model = self.create_model(uri)?;
        self.create_root(&model, true)
    }

    /// Creates a top-level component that owns its model.
    pub fn create_component_from(&self, directive: &ComponentDirective) -> ControlResult<ComponentHandler> {
        let model = self.create_model_from(directive)?;
        self.create_root(&model, true)
    }

    /// Creates a top-level component for a caller-owned model.
    pub fn create_component_from_model(&self, model: &ComponentModel) -> ControlResult<ComponentHandler> {
        self.create_root(model, false)
    }

    /// Registers a new top-level component; its path must not be taken by a live root.
    fn create_root(&self, model: &ComponentModel, managed: bool) -> ControlResult<ComponentHandler> {
        let mut roots = self.roots.lock();
        roots.retain(|r| r.strong_count() > 0);
        let taken = roots
            .iter()
            .filter_map(Weak::upgrade)
            .map(ComponentHandler::from_inner)
            .any(|root| root.path() == model.path() && !root.is_disposed());
        if taken {
            return Err(ControlError::DuplicatePath(model.path().to_string()));
        }
        let handler = self
            .components
            .create_component_handler(None, &self.anchor, model, managed)?;
        roots.push(Arc::downgrade(handler.inner()));
        Ok(handler)
    }

    /// Live top-level components created by this controller.
    pub fn components(&self) -> Vec<ComponentHandler> {
        self.roots
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .map(ComponentHandler::from_inner)
            .collect()
    }

    /// Reclaims every soft singleton; see [`Runtime::collect`].
    pub fn collect(&self) -> usize {
        self.runtime.collect()
    }

    /// Dump of every live component tree.
    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        self.components().iter().map(ComponentHandler::to_debug_string).collect()
    }
}
