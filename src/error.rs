//! Error types for the component runtime.

use std::any::Any;
use std::time::Duration;

/// Boxed error returned by component factories and lifecycle methods.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Component runtime errors
///
/// One error surface covering model construction, handler lifecycle,
/// context resolution, lookups and commissioning. Construction errors
/// propagate to the caller; teardown errors are logged by the runtime and
/// never surface here.
///
/// # Examples
///
/// ```rust
/// use ferrous_metro::ControlError;
///
/// let error = ControlError::NoSolution {
///     key: "name".to_string(),
///     path: "/demo".to_string(),
/// };
/// assert!(error.is_configuration());
/// assert_eq!(
///     error.to_string(),
///     "No solution defined for the context entry [name] in component [/demo]"
/// );
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Generic controller failure wrapping the originating cause
    #[error("{message}")]
    Controller {
        message: String,
        #[source]
        source: Box<ControlError>,
    },
    /// Implementation class not visible to the class loader chain
    #[error("Class [{classname}] not found in class loader {loader}")]
    ClassNotFound { classname: String, loader: String },
    /// Artifact URI could not be resolved by the repository
    #[error("Unable to resolve artifact [{0}]")]
    ArtifactNotFound(String),
    /// The implementation class declares no public constructor
    #[error("Class [{0}] does not declare a public constructor")]
    NoConstructor(String),
    /// The implementation class declares more than one public constructor
    #[error("Class [{classname}] declares {count} public constructors (exactly one is required)")]
    AmbiguousConstructor { classname: String, count: usize },
    /// A constructor parameter of a kind the runtime cannot supply
    #[error(
        "Unable to resolve a value for the constructor parameter [{parameter}] at position {position} \
         in component [{component}] (class [{classname}], class loader {loader})"
    )]
    UnresolvedParameter {
        component: String,
        classname: String,
        parameter: String,
        position: usize,
        loader: String,
    },
    /// Context model validation failure
    #[error("Invalid context model in component [{path}]: {}", issues.join("; "))]
    Validation { path: String, issues: Vec<String> },
    /// Required context entry without override or directive
    #[error("No solution defined for the context entry [{key}] in component [{path}]")]
    NoSolution { key: String, path: String },
    /// Context key not declared by the component type
    #[error("Unknown context key [{key}] in component [{path}]")]
    UnknownKey { key: String, path: String },
    /// Part key declared twice within one component
    #[error("Duplicate part key [{key}] in component [{path}]")]
    DuplicatePart { key: String, path: String },
    /// A live top-level component already occupies the context path
    #[error("Duplicate component path [{0}]")]
    DuplicatePath(String),
    /// Part key not declared by the component
    #[error("Unknown part [{key}] in component [{path}]")]
    UnknownPart { key: String, path: String },
    /// No provider for the requested service anywhere in the ancestor chain
    #[error("Service not found: {0}")]
    ServiceNotFound(String),
    /// A component factory or lifecycle method failed
    #[error("Invocation failure in component [{path}]: {source}")]
    Invocation {
        path: String,
        #[source]
        source: BoxError,
    },
    /// Operation not permitted in the current lifecycle state
    #[error("Illegal state: {0}")]
    IllegalState(String),
    /// Transition name not reachable from the current state
    #[error("Transition [{name}] not available in state [{state}]")]
    UnknownTransition { name: String, state: String },
    /// Operation name not reachable from the current state
    #[error("Operation [{name}] not available in state [{state}]")]
    UnknownOperation { name: String, state: String },
    /// Proxy method name not matching any dispatch convention
    #[error("No such method: {0}")]
    NoSuchMethod(String),
    /// Literal context value could not be converted to its target
    #[error("Unable to convert value [{value}] to [{target}]: {reason}")]
    Value {
        value: String,
        target: String,
        reason: String,
    },
    /// Re-entrant resolution of a component already being produced
    #[error("Circular component resolution: {}", .0.join(" -> "))]
    Circular(Vec<String>),
    /// Commissioning did not complete within the allowed time
    #[error("Commissioning of [{name}] timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },
    /// Work abandoned after its cancellation token fired
    #[error("Operation was cancelled")]
    Cancelled,
    /// Commissioning worker never returned after cancellation
    #[error("Commissioning of [{name}] did not terminate after cancellation")]
    Terminated { name: String },
    /// Missing or mistyped configuration value
    #[error("Configuration error: {0}")]
    Config(String),
    /// Filesystem failure while loading directives or configuration
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed directive or configuration document
    #[error("Decoding failure: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ControlError {
    /// Wraps an error in a controller error carrying a contextual message.
    pub fn controller(message: impl Into<String>, source: ControlError) -> Self {
        ControlError::Controller {
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Wraps a user-level failure raised by a component.
    pub fn invocation(path: impl Into<String>, source: BoxError) -> Self {
        ControlError::Invocation {
            path: path.into(),
            source,
        }
    }

    /// Converts a caught panic into an invocation failure of `path`.
    pub(crate) fn panicked(path: impl Into<String>, during: &str, payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        ControlError::invocation(path, format!("panicked during {}: {}", during, message).into())
    }

    /// Follows controller wrappers down to the originating error.
    ///
    /// Invocation failures are unwrapped too when the component itself
    /// failed with a runtime error (for example a missing context entry
    /// surfacing from a constructor).
    pub fn root_cause(&self) -> &ControlError {
        match self {
            ControlError::Controller { source, .. } => source.root_cause(),
            ControlError::Invocation { source, .. } => match source.downcast_ref::<ControlError>() {
                Some(inner) => inner.root_cause(),
                None => self,
            },
            other => other,
        }
    }

    /// True for configuration and validation failures.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.root_cause(),
            ControlError::Validation { .. }
                | ControlError::NoSolution { .. }
                | ControlError::NoConstructor(_)
                | ControlError::AmbiguousConstructor { .. }
                | ControlError::DuplicatePart { .. }
                | ControlError::DuplicatePath(_)
                | ControlError::UnresolvedParameter { .. }
        )
    }

    /// True when commissioning was interrupted or abandoned.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.root_cause(),
            ControlError::Timeout { .. } | ControlError::Terminated { .. }
        )
    }
}

/// Result type for runtime operations
///
/// A convenience alias for `Result<T, ControlError>` used throughout the crate.
pub type ControlResult<T> = Result<T, ControlError>;
