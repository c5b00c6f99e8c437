//! Ordered management of a component's parts.
//!
//! The [`PartsManager`] owns the child handlers of one component. Handlers
//! are built lazily on first use, one per declared part, in declaration
//! order. Commissioning starts every `Startup` part in that order through
//! the [`Commissioner`]; decommissioning stops all parts in reverse order.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::commissioner::Commissioner;
use crate::control::ComponentController;
use crate::error::{ControlError, ControlResult};
use crate::handler::{ComponentHandler, HandlerInner};
use crate::model::ComponentModel;
use crate::policy::ActivationPolicy;
use crate::traits::{Commissionable, Disposable};

type PartHandlers = Arc<Vec<(String, ComponentHandler)>>;

/// Child handlers of one component, keyed by part key
pub struct PartsManager {
    owner: Weak<HandlerInner>,
    model: ComponentModel,
    controller: ComponentController,
    handlers: Mutex<Option<PartHandlers>>,
    commissioned: Mutex<bool>,
}

impl fmt::Debug for PartsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartsManager")
            .field("path", &self.model.path())
            .field("keys", &self.keys())
            .field("commissioned", &self.is_commissioned())
            .finish()
    }
}

impl PartsManager {
    pub(crate) fn new(owner: Weak<HandlerInner>, model: ComponentModel, controller: ComponentController) -> Self {
        Self {
            owner,
            model,
            controller,
            handlers: Mutex::new(None),
            commissioned: Mutex::new(false),
        }
    }

    /// Part keys in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.model.part_keys()
    }

    pub fn is_commissioned(&self) -> bool {
        *self.commissioned.lock()
    }

    /// Child handlers in declaration order, building them on first call.
    pub fn handlers(&self) -> ControlResult<PartHandlers> {
        let mut slot = self.handlers.lock();
        if let Some(handlers) = slot.as_ref() {
            return Ok(handlers.clone());
        }
        let owner = self
            .owner
            .upgrade()
            .map(ComponentHandler::from_inner)
            .ok_or_else(|| ControlError::IllegalState(format!("owner of parts [{}] is gone", self.model.path())))?;
        let mut built = Vec::with_capacity(self.model.parts().len());
        for (key, model) in self.model.parts() {
            let handler = self
                .controller
                .create_component_handler(Some(&owner), owner.classloader(), model, false)?;
            built.push((key.clone(), handler));
        }
        let built = Arc::new(built);
        *slot = Some(built.clone());
        Ok(built)
    }

    pub(crate) fn built_handlers(&self) -> Option<PartHandlers> {
        self.handlers.lock().clone()
    }

    /// The handler for a part key.
    pub fn handler(&self, key: &str) -> ControlResult<ComponentHandler> {
        self.handlers()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, handler)| handler.clone())
            .ok_or_else(|| ControlError::UnknownPart {
                key: key.to_string(),
                path: self.model.path().to_string(),
            })
    }

    /// Commissions every `Startup` part, in declaration order.
    ///
    /// Idempotent. When a part fails, the failed part and every part
    /// already started are decommissioned (in reverse start order) before
    /// the error is returned. A part that was abandoned after a timeout is
    /// left alone.
    pub fn commission(&self) -> ControlResult<()> {
        let mut commissioned = self.commissioned.lock();
        if *commissioned {
            return Ok(());
        }
        let handlers = self.handlers()?;
        let commissioner = Commissioner::from_config(self.model.path(), self.model.runtime().config());
        let mut started: Vec<&ComponentHandler> = Vec::new();
        for (key, handler) in handlers.iter() {
            if handler.activation_policy() != ActivationPolicy::Startup {
                continue;
            }
            let item: Arc<dyn Commissionable> = Arc::new(handler.clone());
            match commissioner.commission(item) {
                Ok(()) => started.push(handler),
                Err(error) => {
                    if !matches!(error, ControlError::Terminated { .. }) {
                        handler.decommission();
                    }
                    for part in started.iter().rev() {
                        part.decommission();
                    }
                    return Err(ControlError::controller(
                        format!("Unable to commission the part [{}] in component [{}]", key, self.model.path()),
                        error,
                    ));
                }
            }
        }
        *commissioned = true;
        Ok(())
    }

    /// Decommissions all parts in reverse declaration order.
    ///
    /// Failures of individual parts are logged and do not stop the rest.
    pub fn decommission(&self) {
        let mut commissioned = self.commissioned.lock();
        if let Some(handlers) = self.built_handlers() {
            for (key, handler) in handlers.iter().rev() {
                if panic::catch_unwind(AssertUnwindSafe(|| handler.decommission())).is_err() {
                    tracing::warn!(component = self.model.path(), part = %key, "part decommissioning panicked");
                }
            }
        }
        *commissioned = false;
    }

    pub(crate) fn dispose(&self) {
        let handlers = self.handlers.lock().take();
        if let Some(handlers) = handlers {
            for (_, handler) in handlers.iter().rev() {
                handler.dispose();
            }
        }
        *self.commissioned.lock() = false;
    }
}
