//! Re-entrant resolution detection.

use std::cell::RefCell;

use crate::error::{ControlError, ControlResult};

const MAX_DEPTH: usize = 256;

// Paths of components being produced on this thread, outermost first
thread_local! {
    static RESOLUTION_STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Marks a component path as being resolved on the current thread.
///
/// Entering a path already on the stack means the component's own
/// construction asked for itself; that is reported as
/// [`ControlError::Circular`] with the full path instead of deadlocking on
/// the holder lock.
pub(crate) struct ResolutionGuard {
    path: String,
}

impl ResolutionGuard {
    pub(crate) fn enter(path: &str) -> ControlResult<Self> {
        RESOLUTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|p| p == path) {
                let mut cycle = stack.clone();
                cycle.push(path.to_string());
                return Err(ControlError::Circular(cycle));
            }
            if stack.len() >= MAX_DEPTH {
                return Err(ControlError::IllegalState(format!(
                    "component resolution depth {} exceeded at [{}]",
                    MAX_DEPTH, path
                )));
            }
            stack.push(path.to_string());
            Ok(())
        })?;
        Ok(Self { path: path.to_string() })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        let _ = RESOLUTION_STACK.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(index) = stack.iter().rposition(|p| *p == self.path) {
                stack.truncate(index);
            }
        });
    }
}
