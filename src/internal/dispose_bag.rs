//! Internal disposal bag for managing cleanup hooks.

/// Container for disposal hooks with LIFO execution order.
#[derive(Default)]
pub(crate) struct DisposeBag {
    hooks: Vec<(String, Box<dyn FnOnce() + Send>)>,
}

impl DisposeBag {
    /// Add a labelled disposal hook.
    pub(crate) fn push(&mut self, label: impl Into<String>, f: Box<dyn FnOnce() + Send>) {
        self.hooks.push((label.into(), f));
    }

    /// Drains the hooks, most recently added first.
    ///
    /// The caller runs them, typically after releasing the lock guarding
    /// the bag.
    pub(crate) fn take_reverse(&mut self) -> Vec<(String, Box<dyn FnOnce() + Send>)> {
        let mut hooks = std::mem::take(&mut self.hooks);
        hooks.reverse();
        hooks
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Check if the bag is empty (no disposers registered).
    pub(crate) fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// Runs hooks in order, logging and absorbing panics.
pub(crate) fn run_hooks(owner: &str, hooks: Vec<(String, Box<dyn FnOnce() + Send>)>) {
    for (label, hook) in hooks {
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(hook)).is_err() {
            tracing::warn!(owner, hook = %label, "disposal hook panicked");
        }
    }
}
