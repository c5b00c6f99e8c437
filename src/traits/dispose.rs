//! Disposal trait for runtime-managed resources.

/// Trait for structured teardown.
///
/// Implemented by component models, handlers and providers. Disposal is
/// idempotent and never fails: problems encountered while tearing down are
/// logged and absorbed so shutdown always makes progress.
///
/// # Examples
///
/// ```
/// use ferrous_metro::Disposable;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// struct Connection {
///     closed: AtomicBool,
/// }
///
/// impl Disposable for Connection {
///     fn dispose(&self) {
///         self.closed.store(true, Ordering::SeqCst);
///     }
///
///     fn is_disposed(&self) -> bool {
///         self.closed.load(Ordering::SeqCst)
///     }
/// }
///
/// let connection = Connection { closed: AtomicBool::new(false) };
/// connection.dispose();
/// assert!(connection.is_disposed());
/// ```
pub trait Disposable: Send + Sync {
    /// Release held resources.
    fn dispose(&self);

    /// True once `dispose` has run.
    fn is_disposed(&self) -> bool;
}
