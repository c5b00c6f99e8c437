//! Commissioning trait for work scheduled by the commissioner.

use crate::cancellation::CancellationToken;
use crate::error::ControlResult;

/// A unit of commissioning work.
///
/// The commissioner may run the item on a worker thread and cancel the
/// supplied token when the item exceeds its timeout; long-running
/// implementations should poll the token and return early.
pub trait Commissionable: Send + Sync {
    /// Label used in diagnostics and timeout errors.
    fn label(&self) -> String;

    /// Perform the commissioning work.
    fn commission(&self, token: &CancellationToken) -> ControlResult<()>;
}
