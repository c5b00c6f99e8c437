//! Internal implementation details.

pub(crate) mod circular;
pub(crate) mod dispose_bag;

pub(crate) use circular::ResolutionGuard;
pub(crate) use dispose_bag::{run_hooks, DisposeBag};
