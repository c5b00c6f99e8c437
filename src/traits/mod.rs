//! Core traits for the component runtime.

mod commission;
mod dispose;

pub use commission::Commissionable;
pub use dispose::Disposable;
