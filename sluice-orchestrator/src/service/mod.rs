//! Service Module
//!
//! Run lifecycle and concurrency enforcement.

pub mod gate;
pub mod run;

pub use gate::ConcurrencyGate;
pub use run::{RunError, RunService, ServiceSettings};
