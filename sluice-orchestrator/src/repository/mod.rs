//! Repository Module
//!
//! Data access layer for the orchestrator. Runs are kept in memory, up to a
//! retention limit beyond which the oldest finished runs are forgotten.

pub mod run;

pub use run::RunRepository;
