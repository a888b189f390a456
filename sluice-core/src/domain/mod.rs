//! Core domain types
//!
//! These types describe what happens to a change as it flows through the
//! pipelines. They are shared between the orchestrator (which records runs)
//! and the runner (which executes them).

pub mod event;
pub mod log;
pub mod run;
pub mod secret;
pub mod workflow;
