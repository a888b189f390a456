//! Sluice Runner
//!
//! Executes a single workflow run from a clean slate.
//!
//! Architecture:
//! - Configuration: runner settings from environment or defaults
//! - Workspace/Context: the ephemeral directory, child environment and log buffer of a run
//! - Process: subprocess execution behind the `CommandRunner` seam
//! - Provisioner, integration and deployment runners: the steps of each workflow
//! - Executor: the fail-fast chain tying them together, observing cancellation
//!
//! Runs never share state; the only cross-run coordination is the epoch
//! token handed in by whoever admitted the run.

pub mod cancel;
pub mod config;
pub mod context;
pub mod deploy;
pub mod executor;
pub mod integration;
pub mod platform;
pub mod process;
pub mod provision;
pub mod step;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::{Epoch, RunToken};
pub use config::RunnerConfig;
pub use context::RunContext;
pub use executor::PipelineExecutor;
pub use process::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use step::{RetryPolicy, StepError};
