//! Data Transfer Objects
//!
//! Payloads crossing the orchestrator's HTTP boundary: repository-host
//! webhooks coming in, run summaries and dispatch requests for clients.

pub mod run;
pub mod webhook;
