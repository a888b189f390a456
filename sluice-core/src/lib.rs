//! Sluice Core
//!
//! Core types and abstractions for the Sluice gate-and-run service.
//!
//! This crate contains:
//! - Domain types: trigger events, workflows, runs, logs and secrets
//! - Gate: the pure start/concurrency decision for incoming events
//! - DTOs: webhook payloads and API bodies shared by the orchestrator and its clients

pub mod domain;
pub mod dto;
pub mod gate;
