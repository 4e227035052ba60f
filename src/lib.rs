//! Hotstack: Heat Orchestration Template compiler and stack lifecycle runner.
//!
//! Templates compile once into an immutable [`core::types::Bundle`]. Caller
//! values are resolved against it, and [`orchestrator::run`] drives one
//! create, update or delete to a terminal state through an
//! [`orchestrator::OrchestrationApi`].

pub mod cli;
pub mod connection;
pub mod core;
pub mod error;
pub mod orchestrator;
