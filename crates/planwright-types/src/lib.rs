//! Shared domain types for Planwright.
//!
//! Plans, steps, retry policies, run state, execution results, events, and
//! configuration. Zero infrastructure dependencies -- only serde, uuid, chrono.

pub mod config;
pub mod event;
pub mod execution;
pub mod plan;
