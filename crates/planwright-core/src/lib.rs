//! Action-plan execution engine for Planwright.
//!
//! Validates, orders, parses, adapts, and executes plans against a registry
//! of actions. Depends only on `planwright-types`; planning models and
//! concrete actions are supplied by the caller through the `PlanningModel`
//! and `Action` traits.

pub mod action;
pub mod event;
pub mod executor;
pub mod llm;
pub mod memory;
pub mod plan;

#[cfg(test)]
mod testing;

pub use action::{Action, ActionContext, ActionError, ActionOutput, ActionRegistry, BoxAction};
pub use executor::{ExecutorError, PlanExecutor};
pub use memory::WorkingMemory;
