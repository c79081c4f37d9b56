//! Planning-model boundary.
//!
//! The engine hands a prompt to an external language model and gets back a
//! text blob containing a `<plan>` block. It treats that text as untrusted.
//! - `model` -- `PlanningModel` trait, request and error types
//! - `box_model` -- object-safe `BoxPlanningModel` wrapper

pub mod box_model;
pub mod model;

pub use box_model::BoxPlanningModel;
pub use model::{ModelError, PlanningModel, PlanningRequest};
