//! Plan lifecycle: construction, parsing, validation, ordering, adaptation,
//! and the per-executor plan registry.
//!
//! - `builder` -- keyword heuristic plans and comprehensive-plan prompts
//! - `parser` -- tolerant parsing of planner output with fallback
//! - `validator` -- accumulated structural checks and DFS cycle detection
//! - `schedule` -- deterministic topological order for graph plans
//! - `adapter` -- replace the unexecuted suffix after a failure
//! - `registry` -- plan definitions and in-flight executions

pub mod adapter;
pub mod builder;
pub mod parser;
pub mod registry;
pub mod schedule;
pub mod validator;

pub use adapter::adapt_plan;
pub use builder::{PlanningContext, simple_plan};
pub use parser::parse_plan;
pub use registry::{AlreadyRunning, ExecutionGuard, PlanRegistry};
pub use schedule::{SchedulingError, execution_order, execution_order_ids};
pub use validator::validate_plan;
