//! PlanningModel trait definition.

use std::future::Future;

/// A single completion request sent across the planning boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Errors reported by a planning model backend.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The backend could not be reached or refused the request.
    #[error("planning model unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with something unusable (e.g. empty output).
    #[error("planning model response error: {0}")]
    Response(String),
}

/// Trait for language-model backends that write plans.
///
/// Uses RPITIT; implementations live outside the engine.
pub trait PlanningModel: Send + Sync {
    /// Human-readable backend name (e.g. "anthropic", "scripted").
    fn name(&self) -> &str;

    /// Send a prompt and receive the full text response.
    fn complete(
        &self,
        request: &PlanningRequest,
    ) -> impl Future<Output = Result<String, ModelError>> + Send;
}
