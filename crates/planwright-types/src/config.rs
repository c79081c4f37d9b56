//! Planner configuration types.
//!
//! `PlannerConfig` is the top-level `config.toml` that controls default retry
//! behaviour, fallback plans, and the planning-model request settings.

use serde::{Deserialize, Serialize};

use crate::plan::{ExecutionModel, RetryPolicy};

/// Top-level configuration for the planning engine. All fields have defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Retry policy given to parsed and heuristic steps.
    #[serde(default)]
    pub default_retry: RetryPolicy,

    /// Used when planner output omits or garbles the execution model.
    #[serde(default)]
    pub default_execution_model: ExecutionModel,

    /// Action used by fallback plans.
    #[serde(default = "default_fallback_action")]
    pub fallback_action: String,

    /// Text parameter given to the fallback action.
    #[serde(default = "default_fallback_text")]
    pub fallback_text: String,

    #[serde(default)]
    pub model: ModelSettings,

    /// Capacity of the execution event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_fallback_action() -> String {
    "REPLY".to_string()
}

fn default_fallback_text() -> String {
    "I will help you with this request step by step.".to_string()
}

fn default_event_capacity() -> usize {
    256
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_retry: RetryPolicy::default(),
            default_execution_model: ExecutionModel::default(),
            fallback_action: default_fallback_action(),
            fallback_text: default_fallback_text(),
            model: ModelSettings::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Sampling settings sent with every planning-model request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    2000
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::OnError;

    #[test]
    fn test_planner_config_default_values() {
        let config = PlannerConfig::default();
        assert_eq!(config.fallback_action, "REPLY");
        assert_eq!(config.default_retry.max_retries, 2);
        assert_eq!(config.model.max_tokens, 2000);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_planner_config_deserialize_empty() {
        let config: PlannerConfig = toml::from_str("").unwrap();
        assert_eq!(config.default_execution_model, ExecutionModel::Sequential);
        assert!((config.model.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_planner_config_deserialize_with_values() {
        let toml_str = r#"
default_execution_model = "dag"
fallback_action = "RESPOND"

[default_retry]
max_retries = 5
backoff_ms = 250
on_error = "continue"

[model]
max_tokens = 4096
"#;
        let config: PlannerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_execution_model, ExecutionModel::Graph);
        assert_eq!(config.fallback_action, "RESPOND");
        assert_eq!(config.default_retry.max_retries, 5);
        assert_eq!(config.default_retry.backoff_ms, 250);
        assert!((config.default_retry.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.default_retry.on_error, OnError::Continue);
        assert_eq!(config.model.max_tokens, 4096);
        assert_eq!(config.fallback_text, default_fallback_text());
    }
}
