//! Planner configuration loader for the `pw` binary.
//!
//! Reads `config.toml` from `{config_dir}/planwright/` (or an explicit
//! `--config` path) into [`PlannerConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use planwright_types::config::PlannerConfig;

/// `{config_dir}/planwright/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("planwright").join("config.toml"))
}

/// Load the planner configuration.
///
/// - An explicit path that does not exist logs a warning and yields defaults.
/// - A missing default file yields defaults silently.
/// - A file that fails to read or parse logs a warning and yields defaults.
pub async fn load_config(explicit: Option<&Path>) -> PlannerConfig {
    match explicit {
        Some(path) => load_from(path, true).await,
        None => match default_config_path() {
            Some(path) => load_from(&path, false).await,
            None => {
                tracing::debug!("No platform config directory, using defaults");
                PlannerConfig::default()
            }
        },
    }
}

async fn load_from(path: &Path, explicit: bool) -> PlannerConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !explicit => {
            tracing::debug!("No config.toml found at {}, using defaults", path.display());
            return PlannerConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return PlannerConfig::default();
        }
    };

    match toml::from_str::<PlannerConfig>(&content) {
        Ok(config) => {
            tracing::debug!("Loaded planner config from {}", path.display());
            config
        }
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            PlannerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planwright_types::plan::{ExecutionModel, OnError};
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_from(&tmp.path().join("config.toml"), false).await;
        assert_eq!(config.fallback_action, "REPLY");
        assert_eq!(config.event_capacity, 256);
    }

    #[tokio::test]
    async fn explicit_missing_file_still_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(Some(&tmp.path().join("nope.toml"))).await;
        assert_eq!(config.default_retry.max_retries, 2);
    }

    #[tokio::test]
    async fn valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(
            &path,
            r#"
default_execution_model = "graph"
fallback_action = "RESPOND"

[default_retry]
max_retries = 5
on_error = "continue"

[model]
temperature = 0.7
"#,
        )
        .await
        .unwrap();

        let config = load_config(Some(&path)).await;
        assert_eq!(config.default_execution_model, ExecutionModel::Graph);
        assert_eq!(config.fallback_action, "RESPOND");
        assert_eq!(config.default_retry.max_retries, 5);
        assert_eq!(config.default_retry.backoff_ms, 1000);
        assert_eq!(config.default_retry.on_error, OnError::Continue);
        assert!((config.model.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.model.max_tokens, 2000);
        assert_eq!(config.fallback_text, PlannerConfig::default().fallback_text);
    }

    #[tokio::test]
    async fn invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(Some(&path)).await;
        assert_eq!(config.default_execution_model, ExecutionModel::Sequential);
        assert_eq!(config.fallback_action, "REPLY");
    }

    #[test]
    fn default_path_ends_with_planwright_config() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("planwright/config.toml"));
        }
    }
}
