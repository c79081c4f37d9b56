//! Built-in actions registered by `pw run`.
//!
//! These are demonstration actions with no external side effects, enough to
//! exercise every execution model, retries, and working memory from a plan
//! file.

use std::time::Duration;

use planwright_core::{Action, ActionContext, ActionError, ActionOutput, ActionRegistry};
use serde_json::{Value, json};

/// Registry holding every built-in action.
pub fn registry() -> ActionRegistry {
    ActionRegistry::new()
        .with(Reply::new())
        .with(Think)
        .with(Search)
        .with(Wait)
        .with(Remember)
        .with(Recall)
        .with(Fail)
}

/// First string parameter found among `keys`.
fn text_param<'a>(ctx: &'a ActionContext, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| ctx.str_parameter(key))
}

// ---------------------------------------------------------------------------
// REPLY
// ---------------------------------------------------------------------------

/// Echo `text` (or `message`, or the triggering message) back as the reply.
pub struct Reply {
    aliases: Vec<String>,
}

impl Reply {
    fn new() -> Self {
        Self {
            aliases: vec!["RESPOND".to_string()],
        }
    }
}

impl Action for Reply {
    fn name(&self) -> &str {
        "REPLY"
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn description(&self) -> &str {
        "Reply to the user with the given text"
    }

    async fn invoke(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        let text = text_param(&ctx, &["text", "message"])
            .map(str::to_string)
            .unwrap_or_else(|| ctx.message.text.clone());
        Ok(ActionOutput::text(text))
    }
}

// ---------------------------------------------------------------------------
// THINK
// ---------------------------------------------------------------------------

/// Summarize what earlier steps produced.
pub struct Think;

impl Action for Think {
    fn name(&self) -> &str {
        "THINK"
    }

    fn description(&self) -> &str {
        "Reflect on the results gathered so far"
    }

    async fn invoke(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        let topic = text_param(&ctx, &["topic", "message"]).unwrap_or(&ctx.message.text);
        let prior: Vec<&str> = ctx
            .previous_results
            .iter()
            .map(|r| r.action.as_str())
            .collect();
        let text = if prior.is_empty() {
            format!("Considering: {topic}")
        } else {
            format!("Considering: {topic} (after {})", prior.join(", "))
        };
        Ok(ActionOutput::text(text).with_data(json!({ "prior_steps": prior.len() })))
    }
}

// ---------------------------------------------------------------------------
// SEARCH
// ---------------------------------------------------------------------------

/// Offline stand-in for a search backend: reports the query and no hits.
pub struct Search;

impl Action for Search {
    fn name(&self) -> &str {
        "SEARCH"
    }

    fn description(&self) -> &str {
        "Look up information for a query"
    }

    async fn invoke(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        let query = text_param(&ctx, &["query", "message"])
            .unwrap_or(&ctx.message.text)
            .to_string();
        Ok(ActionOutput::text(format!("No search backend configured for '{query}'"))
            .with_data(json!({ "query": query, "results": [] })))
    }
}

// ---------------------------------------------------------------------------
// WAIT
// ---------------------------------------------------------------------------

/// Sleep for `ms` milliseconds, stopping early if the plan is cancelled.
pub struct Wait;

impl Action for Wait {
    fn name(&self) -> &str {
        "WAIT"
    }

    fn description(&self) -> &str {
        "Pause for `ms` milliseconds"
    }

    async fn invoke(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        let ms = match ctx.parameter("ms") {
            None => 1000,
            Some(value) => value.as_u64().ok_or_else(|| {
                ActionError::InvalidParameters(format!("'ms' must be a non-negative integer, got {value}"))
            })?,
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                Ok(ActionOutput::text(format!("waited {ms} ms")))
            }
            _ = ctx.cancel.cancelled() => Err(ActionError::Cancelled),
        }
    }
}

// ---------------------------------------------------------------------------
// REMEMBER / RECALL
// ---------------------------------------------------------------------------

/// Store `value` under `key` in working memory.
pub struct Remember;

impl Action for Remember {
    fn name(&self) -> &str {
        "REMEMBER"
    }

    fn description(&self) -> &str {
        "Store a value in working memory under a key"
    }

    async fn invoke(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        let key = ctx
            .str_parameter("key")
            .ok_or_else(|| ActionError::InvalidParameters("missing 'key'".to_string()))?
            .to_string();
        let value = ctx.parameter("value").cloned().unwrap_or(Value::Null);
        ctx.memory.set(key.clone(), value.clone());
        Ok(ActionOutput::text(format!("remembered {key}")).with_data(value))
    }
}

/// Read `key` from working memory.
pub struct Recall;

impl Action for Recall {
    fn name(&self) -> &str {
        "RECALL"
    }

    fn description(&self) -> &str {
        "Read a value from working memory"
    }

    async fn invoke(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        let key = ctx
            .str_parameter("key")
            .ok_or_else(|| ActionError::InvalidParameters("missing 'key'".to_string()))?;
        match ctx.memory.get(key) {
            Some(value) => Ok(ActionOutput::text(value.to_string()).with_data(value)),
            None => Err(ActionError::failed(format!("nothing remembered under '{key}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// FAIL
// ---------------------------------------------------------------------------

/// Always fails. Useful for trying retry and on-error policies.
pub struct Fail;

impl Action for Fail {
    fn name(&self) -> &str {
        "FAIL"
    }

    fn description(&self) -> &str {
        "Fail with the given message"
    }

    async fn invoke(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        let message = ctx.str_parameter("message").unwrap_or("requested failure");
        Err(ActionError::failed(message))
    }
}
