//! Test doubles for actions and planning models.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::action::{Action, ActionContext, ActionError, ActionOutput};
use crate::llm::{ModelError, PlanningModel, PlanningRequest};

/// Shared, ordered record of which actions started.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn logged(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Always succeeds with fixed text.
pub struct StaticAction {
    name: String,
    aliases: Vec<String>,
    text: String,
}

impl StaticAction {
    pub fn new(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            text: text.to_string(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }
}

impl Action for StaticAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    async fn invoke(&self, _ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        Ok(ActionOutput::text(self.text.clone()))
    }
}

/// Appends a label to a shared log when invoked, optionally after a delay.
pub struct RecordingAction {
    name: String,
    log: CallLog,
    delay: Duration,
}

impl RecordingAction {
    pub fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Action for RecordingAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        let label = ctx
            .str_parameter("label")
            .map(str::to_string)
            .unwrap_or_else(|| self.name.clone());
        self.log.lock().unwrap().push(label.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(ActionOutput::text(label))
    }
}

/// Fails its first `failures` invocations, then succeeds.
pub struct FailingAction {
    name: String,
    failures: u32,
    calls: Arc<AtomicU32>,
}

impl FailingAction {
    pub fn always(name: &str) -> Self {
        Self::times(name, u32::MAX)
    }

    pub fn times(name: &str, failures: u32) -> Self {
        Self {
            name: name.to_string(),
            failures,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Handle to the invocation counter.
    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

impl Action for FailingAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(ActionError::failed(format!("{} failed on call {call}", self.name)))
        } else {
            Ok(ActionOutput::text("recovered"))
        }
    }
}

/// Writes one key into working memory and reports what it saw before.
pub struct MemoryWriteAction {
    name: String,
    key: String,
    value: Value,
}

impl MemoryWriteAction {
    pub fn new(name: &str, key: &str, value: Value) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            value,
        }
    }
}

impl Action for MemoryWriteAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        let before = ctx.memory_snapshot.get(&self.key).cloned().unwrap_or(Value::Null);
        ctx.memory.set(self.key.clone(), self.value.clone());
        Ok(ActionOutput::data(before))
    }
}

/// Sleeps, then reports the live working-memory value of one key.
pub struct MemoryReadAction {
    name: String,
    key: String,
    delay: Duration,
}

impl MemoryReadAction {
    pub fn new(name: &str, key: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            key: key.to_string(),
            delay,
        }
    }
}

impl Action for MemoryReadAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: ActionContext) -> Result<ActionOutput, ActionError> {
        tokio::time::sleep(self.delay).await;
        Ok(ActionOutput::data(
            ctx.memory.get(&self.key).unwrap_or(Value::Null),
        ))
    }
}

// ---------------------------------------------------------------------------
// Planning model
// ---------------------------------------------------------------------------

/// Replays canned responses in order and records every prompt it receives.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A model whose first call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([Err(message.to_string())])),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }
}

impl PlanningModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &PlanningRequest) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ModelError::Unavailable(message)),
            None => Err(ModelError::Response("script exhausted".to_string())),
        }
    }
}
