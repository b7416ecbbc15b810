//! Deterministic mock implementation of the shared `agent_provider` contract.
//!
//! Steps are served from a scripted queue in call order, so a sub-agent
//! spawned mid-turn consumes the next scripted step just like its parent
//! would. Once the script runs out the provider falls back to a small
//! built-in behaviour:
//!
//! - a prompt of the form `!tool_name {"json": "arguments"}` requests that
//!   tool call, and the following step summarizes the tool results;
//! - any other prompt is echoed back as the answer.
//!
//! Answers stream word by word, split on spaces and newlines.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use agent_protocol::Turn;
use agent_provider::{
    ProviderError, ProviderProfile, RunProvider, Step, StepRequest, ToolCallRequest,
};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::{Map, Value};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// One scripted reasoning step.
#[derive(Debug, Clone, PartialEq)]
pub enum MockStep {
    ToolCalls(Vec<ToolCallRequest>),
    Answer(Vec<String>),
    /// Streams `fragments` and then fails the answer stream with `error`.
    AnswerThenFail {
        fragments: Vec<String>,
        error: String,
    },
    Fail(String),
}

impl MockStep {
    /// Single tool call with a host-assigned call id.
    #[must_use]
    pub fn tool(tool_name: &str, arguments: Value) -> Self {
        Self::ToolCalls(vec![ToolCallRequest::new(
            "",
            tool_name,
            object_or_empty(arguments),
        )])
    }

    /// Answer text streamed word by word.
    #[must_use]
    pub fn answer(text: &str) -> Self {
        Self::Answer(tokenize(text))
    }
}

/// Deterministic mock provider used by server tests and local runs.
#[derive(Debug, Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<MockStep>>,
    requests: Mutex<Vec<StepRequest>>,
    token_delay: Duration,
}

impl MockProvider {
    #[must_use]
    pub fn new(script: Vec<MockStep>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            token_delay: Duration::ZERO,
        }
    }

    /// Pauses between streamed answer fragments.
    #[must_use]
    pub fn with_token_delay(mut self, token_delay: Duration) -> Self {
        self.token_delay = token_delay;
        self
    }

    /// Every step request seen so far, in call order.
    #[must_use]
    pub fn recorded_requests(&self) -> Vec<StepRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    /// Scripted steps not yet consumed.
    #[must_use]
    pub fn remaining_steps(&self) -> usize {
        lock_unpoisoned(&self.script).len()
    }

    fn stream_fragments(&self, fragments: Vec<String>, error: Option<String>) -> Step {
        let items = fragments
            .into_iter()
            .map(Ok)
            .chain(error.map(|message| Err(ProviderError::new(message))));

        let delay = self.token_delay;
        if delay.is_zero() {
            return Step::Answer(stream::iter(items).boxed());
        }

        Step::Answer(
            stream::iter(items)
                .then(move |item| async move {
                    tokio::time::sleep(delay).await;
                    item
                })
                .boxed(),
        )
    }
}

#[async_trait]
impl RunProvider for MockProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: "mock".to_string(),
        }
    }

    async fn step(&self, request: StepRequest) -> Result<Step, ProviderError> {
        let scripted = lock_unpoisoned(&self.script).pop_front();
        let step = scripted.unwrap_or_else(|| unscripted_step(&request.turns));
        lock_unpoisoned(&self.requests).push(request);

        match step {
            MockStep::ToolCalls(calls) => Ok(Step::ToolCalls(calls)),
            MockStep::Answer(fragments) => Ok(self.stream_fragments(fragments, None)),
            MockStep::AnswerThenFail { fragments, error } => {
                Ok(self.stream_fragments(fragments, Some(error)))
            }
            MockStep::Fail(message) => Err(ProviderError::new(message)),
        }
    }
}

fn unscripted_step(turns: &[Turn]) -> MockStep {
    let current_turn = match turns
        .iter()
        .rposition(|turn| matches!(turn, Turn::UserMessage { .. }))
    {
        Some(index) => &turns[index..],
        None => turns,
    };

    let results: Vec<String> = current_turn
        .iter()
        .filter_map(|turn| match turn {
            Turn::ToolResult(record) => Some(format!(
                "[{}] {}:\n{}",
                record.call_id,
                if record.failed { "failed" } else { "ok" },
                record.output
            )),
            _ => None,
        })
        .collect();
    if !results.is_empty() {
        return MockStep::answer(&format!("Tool results:\n{}", results.join("\n")));
    }

    let prompt = match current_turn.first() {
        Some(Turn::UserMessage { text }) => text.as_str(),
        _ => "",
    };

    match prompt.strip_prefix('!') {
        Some(request) => parse_tool_request(request),
        None => MockStep::answer(&format!("Mock reply: {prompt}")),
    }
}

fn parse_tool_request(request: &str) -> MockStep {
    let (tool_name, raw_arguments) = match request.trim().split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (request.trim(), ""),
    };

    if tool_name.is_empty() {
        return MockStep::answer("Tool request is missing a tool name.");
    }
    if raw_arguments.is_empty() {
        return MockStep::tool(tool_name, Value::Object(Map::new()));
    }

    match serde_json::from_str::<Value>(raw_arguments) {
        Ok(Value::Object(arguments)) => MockStep::tool(tool_name, Value::Object(arguments)),
        Ok(_) => MockStep::answer("Tool arguments must be a JSON object."),
        Err(error) => MockStep::answer(&format!("Could not parse tool arguments: {error}")),
    }
}

fn object_or_empty(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Splits text into fragments that each end at a space or newline.
fn tokenize(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut pending_token = String::new();

    for ch in text.chars() {
        pending_token.push(ch);
        if matches!(ch, ' ' | '\n') {
            fragments.push(std::mem::take(&mut pending_token));
        }
    }

    if !pending_token.is_empty() {
        fragments.push(pending_token);
    }

    fragments
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
