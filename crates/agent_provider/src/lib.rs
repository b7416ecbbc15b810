//! Provider-agnostic contract for one reasoning step of an agent turn.
//!
//! The server drives the turn; a provider only answers "what next?" given the
//! conversation so far. Each step either requests tool calls, which the host
//! executes before asking again, or starts streaming the final answer. This
//! crate excludes provider transport details and turn orchestration.

use std::fmt;

use agent_protocol::Turn;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};

/// Error returned while constructing/configuring a provider before any run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Failure of a reasoning step or of its answer stream. Always fatal to the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderError {}

/// Generic host-mediated tool definition exposed to providers.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// One tool invocation requested by a reasoning step.
///
/// An empty `call_id` asks the host to assign one.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    #[must_use]
    pub fn new(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Input to one reasoning step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRequest {
    /// Conversation so far, including the current prompt and any tool
    /// activity already recorded in this agent turn.
    pub turns: Vec<Turn>,
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
    /// Zero-based count of steps already taken in this agent turn.
    pub step_index: usize,
}

/// Ordered answer-text fragments.
pub type AnswerStream = BoxStream<'static, Result<String, ProviderError>>;

/// What a reasoning step decided to do.
pub enum Step {
    ToolCalls(Vec<ToolCallRequest>),
    Answer(AnswerStream),
}

impl Step {
    /// Final answer delivered as already-known fragments.
    #[must_use]
    pub fn answer_fragments(fragments: Vec<String>) -> Self {
        Self::Answer(stream::iter(fragments.into_iter().map(Ok)).boxed())
    }

    #[must_use]
    pub fn answer_text(text: impl Into<String>) -> Self {
        Self::answer_fragments(vec![text.into()])
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolCalls(calls) => f.debug_tuple("ToolCalls").field(calls).finish(),
            Self::Answer(_) => f.write_str("Answer(..)"),
        }
    }
}

/// Immutable metadata describing a run provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Reasoning backend consulted once per step of an agent turn.
#[async_trait]
pub trait RunProvider: Send + Sync + 'static {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Decides the next step for the conversation in `request`.
    async fn step(&self, request: StepRequest) -> Result<Step, ProviderError>;
}

#[cfg(test)]
mod tests {
    use agent_protocol::Turn;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use serde_json::{json, Map};

    use super::{
        ProviderError, ProviderInitError, ProviderProfile, RunProvider, Step, StepRequest,
        ToolCallRequest, ToolDefinition,
    };

    struct MinimalProvider;

    #[async_trait]
    impl RunProvider for MinimalProvider {
        fn profile(&self) -> ProviderProfile {
            ProviderProfile {
                provider_id: "minimal".to_string(),
                model_id: "minimal-model".to_string(),
            }
        }

        async fn step(&self, request: StepRequest) -> Result<Step, ProviderError> {
            if request.step_index > 0 {
                return Err(ProviderError::new("minimal provider answers in one step"));
            }
            Ok(Step::answer_text("hello"))
        }
    }

    fn request(step_index: usize) -> StepRequest {
        StepRequest {
            turns: vec![Turn::user("hi")],
            instructions: "system instructions".to_string(),
            tools: Vec::new(),
            step_index,
        }
    }

    #[tokio::test]
    async fn answer_step_streams_its_fragments_in_order() {
        let step = Step::answer_fragments(vec!["a".to_string(), "b".to_string()]);
        let Step::Answer(stream) = step else {
            panic!("expected an answer step");
        };

        let fragments: Vec<String> = stream
            .map(|fragment| fragment.expect("fragment"))
            .collect()
            .await;
        assert_eq!(fragments, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn provider_errors_surface_their_message() {
        let provider = MinimalProvider;
        assert!(matches!(
            provider.step(request(0)).await,
            Ok(Step::Answer(_))
        ));

        let error = provider
            .step(request(1))
            .await
            .expect_err("second step should fail");
        assert_eq!(error.message(), "minimal provider answers in one step");
        assert_eq!(error.to_string(), "minimal provider answers in one step");
    }

    #[test]
    fn provider_init_error_preserves_message() {
        let error = ProviderInitError::new("missing token");
        assert_eq!(error.message(), "missing token");
        assert_eq!(error.to_string(), "missing token");
    }

    #[test]
    fn tool_definition_and_call_request_are_provider_neutral_json_envelopes() {
        let definition = ToolDefinition {
            name: "read".to_string(),
            description: Some("Reads UTF-8 text from a path".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" }
                },
                "required": ["path"]
            }),
        };

        let mut arguments = Map::new();
        arguments.insert("path".to_string(), json!("README.md"));
        let call = ToolCallRequest::new("call-42", definition.name.clone(), arguments);

        assert_eq!(definition.name, "read");
        assert_eq!(call.call_id, "call-42");
        assert_eq!(call.arguments["path"], "README.md");
    }

    #[test]
    fn step_debug_hides_stream_internals() {
        assert_eq!(format!("{:?}", Step::answer_text("x")), "Answer(..)");
        assert_eq!(
            format!("{:?}", Step::ToolCalls(Vec::new())),
            "ToolCalls([])"
        );
    }
}
