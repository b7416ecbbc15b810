//! Drives one agent turn and turns it into the ordered event channel.
//!
//! Every turn emits
//! `(TOOL_PHASE_START (TOOL_CALL TOOL_RESULT)+ TOOL_PHASE_END)* CHUNK* (COMPLETE | ERROR)`
//! and nothing after its terminal event. Dropping the receiving end of the
//! channel cancels the turn at its next emission.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use agent_protocol::api::RunRequest;
use agent_protocol::{StreamEvent, ToolCallRecord, ToolResultRecord, Turn};
use agent_provider::{
    AnswerStream, ProviderError, ProviderProfile, RunProvider, Step, StepRequest,
    ToolCallRequest, ToolDefinition,
};
use chunk_codec::ChunkPolicy;
use futures_util::StreamExt;
use history_codec::HistoryCodecError;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, instrument, trace, warn};

use crate::dispatch::{ToolDispatchError, ToolDispatcher};

pub const DEFAULT_MAX_TOOL_PHASES: usize = 25;

/// Collapsed result of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { answer: String, history: String },
    Failed { message: String },
}

/// Anything that ends a turn with `ERROR`.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    History(#[from] HistoryCodecError),

    #[error("provider error: {0}")]
    Provider(#[source] ProviderError),

    #[error(transparent)]
    Dispatch(#[from] ToolDispatchError),

    #[error("tool phase budget of {limit} exceeded")]
    PhaseBudgetExceeded { limit: usize },

    #[error("client disconnected")]
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Idle,
    Dispatch,
    ToolLoop,
    Answering,
    Complete,
    Error,
}

struct StateTrace(TurnState);

impl StateTrace {
    fn advance(&mut self, next: TurnState) {
        trace!(from = ?self.0, to = ?next, "turn state");
        self.0 = next;
    }
}

/// Where a turn's events go. Detached sinks drop events silently.
struct EventSink {
    sender: Option<mpsc::Sender<StreamEvent>>,
}

impl EventSink {
    async fn emit(&self, event: StreamEvent) -> Result<(), TurnError> {
        match &self.sender {
            Some(sender) => sender.send(event).await.map_err(|_| TurnError::Disconnected),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<(), TurnError> {
        match &self.sender {
            Some(sender) if sender.is_closed() => Err(TurnError::Disconnected),
            _ => Ok(()),
        }
    }

    async fn finish(self, event: StreamEvent) {
        debug_assert!(event.is_terminal());
        if self.emit(event).await.is_err() {
            warn!("client disconnected before the terminal event");
        }
    }
}

/// Call ids handed out within one agent turn.
#[derive(Debug, Default)]
struct CallIds {
    used: HashSet<String>,
    next: usize,
}

impl CallIds {
    /// Keeps the provider's id unless it is empty or already used.
    fn assign(&mut self, requested: &str) -> String {
        if !requested.is_empty() && self.used.insert(requested.to_string()) {
            return requested.to_string();
        }
        loop {
            self.next += 1;
            let candidate = format!("call_{}", self.next);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

pub struct EventMultiplexer {
    provider: Arc<dyn RunProvider>,
    dispatcher: Arc<dyn ToolDispatcher>,
    instructions: String,
    policy: ChunkPolicy,
    max_tool_phases: usize,
}

impl fmt::Debug for EventMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventMultiplexer")
            .field("provider", &self.provider.profile())
            .field("policy", &self.policy)
            .field("max_tool_phases", &self.max_tool_phases)
            .finish_non_exhaustive()
    }
}

impl EventMultiplexer {
    pub fn new(
        provider: Arc<dyn RunProvider>,
        dispatcher: Arc<dyn ToolDispatcher>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            instructions: instructions.into(),
            policy: ChunkPolicy::default(),
            max_tool_phases: DEFAULT_MAX_TOOL_PHASES,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ChunkPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_max_tool_phases(mut self, max_tool_phases: usize) -> Self {
        self.max_tool_phases = max_tool_phases;
        self
    }

    pub fn profile(&self) -> ProviderProfile {
        self.provider.profile()
    }

    pub fn policy(&self) -> &ChunkPolicy {
        &self.policy
    }

    /// Runs a turn, sending every event to `events`. The returned outcome
    /// mirrors the terminal event.
    pub async fn run_turn(
        &self,
        request: RunRequest,
        events: mpsc::Sender<StreamEvent>,
    ) -> TurnOutcome {
        self.drive(
            request,
            EventSink {
                sender: Some(events),
            },
        )
        .await
    }

    /// Runs a turn without an event channel.
    pub async fn run_to_outcome(&self, request: RunRequest) -> TurnOutcome {
        self.drive(request, EventSink { sender: None }).await
    }

    #[instrument(skip_all, name = "agent_turn")]
    async fn drive(&self, request: RunRequest, sink: EventSink) -> TurnOutcome {
        info!(prompt_chars = request.prompt.chars().count(), "agent turn started");
        let mut state = StateTrace(TurnState::Idle);

        match self.run_steps(request, &sink, &mut state).await {
            Ok((answer, history)) => {
                state.advance(TurnState::Complete);
                sink.finish(StreamEvent::Complete {
                    history: history.clone(),
                })
                .await;
                info!(answer_chars = answer.chars().count(), "agent turn completed");
                TurnOutcome::Completed { answer, history }
            }
            Err(TurnError::Disconnected) => {
                state.advance(TurnState::Error);
                warn!("client disconnected; abandoning agent turn");
                TurnOutcome::Failed {
                    message: TurnError::Disconnected.to_string(),
                }
            }
            Err(error) => {
                state.advance(TurnState::Error);
                let message = error.to_string();
                warn!(%message, "agent turn failed");
                sink.finish(StreamEvent::error(message.clone())).await;
                TurnOutcome::Failed { message }
            }
        }
    }

    async fn run_steps(
        &self,
        request: RunRequest,
        sink: &EventSink,
        state: &mut StateTrace,
    ) -> Result<(String, String), TurnError> {
        let mut turns = history_codec::decode(&request.history)?;
        turns.push(Turn::user(request.prompt));

        let tools = self.dispatcher.definitions();
        let instructions = self.instructions_with_inventory(&tools);
        let mut call_ids = CallIds::default();
        let mut phases = 0;
        let mut step_index = 0;

        let answer = loop {
            sink.ensure_open()?;
            state.advance(TurnState::Dispatch);
            let step = self
                .provider
                .step(StepRequest {
                    turns: turns.clone(),
                    instructions: instructions.clone(),
                    tools: tools.clone(),
                    step_index,
                })
                .await
                .map_err(TurnError::Provider)?;
            step_index += 1;

            match step {
                Step::ToolCalls(calls) if !calls.is_empty() => {
                    if phases == self.max_tool_phases {
                        return Err(TurnError::PhaseBudgetExceeded {
                            limit: self.max_tool_phases,
                        });
                    }
                    phases += 1;
                    state.advance(TurnState::ToolLoop);
                    self.run_tool_phase(calls, &mut turns, &mut call_ids, sink)
                        .await?;
                }
                Step::ToolCalls(_) => break String::new(),
                Step::Answer(stream) => {
                    state.advance(TurnState::Answering);
                    break self.stream_answer(stream, sink).await?;
                }
            }
        };

        turns.push(Turn::assistant(answer.clone()));
        let history = history_codec::encode(&turns)?;
        Ok((answer, history))
    }

    async fn run_tool_phase(
        &self,
        calls: Vec<ToolCallRequest>,
        turns: &mut Vec<Turn>,
        call_ids: &mut CallIds,
        sink: &EventSink,
    ) -> Result<(), TurnError> {
        sink.emit(StreamEvent::ToolPhaseStart).await?;

        for call in calls {
            let call_id = call_ids.assign(&call.call_id);
            let record = ToolCallRecord::new(
                call_id.clone(),
                call.tool_name.clone(),
                call.arguments.clone(),
            );
            turns.push(Turn::ToolCall(record.clone()));
            sink.emit(StreamEvent::ToolCall(record)).await?;

            let output = self
                .dispatcher
                .dispatch(ToolCallRequest {
                    call_id: call_id.clone(),
                    ..call
                })
                .await?;

            let result = if output.ok {
                ToolResultRecord::success(call_id, output.content)
            } else {
                ToolResultRecord::failure(call_id, output.content)
            };
            turns.push(Turn::ToolResult(result.clone()));
            sink.emit(StreamEvent::ToolResult(result)).await?;
        }

        sink.emit(StreamEvent::ToolPhaseEnd).await
    }

    async fn stream_answer(
        &self,
        mut stream: AnswerStream,
        sink: &EventSink,
    ) -> Result<String, TurnError> {
        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment.map_err(TurnError::Provider)?;
            if fragment.is_empty() {
                continue;
            }
            answer.push_str(&fragment);
            for piece in self.fragment_pieces(fragment) {
                sink.emit(StreamEvent::chunk(piece)).await?;
            }
        }
        Ok(answer)
    }

    /// Oversized fragments go out as several chunks of at most the soft threshold.
    fn fragment_pieces(&self, fragment: String) -> Vec<String> {
        let threshold = self.policy.soft_threshold;
        if threshold == 0 || fragment.chars().count() <= threshold {
            return vec![fragment];
        }
        match chunk_codec::split(&fragment, threshold) {
            Ok(chunks) => chunks.into_iter().map(|chunk| chunk.text).collect(),
            Err(_) => vec![fragment],
        }
    }

    fn instructions_with_inventory(&self, tools: &[ToolDefinition]) -> String {
        if tools.is_empty() {
            return self.instructions.clone();
        }

        let mut instructions = self.instructions.clone();
        instructions.push_str("\n\nAvailable tools:");
        for tool in tools {
            instructions.push_str("\n- ");
            instructions.push_str(&tool.name);
            if let Some(description) = &tool.description {
                instructions.push_str(": ");
                instructions.push_str(description);
            }
        }
        instructions
    }
}
