#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use agent_protocol::api::RunRequest;
use agent_protocol::{FrameType, StreamEvent, Turn};
use agent_provider::{ToolCallRequest, ToolDefinition};
use agent_provider_mock::MockProvider;
use agent_server::{EventMultiplexer, ToolDispatchError, ToolDispatcher, ToolOutput, TurnOutcome};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

/// Dispatcher double that records calls and answers from a fixed rule.
#[derive(Default)]
pub struct RecordingDispatcher {
    calls: Mutex<Vec<ToolCallRequest>>,
    fail_tools: Vec<String>,
    crash_tools: Vec<String>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tools whose calls come back as failed outputs.
    pub fn failing(mut self, tool_name: &str) -> Self {
        self.fail_tools.push(tool_name.to_string());
        self
    }

    /// Tools whose calls fail with a dispatcher infrastructure error.
    pub fn crashing(mut self, tool_name: &str) -> Self {
        self.crash_tools.push(tool_name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ToolCallRequest> {
        lock_unpoisoned(&self.calls).clone()
    }
}

#[async_trait]
impl ToolDispatcher for RecordingDispatcher {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "read".to_string(),
            description: Some("Read a file".to_string()),
            input_schema: json!({"type": "object"}),
        }]
    }

    async fn dispatch(&self, call: ToolCallRequest) -> Result<ToolOutput, ToolDispatchError> {
        lock_unpoisoned(&self.calls).push(call.clone());

        if self.crash_tools.contains(&call.tool_name) {
            let source = tokio::spawn(async { panic!("tool worker crashed") })
                .await
                .expect_err("task should panic");
            return Err(ToolDispatchError::Worker {
                tool_name: call.tool_name,
                source,
            });
        }
        if self.fail_tools.contains(&call.tool_name) {
            return Ok(ToolOutput::fail(format!("{} failed", call.tool_name)));
        }
        Ok(ToolOutput::ok(format!("output of {}", call.tool_name)))
    }
}

pub fn multiplexer(
    provider: &Arc<MockProvider>,
    dispatcher: &Arc<RecordingDispatcher>,
) -> EventMultiplexer {
    EventMultiplexer::new(
        Arc::clone(provider) as Arc<dyn agent_provider::RunProvider>,
        Arc::clone(dispatcher) as Arc<dyn ToolDispatcher>,
        "test instructions",
    )
}

/// Runs one turn to completion and returns every emitted event.
pub async fn collect_turn(
    multiplexer: &EventMultiplexer,
    prompt: &str,
    history: &str,
) -> (Vec<StreamEvent>, TurnOutcome) {
    let (sender, mut receiver) = mpsc::channel(1024);
    let outcome = multiplexer
        .run_turn(RunRequest::new(prompt, history), sender)
        .await;

    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    (events, outcome)
}

pub fn frame_types(events: &[StreamEvent]) -> Vec<FrameType> {
    events.iter().map(StreamEvent::frame_type).collect()
}

pub fn answer_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Chunk { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

pub fn completed_history(events: &[StreamEvent]) -> Vec<Turn> {
    match events.last() {
        Some(StreamEvent::Complete { history }) => {
            history_codec::decode(history).expect("complete carries valid history")
        }
        other => panic!("expected a COMPLETE event last, got {other:?}"),
    }
}

/// Checks `(START (CALL RESULT)+ END)* CHUNK* (COMPLETE|ERROR)`. The
/// terminal may also follow a partial phase when a turn fails mid-phase.
pub fn assert_event_grammar(events: &[StreamEvent]) {
    let terminal_count = events.iter().filter(|event| event.is_terminal()).count();
    assert_eq!(terminal_count, 1, "exactly one terminal event: {events:?}");
    assert!(
        events.last().is_some_and(StreamEvent::is_terminal),
        "terminal event must be last: {events:?}"
    );

    let mut in_phase = false;
    let mut expect_result = false;
    let mut calls_in_phase = 0;
    let mut answering = false;
    for event in &events[..events.len() - 1] {
        match event {
            StreamEvent::ToolPhaseStart => {
                assert!(!in_phase && !answering, "unexpected phase start: {events:?}");
                in_phase = true;
                calls_in_phase = 0;
            }
            StreamEvent::ToolCall(_) => {
                assert!(in_phase && !expect_result, "unexpected call: {events:?}");
                expect_result = true;
                calls_in_phase += 1;
            }
            StreamEvent::ToolResult(_) => {
                assert!(in_phase && expect_result, "unexpected result: {events:?}");
                expect_result = false;
            }
            StreamEvent::ToolPhaseEnd => {
                assert!(
                    in_phase && !expect_result && calls_in_phase > 0,
                    "unexpected phase end: {events:?}"
                );
                in_phase = false;
            }
            StreamEvent::Chunk { .. } => {
                assert!(!in_phase, "chunk inside a tool phase: {events:?}");
                answering = true;
            }
            StreamEvent::Complete { .. } | StreamEvent::Error { .. } => unreachable!(),
        }
    }

    if matches!(events.last(), Some(StreamEvent::Complete { .. })) {
        assert!(!in_phase, "COMPLETE inside an open tool phase: {events:?}");
    }
}

pub fn arguments(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("arguments must be an object")
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
