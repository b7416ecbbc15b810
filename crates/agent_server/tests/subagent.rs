mod support;

use std::fs;
use std::sync::Arc;

use agent_protocol::{StreamEvent, ToolResultRecord, Turn};
use agent_provider::RunProvider;
use agent_provider_mock::{MockProvider, MockStep};
use agent_server::{
    AllowList, BuiltinDispatcher, EventMultiplexer, SubagentSpawner, TurnOutcome, ToolRegistry,
};
use assert_matches::assert_matches;
use chunk_codec::ChunkPolicy;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::{tempdir, TempDir};

use support::{assert_event_grammar, collect_turn};

fn parent_agent(root: &TempDir, script: Vec<MockStep>) -> (Arc<MockProvider>, EventMultiplexer) {
    let provider = Arc::new(MockProvider::new(script));
    let shared: Arc<dyn RunProvider> = provider.clone();

    let allowlist = AllowList::with_dirs([root.path()]).expect("allow root");
    let dispatcher =
        BuiltinDispatcher::new(ToolRegistry::full(), allowlist, ChunkPolicy::default())
            .with_subagents(SubagentSpawner::new(Arc::clone(&shared), "sub instructions", 5));
    let multiplexer = EventMultiplexer::new(shared, Arc::new(dispatcher), "parent instructions");

    (provider, multiplexer)
}

fn tool_results(events: &[StreamEvent]) -> Vec<ToolResultRecord> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::ToolResult(record) => Some(record.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn subagent_answer_becomes_the_tool_output() {
    let root = tempdir().expect("tempdir");
    fs::write(root.path().join("notes.txt"), "x").expect("write");
    let (provider, multiplexer) = parent_agent(
        &root,
        vec![
            MockStep::tool(
                "spawn_subagent",
                json!({"prompt": "list the files", "tool_names": ["list_files"], "context": "repo tour"}),
            ),
            MockStep::tool("list_files", json!({"path": root.path().to_string_lossy()})),
            MockStep::answer("one file"),
            MockStep::answer("the sub-agent found one file"),
        ],
    );

    let (events, outcome) = collect_turn(&multiplexer, "how many files?", "").await;

    assert_event_grammar(&events);
    let calls = events
        .iter()
        .filter(|event| matches!(event, StreamEvent::ToolCall(_)))
        .count();
    assert_eq!(calls, 1, "sub-agent events stay internal");
    assert_eq!(
        tool_results(&events),
        vec![ToolResultRecord::success("call_1", "one file")]
    );
    assert_matches!(outcome, TurnOutcome::Completed { answer, .. } if answer == "the sub-agent found one file");

    let requests = provider.recorded_requests();
    assert_eq!(requests.len(), 4);
    let sub_tools: Vec<&str> = requests[1]
        .tools
        .iter()
        .map(|tool| tool.name.as_str())
        .collect();
    assert_eq!(sub_tools, vec!["list_files"]);
    assert!(requests[1].instructions.starts_with("sub instructions"));
    assert_eq!(
        requests[1].turns,
        vec![Turn::user("repo tour\n\nlist the files")]
    );
    assert_eq!(
        requests[2].turns.last(),
        Some(&Turn::ToolResult(ToolResultRecord::success("call_1", "notes.txt")))
    );
}

#[tokio::test]
async fn subagent_cannot_spawn_further_subagents() {
    let root = tempdir().expect("tempdir");
    let (provider, multiplexer) = parent_agent(
        &root,
        vec![
            MockStep::tool(
                "spawn_subagent",
                json!({"prompt": "recurse", "tool_names": ["read", "spawn_subagent", "bash"]}),
            ),
            MockStep::answer("refused"),
        ],
    );

    let (events, outcome) = collect_turn(&multiplexer, "go", "").await;

    let results = tool_results(&events);
    assert_eq!(results.len(), 1);
    assert!(results[0].failed);
    assert_eq!(
        results[0].output,
        r#"invalid tool names: ["spawn_subagent", "bash"]"#
    );
    assert_matches!(outcome, TurnOutcome::Completed { .. });
    assert_eq!(provider.recorded_requests().len(), 2);
}

#[tokio::test]
async fn subagent_failure_is_a_failed_tool_result() {
    let root = tempdir().expect("tempdir");
    let (_provider, multiplexer) = parent_agent(
        &root,
        vec![
            MockStep::tool("spawn_subagent", json!({"prompt": "try", "tool_names": []})),
            MockStep::Fail("model down".to_string()),
            MockStep::answer("the sub-agent failed"),
        ],
    );

    let (events, outcome) = collect_turn(&multiplexer, "go", "").await;

    assert_eq!(
        tool_results(&events),
        vec![ToolResultRecord::failure(
            "call_1",
            "sub-agent failed: provider error: model down"
        )]
    );
    assert_matches!(outcome, TurnOutcome::Completed { .. });
}

#[tokio::test]
async fn subagent_tools_outside_its_subset_are_unknown_to_it() {
    let root = tempdir().expect("tempdir");
    fs::write(root.path().join("keep.txt"), "x").expect("write");
    let keep = root.path().join("keep.txt");
    let (provider, multiplexer) = parent_agent(
        &root,
        vec![
            MockStep::tool("spawn_subagent", json!({"prompt": "clean up", "tool_names": ["read"]})),
            MockStep::tool("rm", json!({"path": keep.to_string_lossy()})),
            MockStep::answer("could not remove"),
            MockStep::answer("done"),
        ],
    );

    let (events, _) = collect_turn(&multiplexer, "go", "").await;

    assert_eq!(
        tool_results(&events),
        vec![ToolResultRecord::success("call_1", "could not remove")]
    );
    assert_eq!(
        provider.recorded_requests()[2].turns.last(),
        Some(&Turn::ToolResult(ToolResultRecord::failure(
            "call_1",
            "unknown tool: rm"
        )))
    );
    assert!(keep.exists());
}
