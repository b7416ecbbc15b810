use agent_protocol::{ToolCallRecord, ToolResultRecord, Turn};
use assert_matches::assert_matches;
use history_codec::{decode, encode, HistoryCodecError};
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

fn arguments(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("arguments must be an object")
}

fn sample_history() -> Vec<Turn> {
    vec![
        Turn::user("read file.py"),
        Turn::ToolCall(ToolCallRecord::new(
            "call_1",
            "read",
            arguments(json!({"path": "file.py", "max_lines": 50})),
        )),
        Turn::ToolResult(ToolResultRecord::success("call_1", "print('hi')\n")),
        Turn::ToolCall(ToolCallRecord::new(
            "call_2",
            "grep",
            arguments(json!({"pattern": "\"quoted\"\\n", "path": "."})),
        )),
        Turn::ToolResult(ToolResultRecord::failure("call_2", "Access denied")),
        Turn::assistant("The file prints `hi`.\n\n```py\nprint('hi')\n```"),
        Turn::user("thanks ☃"),
        Turn::assistant(""),
    ]
}

fn decode_json(value: Value) -> Result<Vec<Turn>, HistoryCodecError> {
    decode(&value.to_string())
}

#[test]
fn round_trip_preserves_every_variant_and_field() {
    let history = sample_history();
    let encoded = encode(&history).expect("encode");
    assert_eq!(decode(&encoded).expect("decode"), history);

    // Re-encoding the decoded value is byte-identical.
    assert_eq!(
        encode(&decode(&encoded).expect("decode")).expect("encode"),
        encoded
    );
}

#[test]
fn float_arguments_survive_the_round_trip_exactly() {
    let values = [
        0.001_000_200_000_000_000_1_f64,
        f64::from_bits(0x305f_050c_368d_cc74),
        0.1 + 0.2,
        -2.225_073_858_507_201e-308,
    ];

    for value in values {
        let history = vec![
            Turn::user("scale it"),
            Turn::ToolCall(ToolCallRecord::new(
                "call_1",
                "resize",
                arguments(json!({"factor": value})),
            )),
            Turn::ToolResult(ToolResultRecord::success("call_1", "ok")),
        ];

        let decoded = decode(&encode(&history).expect("encode")).expect("decode");
        assert_eq!(decoded, history);
        let Turn::ToolCall(call) = &decoded[1] else {
            panic!("expected a tool call, got {:?}", decoded[1]);
        };
        let factor = call.arguments["factor"].as_f64().expect("float argument");
        assert_eq!(factor.to_bits(), value.to_bits(), "{value:e}");
    }
}

#[test]
fn call_ids_may_repeat_across_agent_turns() {
    let history = vec![
        Turn::user("one"),
        Turn::ToolCall(ToolCallRecord::new("call_1", "list_files", Map::new())),
        Turn::ToolResult(ToolResultRecord::success("call_1", "a.txt")),
        Turn::assistant("done"),
        Turn::user("two"),
        Turn::ToolCall(ToolCallRecord::new("call_1", "list_files", Map::new())),
        Turn::ToolResult(ToolResultRecord::success("call_1", "b.txt")),
        Turn::assistant("done again"),
    ];

    let encoded = encode(&history).expect("encode");
    assert_eq!(decode(&encoded).expect("decode"), history);
}

#[test]
fn encoded_form_tags_each_turn_with_its_kind() {
    let encoded = encode(&sample_history()).expect("encode");
    let value: Value = serde_json::from_str(&encoded).expect("json");

    assert_eq!(value["version"], 1);
    let kinds: Vec<&str> = value["turns"]
        .as_array()
        .expect("turns array")
        .iter()
        .map(|turn| turn["kind"].as_str().expect("kind"))
        .collect();
    assert_eq!(
        kinds,
        vec![
            "user_message",
            "tool_call",
            "tool_result",
            "tool_call",
            "tool_result",
            "assistant_message",
            "user_message",
            "assistant_message",
        ]
    );
}

#[test]
fn decode_rejects_unparseable_input() {
    assert_matches!(decode("not json"), Err(HistoryCodecError::Json { .. }));
    assert_matches!(decode("[]"), Err(HistoryCodecError::Json { .. }));
}

#[test]
fn decode_rejects_unknown_kind_and_fields() {
    let unknown_kind = json!({"version": 1, "turns": [{"kind": "system", "text": "x"}]});
    assert_matches!(decode_json(unknown_kind), Err(HistoryCodecError::Json { .. }));

    let extra_field = json!({
        "version": 1,
        "turns": [{"kind": "user_message", "text": "x", "extra": true}]
    });
    assert_matches!(decode_json(extra_field), Err(HistoryCodecError::Json { .. }));
}

#[test]
fn decode_rejects_other_versions() {
    let future = json!({"version": 2, "turns": [], "metadata": {}});
    assert_matches!(
        decode_json(future),
        Err(HistoryCodecError::UnsupportedVersion {
            found: 2,
            expected: 1,
        })
    );
}

#[test]
fn decode_rejects_result_without_call() {
    let orphan = json!({
        "version": 1,
        "turns": [
            {"kind": "user_message", "text": "go"},
            {"kind": "tool_result", "call_id": "missing", "output": "", "failed": false}
        ]
    });
    let error = decode_json(orphan).expect_err("orphan result must fail");
    assert_matches!(
        &error,
        HistoryCodecError::UnmatchedToolResult { index: 1, call_id } if call_id == "missing"
    );
    assert!(error.to_string().starts_with("malformed history"));
}

#[test]
fn decode_rejects_result_before_its_call() {
    let reversed = json!({
        "version": 1,
        "turns": [
            {"kind": "user_message", "text": "go"},
            {"kind": "tool_result", "call_id": "c1", "output": "", "failed": false},
            {"kind": "tool_call", "call_id": "c1", "tool_name": "read", "arguments": {}}
        ]
    });
    assert_matches!(
        decode_json(reversed),
        Err(HistoryCodecError::UnmatchedToolResult { index: 1, .. })
    );
}

#[test]
fn decode_rejects_call_left_unanswered() {
    let dangling = json!({
        "version": 1,
        "turns": [
            {"kind": "user_message", "text": "go"},
            {"kind": "tool_call", "call_id": "c1", "tool_name": "read", "arguments": {}},
            {"kind": "assistant_message", "text": "done"}
        ]
    });
    assert_matches!(
        decode_json(dangling),
        Err(HistoryCodecError::UnresolvedToolCall { index: 1, .. })
    );

    let trailing = json!({
        "version": 1,
        "turns": [
            {"kind": "user_message", "text": "go"},
            {"kind": "tool_call", "call_id": "c1", "tool_name": "read", "arguments": {}}
        ]
    });
    assert_matches!(
        decode_json(trailing),
        Err(HistoryCodecError::UnresolvedToolCall { index: 1, .. })
    );
}

#[test]
fn decode_rejects_reused_call_id_within_one_agent_turn() {
    let reused = json!({
        "version": 1,
        "turns": [
            {"kind": "user_message", "text": "go"},
            {"kind": "tool_call", "call_id": "c1", "tool_name": "read", "arguments": {}},
            {"kind": "tool_result", "call_id": "c1", "output": "", "failed": false},
            {"kind": "tool_call", "call_id": "c1", "tool_name": "read", "arguments": {}},
            {"kind": "tool_result", "call_id": "c1", "output": "", "failed": false}
        ]
    });
    assert_matches!(
        decode_json(reused),
        Err(HistoryCodecError::DuplicateCallId { index: 3, .. })
    );
}

#[test]
fn decode_rejects_empty_call_id() {
    let empty = json!({
        "version": 1,
        "turns": [
            {"kind": "tool_call", "call_id": "", "tool_name": "read", "arguments": {}}
        ]
    });
    assert_matches!(
        decode_json(empty),
        Err(HistoryCodecError::EmptyCallId { index: 0 })
    );
}
