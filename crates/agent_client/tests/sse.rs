use agent_client::SseFrameParser;
use agent_protocol::{StreamEvent, ToolCallRecord};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;

fn ok_events(results: Vec<Result<StreamEvent, agent_protocol::FrameError>>) -> Vec<StreamEvent> {
    results
        .into_iter()
        .map(|result| result.expect("well-formed frame"))
        .collect()
}

#[test]
fn sse_framing_parses_typed_frames() {
    let call = json!({"call_id": "call_1", "tool_name": "read", "arguments": {"path": "a"}});
    let payload = format!(
        concat!(
            "data: {{\"type\":\"tool_phase_start\",\"content\":\"\"}}\n\n",
            "data: {{\"type\":\"tool_call\",\"content\":{call}}}\n\n",
            ":\n\n",
            "data: {{\"type\":\"chunk\",\"content\":\"Hi\"}}\n\n",
            "data: {{\"type\":\"complete\",\"content\":\"\"}}\n\n"
        ),
        call = serde_json::to_string(&call.to_string()).expect("quoted")
    );

    let events = ok_events(SseFrameParser::parse_frames(&payload));

    assert_eq!(events.len(), 4);
    assert_eq!(events[0], StreamEvent::ToolPhaseStart);
    assert_matches!(&events[1], StreamEvent::ToolCall(ToolCallRecord { call_id, tool_name, .. })
        if call_id == "call_1" && tool_name == "read");
    assert_eq!(events[2], StreamEvent::chunk("Hi"));
    assert_eq!(
        events[3],
        StreamEvent::Complete {
            history: String::new()
        }
    );
}

#[test]
fn frames_split_across_chunks_are_reassembled() {
    let payload = "data: {\"type\":\"chunk\",\"content\":\"h\u{e9}llo \u{1F600}\"}\n\ndata: {\"type\":\"error\",\"content\":\"boom\"}\n\n";
    let bytes = payload.as_bytes();
    let mut parser = SseFrameParser::default();
    let mut events = Vec::new();

    for piece in bytes.chunks(3) {
        events.extend(ok_events(parser.feed(piece)));
    }

    assert_eq!(
        events,
        vec![
            StreamEvent::chunk("h\u{e9}llo \u{1F600}"),
            StreamEvent::error("boom"),
        ]
    );
    assert!(parser.is_empty_buffer());
}

#[test]
fn crlf_separated_frames_are_accepted() {
    let events = ok_events(SseFrameParser::parse_frames(
        "data: {\"type\":\"chunk\",\"content\":\"a\"}\r\n\r\ndata: {\"type\":\"chunk\",\"content\":\"b\"}\r\n\r\n",
    ));
    assert_eq!(events, vec![StreamEvent::chunk("a"), StreamEvent::chunk("b")]);
}

#[test]
fn a_trailing_frame_without_separator_is_flushed() {
    let events = ok_events(SseFrameParser::parse_frames(
        "data: {\"type\":\"complete\",\"content\":\"h\"}",
    ));
    assert_eq!(
        events,
        vec![StreamEvent::Complete {
            history: "h".to_string()
        }]
    );
}

#[test]
fn malformed_frames_surface_as_errors_in_order() {
    let results = SseFrameParser::parse_frames(concat!(
        "data: {broken-json\n\n",
        "data: {\"type\":\"mystery\",\"content\":\"\"}\n\n",
        "data: {\"type\":\"tool_result\",\"content\":\"not json\"}\n\n",
        "data: {\"type\":\"chunk\",\"content\":\"x\"}\n\n"
    ));

    assert_eq!(results.len(), 4);
    assert!(results[..3].iter().all(Result::is_err));
    assert_eq!(results[3].as_ref().ok(), Some(&StreamEvent::chunk("x")));
}
