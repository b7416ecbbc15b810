use std::collections::HashSet;

use agent_protocol::Turn;

use crate::error::HistoryCodecError;
use crate::schema::{HistoryDocument, TurnRecord, VersionProbe, HISTORY_VERSION};

/// Wire form of an empty history.
pub const EMPTY_HISTORY: &str = "";

/// Encodes `turns` into the versioned wire form.
///
/// The empty history encodes to [`EMPTY_HISTORY`]. Histories that break call
/// correlation are refused rather than written.
pub fn encode(turns: &[Turn]) -> Result<String, HistoryCodecError> {
    if turns.is_empty() {
        return Ok(EMPTY_HISTORY.to_string());
    }

    validate_history(turns)?;

    let document = HistoryDocument {
        version: HISTORY_VERSION,
        turns: turns.iter().map(TurnRecord::from).collect(),
    };
    serde_json::to_string(&document).map_err(HistoryCodecError::serialize)
}

pub fn decode(encoded: &str) -> Result<Vec<Turn>, HistoryCodecError> {
    if encoded.trim().is_empty() {
        return Ok(Vec::new());
    }

    let probe: VersionProbe = serde_json::from_str(encoded).map_err(HistoryCodecError::json)?;
    if probe.version != HISTORY_VERSION {
        return Err(HistoryCodecError::UnsupportedVersion {
            found: probe.version,
            expected: HISTORY_VERSION,
        });
    }

    let document: HistoryDocument =
        serde_json::from_str(encoded).map_err(HistoryCodecError::json)?;
    let turns: Vec<Turn> = document.turns.into_iter().map(Turn::from).collect();

    validate_history(&turns)?;
    Ok(turns)
}

/// Checks call correlation: every tool result answers a pending call, every
/// call is answered before the next message, and call ids are unique within
/// one agent turn (the span that starts at a user message).
pub fn validate_history(turns: &[Turn]) -> Result<(), HistoryCodecError> {
    let mut pending: Vec<(usize, &str)> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for (index, turn) in turns.iter().enumerate() {
        match turn {
            Turn::UserMessage { .. } | Turn::AssistantMessage { .. } => {
                if let Some((opened_at, call_id)) = pending.first() {
                    return Err(HistoryCodecError::unresolved(*opened_at, *call_id));
                }
                if matches!(turn, Turn::UserMessage { .. }) {
                    seen.clear();
                }
            }
            Turn::ToolCall(record) => {
                if record.call_id.is_empty() {
                    return Err(HistoryCodecError::EmptyCallId { index });
                }
                if !seen.insert(record.call_id.as_str()) {
                    return Err(HistoryCodecError::DuplicateCallId {
                        index,
                        call_id: record.call_id.clone(),
                    });
                }
                pending.push((index, record.call_id.as_str()));
            }
            Turn::ToolResult(record) => {
                let Some(position) = pending
                    .iter()
                    .position(|(_, call_id)| *call_id == record.call_id)
                else {
                    return Err(HistoryCodecError::unmatched(index, &record.call_id));
                };
                pending.remove(position);
            }
        }
    }

    match pending.first() {
        Some((opened_at, call_id)) => Err(HistoryCodecError::unresolved(*opened_at, *call_id)),
        None => Ok(()),
    }
}
