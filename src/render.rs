use std::io::{self, Write};

use agent_protocol::{StreamEvent, ToolCallRecord, ToolResultRecord, Turn};

const PREVIEW_CHARS: usize = 120;

/// Line-oriented renderer for one turn's events.
///
/// Answer text streams to `out` as it arrives; tool activity is shown as
/// indented status lines and errors go to `err` with an `error:` prefix.
#[derive(Debug)]
pub struct TurnRenderer<O, E> {
    out: O,
    err: E,
    mid_line: bool,
}

impl<O: Write, E: Write> TurnRenderer<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            mid_line: false,
        }
    }

    pub fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }

    pub fn render(&mut self, event: &StreamEvent) -> io::Result<()> {
        match event {
            StreamEvent::ToolPhaseStart | StreamEvent::ToolPhaseEnd => {}
            StreamEvent::ToolCall(call) => {
                self.end_line()?;
                writeln!(self.out, "  {}", call_line(call))?;
            }
            StreamEvent::ToolResult(result) => {
                self.end_line()?;
                writeln!(self.out, "  {}", result_line(result))?;
            }
            StreamEvent::Chunk { text } => {
                write!(self.out, "{text}")?;
                self.mid_line = !text.ends_with('\n');
            }
            StreamEvent::Complete { .. } => self.end_line()?,
            StreamEvent::Error { message } => {
                self.end_line()?;
                writeln!(self.err, "error: {message}")?;
                self.err.flush()?;
            }
        }
        self.out.flush()
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.mid_line {
            writeln!(self.out)?;
            self.mid_line = false;
        }
        Ok(())
    }
}

fn call_line(call: &ToolCallRecord) -> String {
    let arguments = serde_json::Value::Object(call.arguments.clone()).to_string();
    format!("-> {} {}", call.tool_name, preview(&arguments))
}

fn result_line(result: &ToolResultRecord) -> String {
    let status = if result.failed { "failed" } else { "ok" };
    format!("<- {status}: {}", preview(&result.output))
}

/// First line of `text`, shortened for a status line.
fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    let mut preview: String = first_line.chars().take(PREVIEW_CHARS).collect();
    let more_lines = text.lines().nth(1).is_some();
    if first_line.chars().count() > PREVIEW_CHARS || more_lines {
        preview.push_str(" ...");
    }
    preview
}

/// One line per history entry, for `/history`.
pub fn history_summary(history: &[Turn]) -> String {
    if history.is_empty() {
        return "(no history)".to_string();
    }

    history
        .iter()
        .enumerate()
        .map(|(index, turn)| {
            let detail = match turn {
                Turn::UserMessage { text } | Turn::AssistantMessage { text } => preview(text),
                Turn::ToolCall(call) => format!("{} [{}]", call.tool_name, call.call_id),
                Turn::ToolResult(result) => {
                    let status = if result.failed { "failed" } else { "ok" };
                    format!("{status} [{}]", result.call_id)
                }
            };
            format!("{:>3}. {:<14} {detail}", index + 1, turn.kind())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
