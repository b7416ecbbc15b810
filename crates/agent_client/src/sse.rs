use agent_protocol::{FrameError, StreamEvent, WireFrame};

/// Incremental parser for the server's SSE byte stream.
///
/// Bytes are buffered until a blank line closes a frame, so frames split
/// across network chunks (even inside a multi-byte character) decode intact.
/// Comment-only frames such as keep-alives yield nothing.
#[derive(Debug, Default)]
pub struct SseFrameParser {
    buffer: Vec<u8>,
}

impl SseFrameParser {
    /// Feed arbitrary bytes and drain every completed frame.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent, FrameError>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some((end, separator)) = frame_boundary(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + separator).take(end).collect();
            if let Some(event) = decode_frame(&frame) {
                events.push(event);
            }
        }

        events
    }

    /// Decode whatever remains once the byte stream has ended.
    pub fn finish(&mut self) -> Option<Result<StreamEvent, FrameError>> {
        let frame = std::mem::take(&mut self.buffer);
        decode_frame(&frame)
    }

    /// Parse a complete SSE payload in one shot.
    pub fn parse_frames(input: &str) -> Vec<Result<StreamEvent, FrameError>> {
        let mut parser = Self::default();
        let mut events = parser.feed(input.as_bytes());
        events.extend(parser.finish());
        events
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

/// Position of the first frame terminator and its length.
fn frame_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find(buffer, b"\n\n").map(|index| (index, 2));
    let crlf = find(buffer, b"\r\n\r\n").map(|index| (index, 4));
    match (lf, crlf) {
        (Some(lf), Some(crlf)) => Some(if crlf.0 < lf.0 { crlf } else { lf }),
        (lf, crlf) => lf.or(crlf),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn decode_frame(frame: &[u8]) -> Option<Result<StreamEvent, FrameError>> {
    let text = String::from_utf8_lossy(frame);
    let payload = extract_data_payload(&text)?;
    Some(WireFrame::from_json(&payload).and_then(WireFrame::into_event))
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if data_lines.is_empty() || data_lines.iter().all(|line| line.trim().is_empty()) {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
