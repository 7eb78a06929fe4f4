//! Incremental Server-Sent Events parser for upstream token streams.
//!
//! Bytes are buffered until a full line is available, so events split across
//! network chunks (or across a multi-byte character) are reassembled intact.

/// SSE event parsed from stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: Option<String>,
}

impl SseEvent {
    fn is_empty(&self) -> bool {
        self.event.is_none() && self.data.is_none()
    }
}

/// SSE parser state.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    current: SseEvent,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if line.is_empty() {
                // Blank line: event boundary
                if !self.current.is_empty() {
                    events.push(std::mem::take(&mut self.current));
                }
                continue;
            }

            self.apply_line(&String::from_utf8_lossy(&line));
        }
        events
    }

    /// Flush a trailing event the upstream did not terminate with a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&line);
            self.apply_line(line.trim_end_matches('\r'));
        }
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current))
        }
    }

    fn apply_line(&mut self, line: &str) {
        if line.starts_with(':') {
            // Comment, ignore
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.current.event = Some(value.to_string()),
            "data" => match self.current.data {
                Some(ref mut data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.current.data = Some(value.to_string()),
            },
            _ => {}
        }
    }
}
