//! Event emitter: the outbound newline-delimited event protocol.
//!
//! The producer side is an [`EventSink`] handed to the orchestrator and the
//! provider adapters. The consumer side is the HTTP response body built by
//! [`ndjson_response`], which serializes each [`Event`] as one JSON object
//! followed by `\n` the moment it arrives. A bounded channel connects the two,
//! so a slow client suspends `emit` instead of growing a buffer.

use crate::api::disconnect::DisconnectStream;
use crate::core::{get_metrics, StreamCancelHandle, TransportError};
use axum::{
    body::{Body, Bytes},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events buffered between producer and response body before `emit` waits.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Reason sent to the client for any provider failure.
pub const GENERIC_ERROR_REASON: &str = "Server error";

/// One record of the outbound stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Incremental generated text
    #[serde(rename = "text")]
    TextFragment { data: String },

    /// Finished image, as a data URL or a remote URL
    #[serde(rename = "image")]
    ImageResult { data: String },

    /// Prompt refused by the content policy; always the last event
    #[serde(rename = "blocked")]
    Blocked { reason: String },

    /// Request failed; always the last event
    #[serde(rename = "error")]
    Error { reason: String },
}

impl Event {
    pub fn text(data: impl Into<String>) -> Self {
        Event::TextFragment { data: data.into() }
    }

    pub fn image(data: impl Into<String>) -> Self {
        Event::ImageResult { data: data.into() }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Event::Blocked {
            reason: reason.into(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Event::Error {
            reason: reason.into(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Event::TextFragment { .. } => "text",
            Event::ImageResult { .. } => "image",
            Event::Blocked { .. } => "blocked",
            Event::Error { .. } => "error",
        }
    }

    /// Blocked and Error end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Blocked { .. } | Event::Error { .. })
    }

    /// Serialize as a single newline-terminated JSON record.
    pub fn to_ndjson(&self) -> Result<Bytes, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(Bytes::from(line))
    }
}

/// Write side of one stream session.
///
/// Not `Clone`: exactly one owner drives a session, and [`close`](Self::close)
/// consumes it so nothing can be written after the terminal event.
pub struct EventSink {
    tx: mpsc::Sender<Event>,
    cancel: StreamCancelHandle,
}

impl EventSink {
    /// Create a sink and the receiver the response body drains.
    pub fn channel(cancel: StreamCancelHandle) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self { tx, cancel }, rx)
    }

    /// Deliver one event, in call order.
    ///
    /// Fails once the client is gone; callers must stop emitting then.
    pub async fn emit(&self, event: Event) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError);
        }
        let event_type = event.event_type();
        self.tx.send(event).await.map_err(|_| TransportError)?;
        get_metrics()
            .events_emitted
            .with_label_values(&[event_type])
            .inc();
        Ok(())
    }

    /// Resolves when the client disconnects.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// End the stream. Dropping the last sender ends the response body.
    pub fn close(self) {
        self.cancel.mark_completed();
        drop(self.tx);
    }
}

/// Build the streaming HTTP response that drains `rx`.
///
/// Headers are committed immediately; the body then yields one line per event
/// until the sink is closed.
pub fn ndjson_response(
    mut rx: mpsc::Receiver<Event>,
    cancel: StreamCancelHandle,
    request_id: String,
) -> Response {
    let lines = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield event.to_ndjson();
        }
    };
    let body = DisconnectStream::new(Box::pin(lines), cancel, request_id);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// Parse an NDJSON body back into events.
///
/// Used by the non-streaming endpoint's tests and by clients of this crate.
pub fn parse_ndjson(body: &[u8]) -> Result<Vec<Event>, serde_json::Error> {
    body.split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(|line| serde_json::from_slice(line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_event_wire_shapes() {
        assert_eq!(
            serde_json::to_value(Event::text("hi")).unwrap(),
            json!({"type": "text", "data": "hi"})
        );
        assert_eq!(
            serde_json::to_value(Event::image("https://img/1.png")).unwrap(),
            json!({"type": "image", "data": "https://img/1.png"})
        );
        assert_eq!(
            serde_json::to_value(Event::blocked("Disallowed content: nude")).unwrap(),
            json!({"type": "blocked", "reason": "Disallowed content: nude"})
        );
        assert_eq!(
            serde_json::to_value(Event::error(GENERIC_ERROR_REASON)).unwrap(),
            json!({"type": "error", "reason": "Server error"})
        );
    }

    #[test]
    fn test_to_ndjson_is_single_line() {
        let line = Event::text("line one\nline two").to_ndjson().unwrap();
        assert!(line.ends_with(b"\n"));
        assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn test_terminal_events() {
        assert!(Event::blocked("x").is_terminal());
        assert!(Event::error("x").is_terminal());
        assert!(!Event::text("x").is_terminal());
        assert!(!Event::image("x").is_terminal());
    }

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let body = b"{\"type\":\"text\",\"data\":\"a\"}\n\n{\"type\":\"error\",\"reason\":\"Server error\"}\n";
        let events = parse_ndjson(body).unwrap();
        assert_eq!(events, vec![Event::text("a"), Event::error("Server error")]);
    }

    #[tokio::test]
    async fn test_emit_preserves_order() {
        let (sink, mut rx) = EventSink::channel(StreamCancelHandle::new());

        let producer = async move {
            for i in 0..100 {
                sink.emit(Event::text(i.to_string())).await.unwrap();
            }
            sink.close();
        };
        let consumer = async move {
            let mut seen = Vec::new();
            while let Some(event) = rx.recv().await {
                seen.push(event);
            }
            seen
        };

        let ((), seen) = tokio::join!(producer, consumer);
        let expected: Vec<Event> = (0..100).map(|i| Event::text(i.to_string())).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_emit_fails_after_receiver_dropped() {
        let (sink, rx) = EventSink::channel(StreamCancelHandle::new());
        drop(rx);
        assert_eq!(sink.emit(Event::text("lost")).await, Err(TransportError));
    }

    #[tokio::test]
    async fn test_emit_fails_after_cancel() {
        let cancel = StreamCancelHandle::new();
        let (sink, _rx) = EventSink::channel(cancel.clone());
        cancel.cancel();
        assert!(sink.is_cancelled());
        assert_eq!(sink.emit(Event::text("late")).await, Err(TransportError));
    }

    #[tokio::test]
    async fn test_ndjson_response_headers_and_body() {
        let cancel = StreamCancelHandle::new();
        let (sink, rx) = EventSink::channel(cancel.clone());
        let response = ndjson_response(rx, cancel.clone(), "req-1".to_string());

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

        tokio::spawn(async move {
            sink.emit(Event::text("Hel")).await.unwrap();
            sink.emit(Event::text("lo")).await.unwrap();
            sink.close();
        });

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(
            &body[..],
            b"{\"type\":\"text\",\"data\":\"Hel\"}\n{\"type\":\"text\",\"data\":\"lo\"}\n"
        );
        // Closed by the server, so dropping the body is not a disconnect.
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropping_body_cancels_open_session() {
        let cancel = StreamCancelHandle::new();
        let (sink, rx) = EventSink::channel(cancel.clone());
        let response = ndjson_response(rx, cancel.clone(), "req-2".to_string());

        drop(response);

        assert!(cancel.is_cancelled());
        assert_eq!(sink.emit(Event::text("nobody listening")).await, Err(TransportError));
    }
}
