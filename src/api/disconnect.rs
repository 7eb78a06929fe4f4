use crate::core::StreamCancelHandle;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Response body wrapper that fires the session's cancel handle when dropped.
///
/// axum drops the body when the client disconnects; it also drops it after the
/// last chunk of a normally finished stream, which is why the handle ignores
/// `cancel()` once the orchestrator has marked the session completed.
pub struct DisconnectStream<S> {
    pub stream: S,
    pub cancel_handle: StreamCancelHandle,
    pub request_id: String,
}

impl<S> DisconnectStream<S> {
    pub fn new(stream: S, cancel_handle: StreamCancelHandle, request_id: String) -> Self {
        Self {
            stream,
            cancel_handle,
            request_id,
        }
    }
}

impl<S> Stream for DisconnectStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl<S> Drop for DisconnectStream<S> {
    fn drop(&mut self) {
        if !self.cancel_handle.is_completed() {
            tracing::info!(
                request_id = %self.request_id,
                "Client disconnect detected - abandoning stream"
            );
        }
        self.cancel_handle.cancel();
    }
}
