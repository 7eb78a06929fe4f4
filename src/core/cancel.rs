//! Per-request cancellation tied to the lifetime of the response body.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Handle for abandoning in-flight provider work when the client disconnects.
///
/// One handle is created per stream session. The response body side calls
/// [`cancel`](Self::cancel) when it is dropped; the orchestrator calls
/// [`mark_completed`](Self::mark_completed) when it closes the stream itself,
/// which turns the later body drop into a no-op.
#[derive(Clone)]
pub struct StreamCancelHandle {
    sender: watch::Sender<bool>,
    receiver: watch::Receiver<bool>,
    completed: Arc<AtomicBool>,
}

impl StreamCancelHandle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender,
            receiver,
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the stream as closed by the server after its terminal event.
    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Signal cancellation (only if not already completed)
    pub fn cancel(&self) {
        if !self.is_completed() {
            let _ = self.sender.send(true);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Get a receiver for use in select!
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.receiver.clone()
    }

    /// Resolves once the stream has been cancelled. Never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // The handle owns the sender, so the channel cannot close under us.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for StreamCancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
