//! Outbound event handle given to agent code.
//!
//! A bounded channel decouples producers from the broadcast side: the
//! manager drains the receiver from a single task, which provides ordering
//! and keeps broadcast work out of agent code.

use ai_thread_common::{AgentEvent, ThreadEvent};
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the producer-side event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct Interactor {
    tx: mpsc::Sender<ThreadEvent>,
}

impl Interactor {
    pub fn channel() -> (Self, mpsc::Receiver<ThreadEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Emit one event. Dropped silently once the consumer side is gone.
    pub async fn emit(&self, event: impl Into<ThreadEvent>) {
        if self.tx.send(event.into()).await.is_err() {
            debug!("event dropped, consumer side closed");
        }
    }

    pub async fn invite(&self, text: impl Into<String>) {
        self.emit(ThreadEvent::invite(text)).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        self.emit(ThreadEvent::warn(message)).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.emit(ThreadEvent::error(message)).await;
    }

    pub async fn thinking(&self) {
        self.emit(AgentEvent::Thinking { timestamp: None }).await;
    }
}
