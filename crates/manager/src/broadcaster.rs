//! Fan-out of one thread's event stream to its live SSE subscribers.
//!
//! Each subscriber is a bounded channel whose receiver becomes the HTTP
//! response body, so broadcasting never touches a socket: sends are
//! non-blocking and a full or closed channel marks the subscriber dead.
//! The broadcast lock is held only across those non-blocking sends, which
//! also serializes frames per subscriber (no torn writes).

use ai_thread_common::ThreadEvent;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Frames buffered per subscriber before it is considered dead.
pub const SUBSCRIBER_BUFFER: usize = 1024;

pub type SubscriberId = Uuid;

/// One browser SSE connection.
pub struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Bytes>,
}

impl Subscriber {
    /// Create a subscriber and the receiver that feeds its response body.
    pub fn channel() -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Non-blocking write. `false` means the subscriber is gone (closed) or
    /// hopelessly behind (full buffer); either way it gets dropped.
    fn push(&self, frame: &Bytes) -> bool {
        match self.tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Closed(_)) => false,
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = %self.id, "subscriber buffer full, dropping connection");
                false
            }
        }
    }
}

/// Encode one event as an SSE frame: `data: <single-line JSON>\n\n`.
/// JSON escaping guarantees no raw newlines inside the payload.
pub(crate) fn encode_frame(event: &ThreadEvent) -> Option<Bytes> {
    match serde_json::to_vec(event) {
        Ok(json) => {
            let mut buf = Vec::with_capacity(json.len() + 8);
            buf.extend_from_slice(b"data: ");
            buf.extend_from_slice(&json);
            buf.extend_from_slice(b"\n\n");
            Some(Bytes::from(buf))
        }
        Err(e) => {
            error!(error = %e, "failed to encode event, skipping broadcast");
            None
        }
    }
}

/// The set of live subscribers for one thread.
#[derive(Default)]
pub struct Broadcaster {
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, sub: Subscriber) {
        self.subscribers.lock().await.entry(sub.id).or_insert(sub);
    }

    /// Insert a subscriber with the thread's replayed history already queued.
    ///
    /// Runs under the broadcast lock, so every replay frame lands in the new
    /// subscriber's channel before any concurrent broadcast can reach it.
    pub async fn add_with_replay(&self, sub: Subscriber, history: &[ThreadEvent]) {
        let mut subs = self.subscribers.lock().await;
        if subs.contains_key(&sub.id) {
            return;
        }
        for event in history {
            let Some(frame) = encode_frame(event) else {
                continue;
            };
            if !sub.push(&frame) {
                warn!(subscriber = %sub.id, "replay overflowed subscriber buffer, dropping connection");
                return;
            }
        }
        subs.insert(sub.id, sub);
    }

    pub async fn remove(&self, id: SubscriberId) {
        self.subscribers.lock().await.remove(&id);
    }

    /// Write the same frame to every live subscriber, evicting dead ones.
    /// Never fails; a bad subscriber cannot affect the others.
    pub async fn broadcast(&self, event: &ThreadEvent) {
        let Some(frame) = encode_frame(event) else {
            return;
        };
        let mut subs = self.subscribers.lock().await;
        let dead: Vec<SubscriberId> = subs
            .iter()
            .filter(|(_, sub)| !sub.push(&frame))
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            subs.remove(&id);
            debug!(subscriber = %id, "removed unreachable subscriber");
        }
    }

    /// End every subscriber's stream and clear the set.
    pub async fn close_all(&self) {
        // Dropping the senders closes the response streams.
        self.subscribers.lock().await.clear();
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}
