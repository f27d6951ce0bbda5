//! Per-thread message history.
//!
//! Holds the replayable conversation (message events) in memory for the
//! lifetime of the instance. Event ids are monotonic timestamp strings; the
//! persistence layer proper (on-disk thread repositories) lives outside this
//! subsystem.

use ai_thread_common::{Result, ThreadError, ThreadEvent};
use chrono::{SecondsFormat, Utc};
use std::sync::Mutex;

#[derive(Default)]
struct StoreInner {
    events: Vec<ThreadEvent>,
    seq: u64,
}

/// In-memory message log for one thread.
#[derive(Default)]
pub struct ThreadStore {
    inner: Mutex<StoreInner>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next event id: an RFC3339 timestamp with a monotonic suffix so ids
    /// stay unique and ordered within one process.
    pub fn next_timestamp(&self) -> String {
        let mut inner = self.inner.lock().expect("thread store lock");
        inner.seq += 1;
        format!(
            "{}-{:05}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            inner.seq
        )
    }

    pub fn append(&self, event: ThreadEvent) {
        self.inner.lock().expect("thread store lock").events.push(event);
    }

    pub fn history(&self) -> Vec<ThreadEvent> {
        self.inner.lock().expect("thread store lock").events.clone()
    }

    pub fn get(&self, event_id: &str) -> Option<ThreadEvent> {
        self.inner
            .lock()
            .expect("thread store lock")
            .events
            .iter()
            .find(|e| e.timestamp() == Some(event_id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("thread store lock").events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the identified user message and everything after it.
    ///
    /// Rejected when the id is unknown, the event is not a user message, or
    /// it is the first message of the thread. Returns the number of removed
    /// events.
    pub fn truncate_from(&self, event_id: &str) -> Result<usize> {
        let mut inner = self.inner.lock().expect("thread store lock");
        let index = inner
            .events
            .iter()
            .position(|e| e.timestamp() == Some(event_id))
            .ok_or_else(|| ThreadError::InvalidInput(format!("unknown message: {event_id}")))?;

        if !inner.events[index].is_user_message() {
            return Err(ThreadError::InvalidInput(format!(
                "message {event_id} is not a user message"
            )));
        }
        if index == 0 {
            return Err(ThreadError::InvalidInput(
                "cannot delete the first message of a thread".to_string(),
            ));
        }

        let removed = inner.events.len() - index;
        inner.events.truncate(index);
        Ok(removed)
    }
}
