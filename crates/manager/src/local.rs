//! In-process execution backend.
//!
//! Wires an agent runtime's event stream into the broadcaster and runs the
//! agent loop as a background task. A single drain task owns all broadcast
//! calls, which gives event ordering and keeps re-entrancy out of agent code.

use crate::broadcaster::Broadcaster;
use crate::timeout::TimeoutSupervisor;
use ai_thread_common::{ProjectName, Result, ThreadError, ThreadEvent, ThreadId, Username};
use ai_thread_runtime::{AgentRuntime, RuntimeFactory};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct LocalBackend {
    thread_id: ThreadId,
    project: ProjectName,
    username: Username,
    factory: Arc<dyn RuntimeFactory>,
    broadcaster: Arc<Broadcaster>,
    timeouts: Arc<TimeoutSupervisor>,
    runtime: OnceLock<Arc<dyn AgentRuntime>>,
    drain: Mutex<Option<JoinHandle<()>>>,
    agent_loop: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl LocalBackend {
    pub fn new(
        thread_id: ThreadId,
        project: ProjectName,
        username: Username,
        factory: Arc<dyn RuntimeFactory>,
        broadcaster: Arc<Broadcaster>,
        timeouts: Arc<TimeoutSupervisor>,
    ) -> Self {
        Self {
            thread_id,
            project,
            username,
            factory,
            broadcaster,
            timeouts,
            runtime: OnceLock::new(),
            drain: Mutex::new(None),
            agent_loop: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Construct the runtime and subscribe its event stream to the
    /// broadcaster. Does not start the agent loop. Returns `false` when
    /// already prepared.
    pub async fn prepare(&self) -> Result<bool> {
        if self.runtime.get().is_some() {
            return Ok(false);
        }
        let (runtime, mut events) =
            self.factory
                .create(&self.thread_id, &self.project, &self.username)?;
        if self.runtime.set(runtime).is_err() {
            // Lost a prepare race; the winner's runtime stands.
            return Ok(false);
        }

        let broadcaster = self.broadcaster.clone();
        let timeouts = self.timeouts.clone();
        let thread_id = self.thread_id.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                // A streaming turn counts as activity; only true idleness
                // runs the inactivity timer down.
                timeouts.touch();
                broadcaster.broadcast(&event).await;
            }
            debug!(thread_id = %thread_id, "runtime event stream ended");
        });
        *self.drain.lock().await = Some(handle);

        info!(thread_id = %self.thread_id, "local backend prepared");
        Ok(true)
    }

    /// Prepare, then kick the agent loop in the background. Returns `false`
    /// when the loop was already running. Loop failures are the runtime's to
    /// report as `error` events; nothing propagates from here.
    pub async fn start(&self) -> Result<bool> {
        self.prepare().await?;
        let mut slot = self.agent_loop.lock().await;
        if slot.is_some() {
            return Ok(false);
        }
        let runtime = self
            .runtime
            .get()
            .cloned()
            .ok_or_else(|| ThreadError::Backend("runtime missing after prepare".to_string()))?;
        let cancel = self.cancel.child_token();
        *slot = Some(tokio::spawn(async move {
            runtime.run(cancel).await;
        }));
        info!(thread_id = %self.thread_id, "agent loop started");
        Ok(true)
    }

    pub fn is_prepared(&self) -> bool {
        self.runtime.get().is_some()
    }

    /// Persisted message history for replaying to a late subscriber.
    pub fn history(&self) -> Vec<ThreadEvent> {
        self.runtime
            .get()
            .map(|r| r.history())
            .unwrap_or_default()
    }

    pub fn message(&self, event_id: &str) -> Option<ThreadEvent> {
        self.runtime.get().and_then(|r| r.message(event_id))
    }

    pub fn truncate(&self, event_id: &str) -> Result<usize> {
        let runtime = self
            .runtime
            .get()
            .ok_or_else(|| ThreadError::NotFound("thread has no runtime yet".to_string()))?;
        runtime.truncate(event_id)
    }

    pub async fn push_event(&self, event: ThreadEvent) -> Result<()> {
        let runtime = self
            .runtime
            .get()
            .ok_or_else(|| ThreadError::NotFound("thread has no runtime yet".to_string()))?;
        runtime.push_event(event).await
    }

    /// Cooperatively cancel the current turn. The instance remains usable.
    pub fn stop(&self) {
        if let Some(runtime) = self.runtime.get() {
            runtime.stop();
        }
    }

    /// Tear down the runtime and its tasks. Idempotent.
    pub async fn cleanup(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.agent_loop.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.drain.lock().await.take() {
            handle.abort();
        }
        if let Some(runtime) = self.runtime.get() {
            runtime.shutdown().await;
        }
        debug!(thread_id = %self.thread_id, "local backend cleaned up");
    }
}
