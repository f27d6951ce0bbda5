//! One live thread instance: connection bookkeeping, timers, oneshot flag,
//! and the execution backend behind it.

use crate::broadcaster::{Broadcaster, Subscriber, SubscriberId};
use crate::local::LocalBackend;
use crate::remote::RemoteBackend;
use crate::timeout::TimeoutSupervisor;
use ai_thread_common::{
    AgentEvent, ProjectName, Result, ThreadError, ThreadEvent, ThreadId, Username,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Creation options. Oneshot threads (webhook-driven, no interactive
/// subscriber) run against the shorter inactivity timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceOptions {
    pub oneshot: bool,
}

/// The execution strategy behind an instance.
pub enum Backend {
    Local(LocalBackend),
    Remote(RemoteBackend),
}

struct ConnectionState {
    connections: HashSet<SubscriberId>,
    oneshot: bool,
}

pub struct ThreadInstance {
    thread_id: ThreadId,
    project: ProjectName,
    username: Username,
    broadcaster: Arc<Broadcaster>,
    // Shared with the backends so their outbound streams count as activity.
    timeouts: Arc<TimeoutSupervisor>,
    state: Mutex<ConnectionState>,
    backend: Backend,
    cleaned: AtomicBool,
}

impl ThreadInstance {
    pub fn new(
        thread_id: ThreadId,
        project: ProjectName,
        username: Username,
        broadcaster: Arc<Broadcaster>,
        timeouts: Arc<TimeoutSupervisor>,
        backend: Backend,
        options: InstanceOptions,
    ) -> Self {
        Self {
            thread_id,
            project,
            username,
            broadcaster,
            timeouts,
            state: Mutex::new(ConnectionState {
                connections: HashSet::new(),
                oneshot: options.oneshot,
            }),
            backend,
            cleaned: AtomicBool::new(false),
        }
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn project(&self) -> &ProjectName {
        &self.project
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Arm the inactivity timer for the first time. Called once by the
    /// registry right after construction; the timer stays armed for the
    /// instance's whole life. The disconnect timer is not armed here: it
    /// runs from the last disconnection, so never-connected (webhook)
    /// instances answer to the inactivity policy alone.
    pub async fn arm_initial_timers(&self) {
        let oneshot = self.state.lock().await.oneshot;
        self.timeouts.reset_inactivity(oneshot).await;
    }

    /// Attach one SSE connection. Clears the oneshot flag, counts as
    /// activity, and replays history to the new subscriber when the local
    /// backend is already prepared.
    pub async fn add_connection(&self, sub: Subscriber) {
        let replay = {
            let mut state = self.state.lock().await;
            if !state.connections.insert(sub.id()) {
                return;
            }
            state.oneshot = false;
            matches!(&self.backend, Backend::Local(local) if local.is_prepared())
        };

        if replay {
            let history = match &self.backend {
                Backend::Local(local) => local.history(),
                Backend::Remote(_) => Vec::new(),
            };
            self.broadcaster.add_with_replay(sub, &history).await;
        } else {
            self.broadcaster.add(sub).await;
        }

        self.timeouts.disarm_disconnect().await;
        self.timeouts.reset_inactivity(false).await;
        debug!(thread_id = %self.thread_id, "connection added");
    }

    /// Detach one SSE connection; arms the disconnect timer when the last
    /// one goes. The instance itself stays registered.
    pub async fn remove_connection(&self, id: SubscriberId) {
        let emptied = {
            let mut state = self.state.lock().await;
            state.connections.remove(&id) && state.connections.is_empty()
        };
        self.broadcaster.remove(id).await;
        if emptied {
            self.timeouts.arm_disconnect().await;
            debug!(thread_id = %self.thread_id, "last connection removed, disconnect timer armed");
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Flag this instance as oneshot. A no-op while interactive subscribers
    /// are attached.
    pub async fn mark_oneshot(&self) {
        let mut state = self.state.lock().await;
        if !state.connections.is_empty() {
            return;
        }
        state.oneshot = true;
        drop(state);
        self.timeouts.reset_inactivity(true).await;
    }

    pub async fn is_oneshot(&self) -> bool {
        self.state.lock().await.oneshot
    }

    /// Time since the last activity (connection, inbound message, or
    /// outbound broadcast from the backend).
    pub fn inactive_for(&self) -> Duration {
        self.timeouts.inactive_for()
    }

    /// Broadcast a keep-alive. Skipped entirely without subscribers.
    pub async fn send_heartbeat(&self) {
        if self.broadcaster.subscriber_count().await > 0 {
            self.broadcaster.broadcast(&ThreadEvent::heartbeat()).await;
        }
    }

    /// Construct the backend's execution resources without starting a turn.
    pub async fn prepare(&self) -> Result<bool> {
        match &self.backend {
            Backend::Local(local) => local.prepare().await,
            Backend::Remote(remote) => remote.prepare().await,
        }
    }

    /// Start execution. Safe to call on every new connection; an already
    /// running backend reports `false`.
    pub async fn start(&self) -> Result<bool> {
        match &self.backend {
            Backend::Local(local) => local.start().await,
            Backend::Remote(remote) => remote.prepare().await,
        }
    }

    /// Halt the current turn; the instance remains usable.
    pub async fn stop(&self) {
        match &self.backend {
            Backend::Local(local) => local.stop(),
            Backend::Remote(remote) => remote.stop().await,
        }
    }

    /// Route an inbound user event to the backend. Counts as activity.
    pub async fn handle_inbound(&self, event: ThreadEvent) -> Result<()> {
        self.timeouts.touch();
        match &self.backend {
            Backend::Local(local) => local.push_event(event).await,
            Backend::Remote(remote) => match event {
                ThreadEvent::Agent(AgentEvent::Answer {
                    answer,
                    invite_id,
                    content,
                    ..
                }) => {
                    if !content.is_empty() {
                        return Err(ThreadError::NotSupported(
                            "image input is not available on the remote backend".to_string(),
                        ));
                    }
                    remote.send_message(&answer, invite_id.as_deref()).await
                }
                ThreadEvent::Agent(AgentEvent::OauthCallback { .. }) => {
                    Err(ThreadError::NotSupported(
                        "oauth callbacks are not available on the remote backend".to_string(),
                    ))
                }
                other => Err(ThreadError::InvalidInput(format!(
                    "cannot route inbound event of type {}",
                    other.event_type()
                ))),
            },
        }
    }

    /// Persisted history of the thread.
    pub fn messages(&self) -> Result<Vec<ThreadEvent>> {
        match &self.backend {
            Backend::Local(local) => Ok(local.history()),
            Backend::Remote(_) => Err(ThreadError::NotSupported(
                "message listing is not available on the remote backend".to_string(),
            )),
        }
    }

    pub fn message(&self, event_id: &str) -> Result<Option<ThreadEvent>> {
        match &self.backend {
            Backend::Local(local) => Ok(local.message(event_id)),
            Backend::Remote(_) => Err(ThreadError::NotSupported(
                "message lookup is not available on the remote backend".to_string(),
            )),
        }
    }

    /// Truncate the history at a user message. Not broadcast to other
    /// subscribers; their view goes stale until reload.
    pub fn truncate(&self, event_id: &str) -> Result<usize> {
        match &self.backend {
            Backend::Local(local) => local.truncate(event_id),
            Backend::Remote(_) => Err(ThreadError::NotSupported(
                "message deletion is not available on the remote backend".to_string(),
            )),
        }
    }

    /// Full teardown: timers, backend, subscribers. Idempotent.
    pub async fn cleanup(&self) {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }
        self.timeouts.cancel().await;
        match &self.backend {
            Backend::Local(local) => local.cleanup().await,
            Backend::Remote(remote) => remote.cleanup().await,
        }
        self.broadcaster.close_all().await;
        info!(thread_id = %self.thread_id, "instance cleaned up");
    }
}
