//! Built-in agent runtime with no model behind it.
//!
//! Persists user input and answers with a plain acknowledgment. Deployments
//! plug a model-backed runtime in through [`RuntimeFactory`]; this one keeps
//! the server usable without one and doubles as the runtime used by the
//! manager's tests.

use crate::interactor::Interactor;
use crate::store::ThreadStore;
use crate::{AgentRuntime, RuntimeFactory};
use ai_thread_common::{
    AgentEvent, MessageContent, ProjectName, Result, Role, ThreadEvent, ThreadId, Username,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct EchoRuntime {
    store: Arc<ThreadStore>,
    interactor: Interactor,
    inbound_tx: mpsc::UnboundedSender<ThreadEvent>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<ThreadEvent>>,
    username: Username,
}

impl EchoRuntime {
    pub fn new(username: Username) -> (Arc<Self>, mpsc::Receiver<ThreadEvent>) {
        let (interactor, events_rx) = Interactor::channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let runtime = Arc::new(Self {
            store: Arc::new(ThreadStore::new()),
            interactor,
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            username,
        });
        (runtime, events_rx)
    }

    async fn handle_answer(
        &self,
        answer: String,
        content: Vec<MessageContent>,
    ) {
        let mut blocks = content;
        if !answer.is_empty() {
            blocks.insert(0, MessageContent::text(answer.clone()));
        }

        let user_message: ThreadEvent = AgentEvent::Message {
            timestamp: Some(self.store.next_timestamp()),
            role: Role::User,
            name: self.username.as_str().to_string(),
            content: blocks,
        }
        .into();
        self.store.append(user_message.clone());
        self.interactor.emit(user_message).await;

        self.interactor.thinking().await;

        let reply: ThreadEvent = AgentEvent::Message {
            timestamp: Some(self.store.next_timestamp()),
            role: Role::Assistant,
            name: "assistant".to_string(),
            content: vec![MessageContent::text(format!("Received: {answer}"))],
        }
        .into();
        self.store.append(reply.clone());
        self.interactor.emit(reply).await;

        self.interactor.invite("What next?").await;
    }
}

#[async_trait]
impl AgentRuntime for EchoRuntime {
    async fn run(&self, cancel: CancellationToken) {
        self.interactor.invite("What can I do for you?").await;
        let mut rx = self.inbound_rx.lock().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                inbound = rx.recv() => match inbound {
                    Some(ThreadEvent::Agent(AgentEvent::Answer { answer, content, .. })) => {
                        self.handle_answer(answer, content).await;
                    }
                    Some(ThreadEvent::Agent(AgentEvent::OauthCallback { state, .. })) => {
                        info!(state = %state, "delivering oauth callback to integrations");
                    }
                    Some(other) => {
                        debug!(event_type = other.event_type(), "ignoring inbound event");
                    }
                    None => break,
                },
            }
        }
    }

    async fn push_event(&self, event: ThreadEvent) -> Result<()> {
        self.inbound_tx
            .send(event)
            .map_err(|_| ai_thread_common::ThreadError::Backend("runtime stopped".to_string()))
    }

    fn history(&self) -> Vec<ThreadEvent> {
        self.store.history()
    }

    fn message(&self, event_id: &str) -> Option<ThreadEvent> {
        self.store.get(event_id)
    }

    fn truncate(&self, event_id: &str) -> Result<usize> {
        self.store.truncate_from(event_id)
    }

    fn stop(&self) {
        // Turns are synchronous acknowledgments; nothing in flight to cancel.
    }

    async fn shutdown(&self) {}
}

/// Factory producing one [`EchoRuntime`] per thread.
#[derive(Default)]
pub struct EchoRuntimeFactory;

impl EchoRuntimeFactory {
    pub fn new() -> Self {
        Self
    }
}

impl RuntimeFactory for EchoRuntimeFactory {
    fn create(
        &self,
        thread_id: &ThreadId,
        _project: &ProjectName,
        username: &Username,
    ) -> Result<(Arc<dyn AgentRuntime>, mpsc::Receiver<ThreadEvent>)> {
        debug!(thread_id = %thread_id, "creating echo runtime");
        let (runtime, events) = EchoRuntime::new(username.clone());
        Ok((runtime, events))
    }
}
