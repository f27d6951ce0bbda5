//! Remote execution backend.
//!
//! Delegates execution to an AgentOS case over HTTP: create the case, hold a
//! long-lived streaming GET on its event feed, translate remote events into
//! the local taxonomy, and forward outbound user input as POSTs. The local
//! process is purely a protocol adaptor here.

pub mod mapper;
pub mod sse;

use crate::broadcaster::Broadcaster;
use crate::timeout::TimeoutSupervisor;
use ai_thread_common::{ProjectName, Result, ThreadError, ThreadEvent, ThreadId, Username};
use futures::StreamExt;
use mapper::{is_uuid, map_remote_event};
use serde::{Deserialize, Serialize};
use sse::SseParser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct CreateCaseRequest<'a> {
    #[serde(rename = "projectId")]
    project_id: &'a str,
}

#[derive(Deserialize)]
struct CreateCaseResponse {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    content: &'a str,
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer_to_event_id: Option<&'a str>,
}

pub struct RemoteBackend {
    http: reqwest::Client,
    base_url: String,
    thread_id: ThreadId,
    project: ProjectName,
    username: Username,
    broadcaster: Arc<Broadcaster>,
    timeouts: Arc<TimeoutSupervisor>,
    case_id: Mutex<Option<String>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
}

impl RemoteBackend {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        thread_id: ThreadId,
        project: ProjectName,
        username: Username,
        broadcaster: Arc<Broadcaster>,
        timeouts: Arc<TimeoutSupervisor>,
    ) -> Self {
        Self {
            http,
            base_url,
            thread_id,
            project,
            username,
            broadcaster,
            timeouts,
            case_id: Mutex::new(None),
            consumer: Mutex::new(None),
            cancel: CancellationToken::new(),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create the remote case and start consuming its event stream.
    /// Returns `false` when a case already exists. The remote starts
    /// emitting on creation, so `start()` is this same operation.
    pub async fn prepare(&self) -> Result<bool> {
        let mut case = self.case_id.lock().await;
        if case.is_some() {
            return Ok(false);
        }

        let url = format!("{}/api/cases", self.base_url);
        let created: CreateCaseResponse = self
            .http
            .post(&url)
            .json(&CreateCaseRequest {
                project_id: self.project.as_str(),
            })
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| ThreadError::Backend(format!("case creation failed: {e}")))?
            .json()
            .await
            .map_err(|e| ThreadError::Backend(format!("malformed case response: {e}")))?;

        info!(thread_id = %self.thread_id, case_id = %created.id, "remote case created");
        *case = Some(created.id.clone());
        drop(case);

        self.spawn_consumer(created.id).await;

        // Unblock the browser before the remote produces anything.
        self.broadcaster.broadcast(&ThreadEvent::invite("")).await;
        Ok(true)
    }

    async fn spawn_consumer(&self, case_id: String) {
        let http = self.http.clone();
        let url = format!("{}/api/cases/{}/events", self.base_url, case_id);
        let broadcaster = self.broadcaster.clone();
        let timeouts = self.timeouts.clone();
        let cancel = self.cancel.child_token();
        let connected = self.connected.clone();

        connected.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            consume_events(http, url, broadcaster, timeouts, cancel, connected).await;
        });
        *self.consumer.lock().await = Some(handle);
    }

    /// Whether the event stream is currently attached.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Forward user input to the case. `answer_to_event_id` is only passed
    /// on when it is a canonical UUID; local timestamp ids never qualify
    /// (the two id spaces do not line up, see [`mapper::is_uuid`]).
    pub async fn send_message(&self, content: &str, answer_to_event_id: Option<&str>) -> Result<()> {
        self.prepare().await?;
        let case_id = self
            .case_id
            .lock()
            .await
            .clone()
            .ok_or_else(|| ThreadError::Backend("no remote case".to_string()))?;

        let answer_to = answer_to_event_id.filter(|id| {
            let ok = is_uuid(id);
            if !ok {
                debug!(answer_to = %id, "dropping non-UUID answerToEventId");
            }
            ok
        });

        let url = format!("{}/api/cases/{}/messages", self.base_url, case_id);
        self.http
            .post(&url)
            .json(&SendMessageRequest {
                content,
                user_id: self.username.as_str(),
                answer_to_event_id: answer_to,
            })
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| ThreadError::Backend(format!("message forwarding failed: {e}")))?;
        Ok(())
    }

    /// Fire-and-forget halt of the current remote turn.
    pub async fn stop(&self) {
        let Some(case_id) = self.case_id.lock().await.clone() else {
            return;
        };
        let url = format!("{}/api/cases/{}/stop", self.base_url, case_id);
        let http = self.http.clone();
        tokio::spawn(async move {
            if let Err(e) = http.post(&url).send().await {
                debug!(error = %e, "remote stop failed");
            }
        });
    }

    /// Cancel the consumer and destroy the case best-effort. Idempotent.
    pub async fn cleanup(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.consumer.lock().await.take() {
            handle.abort();
        }
        self.connected.store(false, Ordering::SeqCst);

        let case_id = self.case_id.lock().await.take();
        if let Some(case_id) = case_id {
            let url = format!("{}/api/cases/{}", self.base_url, case_id);
            if let Err(e) = self.http.delete(&url).send().await {
                warn!(case_id = %case_id, error = %e, "remote case deletion failed");
            }
            debug!(thread_id = %self.thread_id, case_id = %case_id, "remote backend cleaned up");
        }
    }
}

/// Drive the streaming GET until cancellation or stream end. No automatic
/// reconnection: a dropped stream leaves the instance to its timeouts.
async fn consume_events(
    http: reqwest::Client,
    url: String,
    broadcaster: Arc<Broadcaster>,
    timeouts: Arc<TimeoutSupervisor>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
) {
    let response = match http
        .get(&url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
    {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, "remote event stream connection failed");
            broadcaster
                .broadcast(&ThreadEvent::error(format!("remote stream error: {e}")))
                .await;
            connected.store(false, Ordering::SeqCst);
            return;
        }
    };

    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    for record in parser.feed(&bytes) {
                        if let Some(event) = map_remote_event(&record) {
                            // Remote output counts as activity, the same as
                            // a locally streaming turn.
                            timeouts.touch();
                            broadcaster.broadcast(&event).await;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "remote event stream failed");
                    broadcaster
                        .broadcast(&ThreadEvent::error(format!("remote stream error: {e}")))
                        .await;
                    break;
                }
                None => {
                    debug!("remote event stream ended");
                    break;
                }
            },
        }
    }
    connected.store(false, Ordering::SeqCst);
}
