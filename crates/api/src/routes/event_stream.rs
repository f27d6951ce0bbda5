//! The SSE endpoint: one long-lived response per browser tab.

use crate::middleware::auth::AuthUser;
use crate::server::AppState;
use crate::types::{error_response, from_thread_error, ApiError};
use ai_thread_common::{ProjectName, ThreadId};
use ai_thread_manager::{InstanceOptions, InstanceRegistry, Subscriber, SubscriberId};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, instrument};

/// Deregisters the connection when the response stream is dropped,
/// whichever way the client goes away.
struct ConnectionGuard {
    registry: Arc<InstanceRegistry>,
    thread_id: ThreadId,
    subscriber: SubscriberId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let registry = self.registry.clone();
        let thread_id = self.thread_id.clone();
        let subscriber = self.subscriber;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                debug!(thread_id = %thread_id, "SSE connection closed");
                registry.remove_connection(&thread_id, subscriber).await;
            });
        }
    }
}

/// `GET /api/projects/{project}/threads/{thread}/event-stream`
#[instrument(skip_all, fields(project = %project, thread = %thread))]
pub async fn event_stream(
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path((project, thread)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    if project.trim().is_empty() || thread.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "MISSING_PARAMS",
            "project and thread are required",
        ));
    }

    let thread_id = ThreadId::from(thread);
    let (sub, rx) = Subscriber::channel();
    let subscriber = sub.id();

    let instance = state
        .registry
        .get_or_create(
            thread_id.clone(),
            ProjectName::from(project),
            username.clone(),
            InstanceOptions::default(),
            sub,
        )
        .await
        .map_err(from_thread_error)?;

    // Idempotent: an already running backend reports false, which is fine.
    let started = instance.start().await.map_err(from_thread_error)?;
    info!(
        thread_id = %thread_id,
        username = %username,
        started = started,
        "SSE subscriber attached"
    );

    let guard = ConnectionGuard {
        registry: state.registry.clone(),
        thread_id,
        subscriber,
    };
    let stream = ReceiverStream::new(rx).map(move |frame| {
        let _keep_alive = &guard;
        Ok::<_, std::convert::Infallible>(frame)
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
