//! Inbound message routing: answers and OAuth callbacks in, history
//! listing and truncation against the agent runtime.

use crate::middleware::auth::AuthUser;
use crate::server::AppState;
use crate::types::{error_response, from_thread_error, ApiError, DeleteMessageResponse};
use ai_thread_common::{AgentEvent, ThreadEvent, ThreadId, Username};
use ai_thread_manager::ThreadInstance;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::sync::Arc;
use tracing::{info, instrument};

/// Resolve the instance and enforce ownership: 404 when absent, 403 when the
/// caller is not the thread's owner.
pub(crate) async fn owned_instance(
    state: &AppState,
    thread: &str,
    username: &Username,
) -> Result<Arc<ThreadInstance>, ApiError> {
    let thread_id = ThreadId::from(thread);
    let instance = state.registry.get(&thread_id).await.ok_or_else(|| {
        error_response(
            StatusCode::NOT_FOUND,
            "THREAD_NOT_FOUND",
            format!("no live instance for thread {thread_id}"),
        )
    })?;
    if instance.username() != username {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            format!("thread {thread_id} belongs to another user"),
        ));
    }
    Ok(instance)
}

/// `POST .../messages`: an inbound event payload: a user answer, or an
/// OAuth callback that goes to the integration subsystem instead of the
/// answer path.
#[instrument(skip_all, fields(thread = %thread))]
pub async fn post_message(
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path((_project, thread)): Path<(String, String)>,
    Json(payload): Json<serde_json::Value>,
) -> Result<String, ApiError> {
    let instance = owned_instance(&state, &thread, &username).await?;

    let event: ThreadEvent = serde_json::from_value(payload).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_PAYLOAD",
            format!("unreadable event payload: {e}"),
        )
    })?;

    match &event {
        ThreadEvent::Agent(AgentEvent::Answer { .. }) => {
            instance
                .handle_inbound(event)
                .await
                .map_err(from_thread_error)?;
            Ok("message received".to_string())
        }
        ThreadEvent::Agent(AgentEvent::OauthCallback { .. }) => {
            info!(thread = %thread, "routing oauth callback");
            instance
                .handle_inbound(event)
                .await
                .map_err(from_thread_error)?;
            Ok("oauth callback received".to_string())
        }
        other => Err(error_response(
            StatusCode::BAD_REQUEST,
            "UNROUTABLE_EVENT",
            format!("cannot route inbound event of type {}", other.event_type()),
        )),
    }
}

/// `GET .../messages`: the persisted history. Unsupported on the remote
/// backend, which keeps its history on the remote side.
#[instrument(skip_all, fields(thread = %thread))]
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path((_project, thread)): Path<(String, String)>,
) -> Result<Json<Vec<ThreadEvent>>, ApiError> {
    let instance = owned_instance(&state, &thread, &username).await?;
    let messages = instance.messages().map_err(from_thread_error)?;
    Ok(Json(messages))
}

/// `GET .../messages/{event_id}`: one persisted message.
#[instrument(skip_all, fields(thread = %thread, event_id = %event_id))]
pub async fn get_message(
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path((_project, thread, event_id)): Path<(String, String, String)>,
) -> Result<Json<ThreadEvent>, ApiError> {
    let instance = owned_instance(&state, &thread, &username).await?;
    let message = instance
        .message(&event_id)
        .map_err(from_thread_error)?
        .ok_or_else(|| {
            error_response(
                StatusCode::NOT_FOUND,
                "MESSAGE_NOT_FOUND",
                format!("no message with id {event_id}"),
            )
        })?;
    Ok(Json(message))
}

/// `DELETE .../messages/{event_id}`: truncate the thread at a user
/// message. Other subscribers are not notified; their view goes stale
/// until reload.
#[instrument(skip_all, fields(thread = %thread, event_id = %event_id))]
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path((_project, thread, event_id)): Path<(String, String, String)>,
) -> Result<Json<DeleteMessageResponse>, ApiError> {
    let instance = owned_instance(&state, &thread, &username).await?;
    let removed = instance.truncate(&event_id).map_err(from_thread_error)?;
    info!(thread = %thread, event_id = %event_id, removed = removed, "thread truncated");
    Ok(Json(DeleteMessageResponse { removed }))
}
