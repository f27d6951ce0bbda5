//! Image uploads into a thread's inbound queue.

use crate::middleware::auth::AuthUser;
use crate::routes::messages::owned_instance;
use crate::server::AppState;
use crate::types::{error_response, from_thread_error, ApiError, UploadRequest, UploadResponse};
use ai_thread_common::{AgentEvent, MessageContent};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{info, instrument};

/// `POST .../upload`: decode, process (downscale oversized images), and
/// inject the result into the instance's inbound queue. Responds with the
/// processed dimensions.
#[instrument(skip_all, fields(thread = %thread, filename = %request.filename))]
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path((_project, thread)): Path<(String, String)>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    let instance = owned_instance(&state, &thread, &username).await?;

    let raw = BASE64.decode(request.content.as_bytes()).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_BASE64",
            format!("content is not valid base64: {e}"),
        )
    })?;

    let processed = state
        .images
        .process(&raw, &request.mime_type)
        .map_err(from_thread_error)?;

    instance
        .handle_inbound(
            AgentEvent::Answer {
                timestamp: None,
                answer: String::new(),
                invite_id: None,
                content: vec![MessageContent::Image {
                    mime_type: processed.mime_type.clone(),
                    content: BASE64.encode(&processed.data),
                }],
            }
            .into(),
        )
        .await
        .map_err(from_thread_error)?;

    info!(
        thread = %thread,
        filename = %request.filename,
        width = processed.width,
        height = processed.height,
        "image uploaded"
    );
    Ok(Json(UploadResponse {
        filename: request.filename,
        mime_type: processed.mime_type,
        width: processed.width,
        height: processed.height,
    }))
}
