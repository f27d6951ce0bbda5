//! User-triggered halt of the current agent turn.

use crate::middleware::auth::AuthUser;
use crate::routes::messages::owned_instance;
use crate::server::AppState;
use crate::types::{ApiError, StopResponse};
use axum::extract::{Path, State};
use axum::{Extension, Json};
use tracing::{info, instrument};

/// `POST .../stop`: best-effort cancellation of the running turn. The
/// instance stays alive and usable.
#[instrument(skip_all, fields(thread = %thread))]
pub async fn post_stop(
    State(state): State<AppState>,
    Extension(AuthUser(username)): Extension<AuthUser>,
    Path((_project, thread)): Path<(String, String)>,
) -> Result<Json<StopResponse>, ApiError> {
    let instance = owned_instance(&state, &thread, &username).await?;
    instance.stop().await;
    info!(thread = %thread, "stop requested");
    Ok(Json(StopResponse {
        status: "stopped".to_string(),
    }))
}
