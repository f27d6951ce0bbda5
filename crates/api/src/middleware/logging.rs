use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

/// Get the default tracing layer for HTTP requests
pub fn get_tracing_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

/// Per-request logging with a request id carried downstream.
pub async fn logging_middleware(mut request: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();

    if let Ok(value) = request_id.parse() {
        request.headers_mut().insert("x-request-id", value);
    }

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start_time.elapsed().as_millis();
    if status.is_server_error() {
        error!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration_ms,
            "HTTP request failed"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration_ms,
            "HTTP request completed"
        );
    }

    response
}
