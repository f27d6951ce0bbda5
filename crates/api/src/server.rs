//! Router assembly and server bootstrap.

use crate::images::{ImageProcessor, ResizingImageProcessor};
use crate::middleware::auth::auth_middleware;
use crate::middleware::logging::{get_tracing_layer, logging_middleware};
use crate::routes;
use ai_thread_common::ServerConfig;
use ai_thread_manager::{InstanceRegistry, RegistryConfig};
use ai_thread_runtime::RuntimeFactory;
use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<InstanceRegistry>,
    pub images: Arc<dyn ImageProcessor>,
}

/// The `/api` routes, with authentication applied.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/projects/:project/threads/:thread/event-stream",
            get(routes::event_stream::event_stream),
        )
        .route(
            "/projects/:project/threads/:thread/messages",
            post(routes::messages::post_message).get(routes::messages::list_messages),
        )
        .route(
            "/projects/:project/threads/:thread/messages/:event_id",
            get(routes::messages::get_message).delete(routes::messages::delete_message),
        )
        .route(
            "/projects/:project/threads/:thread/stop",
            post(routes::stop::post_stop),
        )
        .route(
            "/projects/:project/threads/:thread/upload",
            post(routes::upload::upload_image),
        )
        .layer(axum::middleware::from_fn(auth_middleware))
        .with_state(state)
}

/// The whole application: API plus the static client in production.
pub fn build_app(state: AppState, config: &ServerConfig) -> Router {
    let mut app = Router::new()
        .nest("/api", api_router(state))
        .layer(axum::middleware::from_fn(logging_middleware))
        .layer(get_tracing_layer())
        .layer(CorsLayer::permissive());

    if let Some(client_path) = &config.client_path {
        info!(path = %client_path.display(), "serving static client");
        app = app.fallback_service(ServeDir::new(client_path));
    } else if config.build_env == "development" {
        // The front-end dev server proxies itself in development; nothing to
        // serve from here.
        info!("development build: no static client directory configured");
    }
    app
}

/// Bind the configured port, walking forward to the next free one when the
/// preferred port is taken.
pub async fn bind_with_fallback(port: u16) -> Result<TcpListener> {
    const ATTEMPTS: u16 = 10;
    for offset in 0..ATTEMPTS {
        let candidate = port + offset;
        match TcpListener::bind(("0.0.0.0", candidate)).await {
            Ok(listener) => {
                if offset > 0 {
                    warn!(preferred = port, bound = candidate, "preferred port taken");
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => continue,
            Err(e) => return Err(e.into()),
        }
    }
    anyhow::bail!("no free port in {}..{}", port, port + ATTEMPTS)
}

/// The HTTP server around one process-wide instance registry.
pub struct ThreadServer {
    config: ServerConfig,
    registry: Arc<InstanceRegistry>,
}

impl ThreadServer {
    pub fn new(config: ServerConfig, factory: Arc<dyn RuntimeFactory>) -> Self {
        let registry = InstanceRegistry::new(RegistryConfig::from(&config), factory);
        Self { config, registry }
    }

    pub fn registry(&self) -> Arc<InstanceRegistry> {
        self.registry.clone()
    }

    /// Serve until ctrl-c, then clean every live instance before returning.
    pub async fn run(self) -> Result<()> {
        let state = AppState {
            registry: self.registry.clone(),
            images: Arc::new(ResizingImageProcessor::default()),
        };
        let app = build_app(state, &self.config);

        let listener = bind_with_fallback(self.config.port).await?;
        info!(
            addr = %listener.local_addr()?,
            backend = ?self.config.backend,
            "thread server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("shutting down, cleaning live instances");
        self.registry.shutdown().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
    }
}
