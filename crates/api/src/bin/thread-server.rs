//! Thread server binary entry point.
//!
//! Reads configuration from the environment, wires the built-in runtime
//! factory into the registry, and serves until interrupted.

use ai_thread_api::ThreadServer;
use ai_thread_common::ServerConfig;
use ai_thread_runtime::EchoRuntimeFactory;
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "thread-server")]
#[command(version)]
#[command(about = "Multi-user AI assistant thread server")]
struct Cli {
    /// Port to bind to (falls forward to the next free port when taken)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = cli.log_level.as_deref().unwrap_or("info");
    ai_thread_common::init_tracing_with_level(log_level)?;

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    info!(
        backend = ?config.backend,
        port = config.port,
        "thread server v{} starting",
        ai_thread_common::VERSION
    );
    if config.backend == ai_thread_common::BackendKind::Local {
        warn!("no model-backed runtime wired in; using the built-in echo runtime");
    }

    ThreadServer::new(config, Arc::new(EchoRuntimeFactory::new()))
        .run()
        .await
}
