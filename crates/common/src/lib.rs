//! Common types shared across the thread server crates: identifiers, the
//! event taxonomy, configuration, and the error taxonomy.

pub mod config;
pub mod error;
pub mod event;
pub mod types;

pub use config::*;
pub use error::{Result, ThreadError};
pub use event::*;
pub use types::*;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn init_tracing() -> anyhow::Result<()> {
    init_tracing_with_level("info")
}

pub fn init_tracing_with_level(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "ai_thread_common={level},ai_thread_runtime={level},ai_thread_manager={level},ai_thread_api={level},tower_http=debug"
            ))
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Tracing initialized with level: {}", level);
    Ok(())
}
