use crate::error::{Result, ThreadError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;

/// Disconnect grace period after the last SSE connection drops.
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Inactivity limit for threads with interactive subscribers.
pub const DEFAULT_INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(8 * 60 * 60);
/// Inactivity limit for oneshot (webhook-driven) threads.
pub const DEFAULT_ONESHOT_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Period of the process-wide heartbeat ticker.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Which execution backend the registry builds for every thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process agent runtime.
    Local,
    /// Remote AgentOS case proxied over HTTP.
    Remote,
}

/// The three timeout policies of a thread instance.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub disconnect: Duration,
    pub interactive: Duration,
    pub oneshot: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            disconnect: DEFAULT_DISCONNECT_TIMEOUT,
            interactive: DEFAULT_INTERACTIVE_TIMEOUT,
            oneshot: DEFAULT_ONESHOT_TIMEOUT,
        }
    }
}

impl TimeoutConfig {
    /// Defaults overridden by `THREAD_*_TIMEOUT_MS` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            disconnect: env_duration_ms("THREAD_DISCONNECT_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_DISCONNECT_TIMEOUT),
            interactive: env_duration_ms("THREAD_INACTIVITY_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_INTERACTIVE_TIMEOUT),
            oneshot: env_duration_ms("THREAD_ONESHOT_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_ONESHOT_TIMEOUT),
        })
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub backend: BackendKind,
    /// Base URL of the remote AgentOS service; required for the remote backend.
    pub agentos_url: Option<String>,
    pub build_env: String,
    /// Static client directory served in production.
    pub client_path: Option<PathBuf>,
    pub timeouts: TimeoutConfig,
    pub heartbeat_interval: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let backend = match std::env::var("USE_AGENTOS") {
            Ok(v) if v == "true" => BackendKind::Remote,
            _ => BackendKind::Local,
        };
        let agentos_url = std::env::var("AGENTOS_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string());
        if backend == BackendKind::Remote && agentos_url.is_none() {
            return Err(ThreadError::Config(
                "USE_AGENTOS=true requires AGENTOS_URL".to_string(),
            ));
        }

        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ThreadError::Config(format!("invalid PORT value: {raw}")))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            backend,
            agentos_url,
            build_env: std::env::var("BUILD_ENV").unwrap_or_else(|_| "production".to_string()),
            client_path: std::env::var("CODAY_CLIENT_PATH").ok().map(PathBuf::from),
            timeouts: TimeoutConfig::from_env()?,
            heartbeat_interval: env_duration_ms("HEARTBEAT_INTERVAL_MS")?
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL),
        })
    }
}

fn env_duration_ms(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => {
            let ms: u64 = raw
                .parse()
                .map_err(|_| ThreadError::Config(format!("invalid {name} value: {raw}")))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        Err(_) => Ok(None),
    }
}
