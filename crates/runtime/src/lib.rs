//! The in-process agent runtime seam.
//!
//! The execution manager drives agents through [`AgentRuntime`]: one runtime
//! per thread, producing events on a bounded channel and accepting inbound
//! user events. Model-backed runtimes (LLM clients, tool execution, prompt
//! chains) implement this trait elsewhere; this crate carries the contract,
//! the per-thread message store, the producer-side [`Interactor`] handle,
//! and a minimal built-in runtime.

pub mod echo;
pub mod interactor;
pub mod store;

pub use echo::{EchoRuntime, EchoRuntimeFactory};
pub use interactor::Interactor;
pub use store::ThreadStore;

use ai_thread_common::{ProjectName, Result, ThreadEvent, ThreadId, Username};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One live agent runtime servicing one thread.
///
/// Implementations report their own failures as `error` events on the
/// outbound channel; `run` never propagates them.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Drive the agent loop until the token is cancelled.
    async fn run(&self, cancel: CancellationToken);

    /// Deliver an inbound event (answer, oauth callback, uploaded content).
    async fn push_event(&self, event: ThreadEvent) -> Result<()>;

    /// Persisted message history, oldest first.
    fn history(&self) -> Vec<ThreadEvent>;

    /// Look up a single persisted message by event id.
    fn message(&self, event_id: &str) -> Option<ThreadEvent>;

    /// Truncate the history at the identified user message.
    /// Returns the number of removed events.
    fn truncate(&self, event_id: &str) -> Result<usize>;

    /// Cooperatively cancel the current turn; the runtime stays usable.
    fn stop(&self);

    /// Terminate and release resources.
    async fn shutdown(&self);
}

/// Builds a runtime and its outbound event stream for a new thread instance.
pub trait RuntimeFactory: Send + Sync {
    fn create(
        &self,
        thread_id: &ThreadId,
        project: &ProjectName,
        username: &Username,
    ) -> Result<(Arc<dyn AgentRuntime>, mpsc::Receiver<ThreadEvent>)>;
}
