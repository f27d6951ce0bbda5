//! Thread execution manager.
//!
//! Keeps one live execution instance per thread id, shared across every
//! browser tab watching that thread:
//! - per-thread fan-out of the event stream to N SSE subscribers
//!   ([`Broadcaster`]), with backpressure-safe writes and heartbeats
//! - disconnect and inactivity timeouts cooperating with reconnection
//!   ([`timeout::TimeoutSupervisor`])
//! - two execution backends behind one surface: an in-process agent runtime
//!   and a remote AgentOS case proxy
//! - a process-wide [`InstanceRegistry`] owning instance lifetimes

pub mod broadcaster;
pub mod instance;
pub mod local;
pub mod registry;
pub mod remote;
pub mod timeout;

pub use broadcaster::{Broadcaster, Subscriber, SubscriberId};
pub use instance::{Backend, InstanceOptions, ThreadInstance};
pub use local::LocalBackend;
pub use registry::{InstanceRegistry, RegistryConfig};
pub use remote::RemoteBackend;
pub use timeout::TimeoutSupervisor;
