//! Process-wide registry of live thread instances.
//!
//! Owns instance lifetimes: creation on first connection (or explicitly for
//! webhook-driven oneshot threads), removal on timeout or shutdown. Zero
//! connections never removes an instance directly; the disconnect timer
//! does. Also drives the global heartbeat tick.

use crate::broadcaster::{Broadcaster, Subscriber, SubscriberId};
use crate::instance::{Backend, InstanceOptions, ThreadInstance};
use crate::local::LocalBackend;
use crate::remote::RemoteBackend;
use crate::timeout::TimeoutSupervisor;
use ai_thread_common::{
    BackendKind, ProjectName, Result, ServerConfig, ThreadError, ThreadId, TimeoutConfig, Username,
};
use ai_thread_runtime::RuntimeFactory;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Registry-level configuration, extracted from [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub backend: BackendKind,
    pub agentos_url: Option<String>,
    pub timeouts: TimeoutConfig,
    pub heartbeat_interval: Duration,
}

impl From<&ServerConfig> for RegistryConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            backend: config.backend,
            agentos_url: config.agentos_url.clone(),
            timeouts: config.timeouts.clone(),
            heartbeat_interval: config.heartbeat_interval,
        }
    }
}

pub struct InstanceRegistry {
    config: RegistryConfig,
    factory: Arc<dyn RuntimeFactory>,
    http: reqwest::Client,
    instances: RwLock<HashMap<ThreadId, Arc<ThreadInstance>>>,
    expiry_tx: mpsc::UnboundedSender<ThreadId>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl InstanceRegistry {
    /// Build the registry and start its background tasks (heartbeat ticker
    /// and timeout reaper).
    pub fn new(config: RegistryConfig, factory: Arc<dyn RuntimeFactory>) -> Arc<Self> {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            config,
            factory,
            http: reqwest::Client::new(),
            instances: RwLock::new(HashMap::new()),
            expiry_tx,
            tasks: std::sync::Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        });

        let reaper = tokio::spawn(Self::reap_expired(Arc::downgrade(&registry), expiry_rx));
        let heartbeat = tokio::spawn(Self::heartbeat_tick(
            Arc::downgrade(&registry),
            registry.config.heartbeat_interval,
        ));
        registry
            .tasks
            .lock()
            .expect("registry task lock")
            .extend([reaper, heartbeat]);
        registry
    }

    async fn reap_expired(
        registry: Weak<InstanceRegistry>,
        mut expiry_rx: mpsc::UnboundedReceiver<ThreadId>,
    ) {
        while let Some(thread_id) = expiry_rx.recv().await {
            let Some(registry) = registry.upgrade() else {
                break;
            };
            info!(thread_id = %thread_id, "instance timed out");
            registry.cleanup(&thread_id).await;
        }
    }

    async fn heartbeat_tick(registry: Weak<InstanceRegistry>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await; // first tick completes immediately
        loop {
            interval.tick().await;
            let Some(registry) = registry.upgrade() else {
                break;
            };
            let instances: Vec<Arc<ThreadInstance>> =
                registry.instances.read().await.values().cloned().collect();
            for instance in instances {
                instance.send_heartbeat().await;
            }
        }
    }

    fn build_instance(
        &self,
        thread_id: ThreadId,
        project: ProjectName,
        username: Username,
        options: InstanceOptions,
    ) -> Result<Arc<ThreadInstance>> {
        let broadcaster = Arc::new(Broadcaster::new());

        // Timeout expiry feeds the reaper; a plain closure keeps the
        // instance free of back-pointers into the registry.
        let expiry_tx = self.expiry_tx.clone();
        let expired_id = thread_id.clone();
        let on_timeout = Arc::new(move || {
            let _ = expiry_tx.send(expired_id.clone());
        });
        // Shared with the backend so outbound streaming counts as activity.
        let timeouts = Arc::new(TimeoutSupervisor::new(
            self.config.timeouts.clone(),
            on_timeout,
        ));

        let backend = match self.config.backend {
            BackendKind::Local => Backend::Local(LocalBackend::new(
                thread_id.clone(),
                project.clone(),
                username.clone(),
                self.factory.clone(),
                broadcaster.clone(),
                timeouts.clone(),
            )),
            BackendKind::Remote => {
                let base_url = self.config.agentos_url.clone().ok_or_else(|| {
                    ThreadError::Config("remote backend selected without AGENTOS_URL".to_string())
                })?;
                Backend::Remote(RemoteBackend::new(
                    self.http.clone(),
                    base_url,
                    thread_id.clone(),
                    project.clone(),
                    username.clone(),
                    broadcaster.clone(),
                    timeouts.clone(),
                ))
            }
        };

        Ok(Arc::new(ThreadInstance::new(
            thread_id,
            project,
            username,
            broadcaster,
            timeouts,
            backend,
            options,
        )))
    }

    /// Fetch or create the instance for a thread and attach the subscriber.
    pub async fn get_or_create(
        &self,
        thread_id: ThreadId,
        project: ProjectName,
        username: Username,
        options: InstanceOptions,
        sub: Subscriber,
    ) -> Result<Arc<ThreadInstance>> {
        let instance = {
            let mut instances = self.instances.write().await;
            match instances.get(&thread_id) {
                Some(existing) => existing.clone(),
                None => {
                    let instance =
                        self.build_instance(thread_id.clone(), project, username.clone(), options)?;
                    instance.arm_initial_timers().await;
                    instances.insert(thread_id.clone(), instance.clone());
                    info!(thread_id = %thread_id, "instance created");
                    instance
                }
            }
        };

        if instance.username() != &username {
            return Err(ThreadError::Forbidden(format!(
                "thread {thread_id} belongs to another user"
            )));
        }
        instance.add_connection(sub).await;
        Ok(instance)
    }

    /// Create an instance with no subscriber attached, flagged oneshot.
    /// Used by webhook-driven threads.
    pub async fn create_without_connection(
        &self,
        thread_id: ThreadId,
        project: ProjectName,
        username: Username,
        options: InstanceOptions,
    ) -> Result<Arc<ThreadInstance>> {
        let mut instances = self.instances.write().await;
        if let Some(existing) = instances.get(&thread_id) {
            return Ok(existing.clone());
        }
        let instance = self.build_instance(
            thread_id.clone(),
            project,
            username,
            InstanceOptions {
                oneshot: true,
                ..options
            },
        )?;
        instance.arm_initial_timers().await;
        instance.mark_oneshot().await;
        instances.insert(thread_id.clone(), instance.clone());
        info!(thread_id = %thread_id, "oneshot instance created");
        Ok(instance)
    }

    pub async fn get(&self, thread_id: &ThreadId) -> Option<Arc<ThreadInstance>> {
        self.instances.read().await.get(thread_id).cloned()
    }

    /// Detach a subscriber. Zero connections arms the disconnect timer but
    /// never deletes the instance directly.
    pub async fn remove_connection(&self, thread_id: &ThreadId, sub_id: SubscriberId) {
        if let Some(instance) = self.get(thread_id).await {
            instance.remove_connection(sub_id).await;
        }
    }

    pub async fn stop(&self, thread_id: &ThreadId) -> Result<()> {
        let instance = self
            .get(thread_id)
            .await
            .ok_or_else(|| ThreadError::NotFound(format!("no instance for thread {thread_id}")))?;
        instance.stop().await;
        Ok(())
    }

    /// Remove and tear down one instance. Safe to call repeatedly.
    pub async fn cleanup(&self, thread_id: &ThreadId) {
        let removed = self.instances.write().await.remove(thread_id);
        if let Some(instance) = removed {
            instance.cleanup().await;
            debug!(thread_id = %thread_id, "instance removed from registry");
        }
    }

    pub async fn instance_count(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Stop background tasks and clean every instance. Idempotent; completes
    /// all cleanups before returning.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().expect("registry task lock").drain(..) {
            task.abort();
        }
        let instances: Vec<Arc<ThreadInstance>> =
            self.instances.write().await.drain().map(|(_, i)| i).collect();
        let count = instances.len();
        join_all(instances.iter().map(|instance| instance.cleanup())).await;
        if count > 0 {
            warn!(instances = count, "registry shut down with live instances");
        } else {
            info!("registry shut down");
        }
    }
}
