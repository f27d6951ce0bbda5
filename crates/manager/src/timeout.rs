//! Per-instance timeout scheduling.
//!
//! Two logical timers: the disconnect timer runs only while no subscriber is
//! attached; the inactivity timer is always armed and uses the oneshot or
//! interactive duration depending on how the thread was created. Whichever
//! fires first invokes the instance's timeout callback exactly once.
//!
//! Activity is recorded with a synchronous [`touch`](TimeoutSupervisor::touch)
//! so the broadcast paths can call it per event; the inactivity watcher
//! re-reads the last-activity deadline whenever it wakes instead of being
//! re-armed on every touch.
//!
//! Timers run on `tokio::time`, so tests drive them with the paused test
//! clock (`start_paused` + `tokio::time::advance`).

use ai_thread_common::TimeoutConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub type TimeoutCallback = Arc<dyn Fn() + Send + Sync>;

pub struct TimeoutSupervisor {
    config: TimeoutConfig,
    on_timeout: TimeoutCallback,
    fired: Arc<AtomicBool>,
    last_activity: Arc<StdMutex<Instant>>,
    disconnect: Mutex<Option<JoinHandle<()>>>,
    inactivity: Mutex<Option<JoinHandle<()>>>,
}

impl TimeoutSupervisor {
    pub fn new(config: TimeoutConfig, on_timeout: TimeoutCallback) -> Self {
        Self {
            config,
            on_timeout,
            fired: Arc::new(AtomicBool::new(false)),
            last_activity: Arc::new(StdMutex::new(Instant::now())),
            disconnect: Mutex::new(None),
            inactivity: Mutex::new(None),
        }
    }

    /// Record activity without re-arming anything. The inactivity watcher
    /// picks the new deadline up when it next wakes.
    pub fn touch(&self) {
        *self.last_activity.lock().expect("activity lock") = Instant::now();
    }

    /// Time since the last recorded activity.
    pub fn inactive_for(&self) -> Duration {
        self.last_activity.lock().expect("activity lock").elapsed()
    }

    fn spawn_disconnect_timer(&self, after: Duration) -> JoinHandle<()> {
        let fired = self.fired.clone();
        let on_timeout = self.on_timeout.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Both timers can expire in the same tick; the callback runs once.
            if !fired.swap(true, Ordering::SeqCst) {
                on_timeout();
            }
        })
    }

    fn spawn_inactivity_watcher(&self, duration: Duration) -> JoinHandle<()> {
        let fired = self.fired.clone();
        let on_timeout = self.on_timeout.clone();
        let last_activity = self.last_activity.clone();
        tokio::spawn(async move {
            loop {
                let deadline = *last_activity.lock().expect("activity lock") + duration;
                if Instant::now() >= deadline {
                    if !fired.swap(true, Ordering::SeqCst) {
                        on_timeout();
                    }
                    return;
                }
                tokio::time::sleep_until(deadline).await;
            }
        })
    }

    /// Arm the disconnect timer. Replaces any previous arming.
    pub async fn arm_disconnect(&self) {
        let mut slot = self.disconnect.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        *slot = Some(self.spawn_disconnect_timer(self.config.disconnect));
    }

    pub async fn disarm_disconnect(&self) {
        if let Some(handle) = self.disconnect.lock().await.take() {
            handle.abort();
        }
    }

    /// Record activity and (re)start the inactivity watcher with the
    /// duration for the current oneshot state.
    pub async fn reset_inactivity(&self, oneshot: bool) {
        let duration = if oneshot {
            self.config.oneshot
        } else {
            self.config.interactive
        };
        self.touch();
        let mut slot = self.inactivity.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        *slot = Some(self.spawn_inactivity_watcher(duration));
    }

    /// Stop both timers and suppress any further callback.
    pub async fn cancel(&self) {
        self.fired.store(true, Ordering::SeqCst);
        if let Some(handle) = self.disconnect.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.inactivity.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_supervisor(config: TimeoutConfig) -> (TimeoutSupervisor, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let cb_count = count.clone();
        let supervisor = TimeoutSupervisor::new(
            config,
            Arc::new(move || {
                cb_count.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (supervisor, count)
    }

    fn short_config() -> TimeoutConfig {
        TimeoutConfig {
            disconnect: Duration::from_secs(300),
            interactive: Duration::from_secs(8 * 3600),
            oneshot: Duration::from_secs(1800),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_fires_once() {
        let (supervisor, count) = counting_supervisor(short_config());
        supervisor.arm_disconnect().await;

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Nothing further fires.
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_disconnect() {
        let (supervisor, count) = counting_supervisor(short_config());
        supervisor.arm_disconnect().await;
        tokio::time::advance(Duration::from_secs(299)).await;
        supervisor.disarm_disconnect().await;

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_resets_inactivity() {
        let (supervisor, count) = counting_supervisor(short_config());
        supervisor.reset_inactivity(true).await;

        tokio::time::advance(Duration::from_secs(1700)).await;
        supervisor.reset_inactivity(true).await;
        tokio::time::advance(Duration::from_secs(1700)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_extends_deadline() {
        let (supervisor, count) = counting_supervisor(short_config());
        supervisor.reset_inactivity(true).await;

        tokio::time::advance(Duration::from_secs(1700)).await;
        supervisor.touch();
        tokio::time::advance(Duration::from_secs(1700)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oneshot_duration() {
        let (supervisor, count) = counting_supervisor(short_config());
        supervisor.reset_inactivity(false).await;
        tokio::time::advance(Duration::from_secs(2000)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "interactive outlives 30m");

        supervisor.reset_inactivity(true).await;
        tokio::time::advance(Duration::from_secs(1801)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_expiry_single_callback() {
        let config = TimeoutConfig {
            disconnect: Duration::from_secs(10),
            interactive: Duration::from_secs(10),
            oneshot: Duration::from_secs(10),
        };
        let (supervisor, count) = counting_supervisor(config);
        supervisor.arm_disconnect().await;
        supervisor.reset_inactivity(false).await;

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_suppresses_timers() {
        let (supervisor, count) = counting_supervisor(short_config());
        supervisor.arm_disconnect().await;
        supervisor.reset_inactivity(true).await;
        supervisor.cancel().await;

        tokio::time::advance(Duration::from_secs(10 * 3600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_for_tracks_touches() {
        let (supervisor, _count) = counting_supervisor(short_config());
        supervisor.reset_inactivity(false).await;

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(supervisor.inactive_for() >= Duration::from_secs(120));

        supervisor.touch();
        assert!(supervisor.inactive_for() < Duration::from_secs(1));
    }
}
