//! End-to-end scenarios for instance lifecycle, fan-out, replay, and the
//! timeout policies. Timer tests run on the paused tokio clock.

use ai_thread_common::{
    AgentEvent, BackendKind, MessageContent, ProjectName, Role, ThreadError, ThreadEvent, ThreadId,
    TimeoutConfig, Username,
};
use ai_thread_manager::{InstanceOptions, InstanceRegistry, RegistryConfig, Subscriber};
use ai_thread_runtime::{AgentRuntime, EchoRuntimeFactory, RuntimeFactory};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn local_registry() -> Arc<InstanceRegistry> {
    InstanceRegistry::new(
        RegistryConfig {
            backend: BackendKind::Local,
            agentos_url: None,
            timeouts: TimeoutConfig::default(),
            heartbeat_interval: Duration::from_secs(30),
        },
        Arc::new(EchoRuntimeFactory::new()),
    )
}

fn assistant_message(text: &str) -> ThreadEvent {
    AgentEvent::Message {
        timestamp: None,
        role: Role::Assistant,
        name: "bot".into(),
        content: vec![MessageContent::text(text)],
    }
    .into()
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Runtime that emits nothing on its own; tests drive its event stream
/// through the sender captured by [`StreamingFactory`].
struct StreamingRuntime;

#[async_trait::async_trait]
impl AgentRuntime for StreamingRuntime {
    async fn run(&self, cancel: CancellationToken) {
        cancel.cancelled().await;
    }

    async fn push_event(&self, _event: ThreadEvent) -> ai_thread_common::Result<()> {
        Ok(())
    }

    fn history(&self) -> Vec<ThreadEvent> {
        Vec::new()
    }

    fn message(&self, _event_id: &str) -> Option<ThreadEvent> {
        None
    }

    fn truncate(&self, _event_id: &str) -> ai_thread_common::Result<usize> {
        Err(ThreadError::InvalidInput("empty thread".to_string()))
    }

    fn stop(&self) {}

    async fn shutdown(&self) {}
}

#[derive(Default)]
struct StreamingFactory {
    senders: std::sync::Mutex<Vec<mpsc::Sender<ThreadEvent>>>,
}

impl RuntimeFactory for StreamingFactory {
    fn create(
        &self,
        _thread_id: &ThreadId,
        _project: &ProjectName,
        _username: &Username,
    ) -> ai_thread_common::Result<(Arc<dyn AgentRuntime>, mpsc::Receiver<ThreadEvent>)> {
        let (tx, rx) = mpsc::channel(16);
        self.senders.lock().unwrap().push(tx);
        Ok((Arc::new(StreamingRuntime), rx))
    }
}

#[tokio::test]
async fn test_broadcast_to_multiple_tabs() {
    let registry = local_registry();
    let (sub_a, mut rx_a) = Subscriber::channel();
    let (sub_b, mut rx_b) = Subscriber::channel();

    let instance = registry
        .get_or_create(
            ThreadId::from("thr-1"),
            "proj".into(),
            "alice".into(),
            InstanceOptions::default(),
            sub_a,
        )
        .await
        .unwrap();
    registry
        .get_or_create(
            ThreadId::from("thr-1"),
            "proj".into(),
            "alice".into(),
            InstanceOptions::default(),
            sub_b,
        )
        .await
        .unwrap();

    instance
        .broadcaster()
        .broadcast(&assistant_message("hi"))
        .await;

    let frame_a = rx_a.recv().await.unwrap();
    let frame_b = rx_b.recv().await.unwrap();
    assert_eq!(frame_a, frame_b);
    assert_eq!(
        frame_a.as_ref(),
        b"data: {\"type\":\"message\",\"role\":\"assistant\",\"name\":\"bot\",\"content\":[{\"type\":\"text\",\"content\":\"hi\"}]}\n\n"
            .as_slice()
    );

    registry.shutdown().await;
}

#[tokio::test]
async fn test_late_joiner_replay() {
    let registry = local_registry();
    let (sub_a, mut rx_a) = Subscriber::channel();

    let instance = registry
        .get_or_create(
            ThreadId::from("thr-2"),
            "proj".into(),
            "alice".into(),
            InstanceOptions::default(),
            sub_a,
        )
        .await
        .unwrap();
    instance.start().await.unwrap();

    // One turn: the runtime persists the user message and its reply.
    instance
        .handle_inbound(
            AgentEvent::Answer {
                timestamp: None,
                answer: "hello there".into(),
                invite_id: None,
                content: vec![],
            }
            .into(),
        )
        .await
        .unwrap();

    let mut persisted = 0;
    for _ in 0..100 {
        persisted = instance.messages().unwrap().len();
        if persisted == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(persisted, 2, "turn should persist user + assistant messages");

    // Late joiner replays both messages, then sees the next broadcast.
    let (sub_c, mut rx_c) = Subscriber::channel();
    instance.add_connection(sub_c).await;
    instance
        .broadcaster()
        .broadcast(&assistant_message("m3"))
        .await;

    let first = String::from_utf8(rx_c.recv().await.unwrap().to_vec()).unwrap();
    let second = String::from_utf8(rx_c.recv().await.unwrap().to_vec()).unwrap();
    let third = String::from_utf8(rx_c.recv().await.unwrap().to_vec()).unwrap();
    assert!(first.contains("hello there"), "got: {first}");
    assert!(second.contains("Received: hello there"), "got: {second}");
    assert!(third.contains("m3"), "got: {third}");

    // The original tab saw the live turn, not a replay.
    assert!(rx_a.recv().await.is_some());

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_timeout() {
    let registry = local_registry();
    let (sub, _rx) = Subscriber::channel();
    let sub_id = sub.id();

    registry
        .get_or_create(
            ThreadId::from("thr-3"),
            "proj".into(),
            "alice".into(),
            InstanceOptions::default(),
            sub,
        )
        .await
        .unwrap();

    registry
        .remove_connection(&ThreadId::from("thr-3"), sub_id)
        .await;

    tokio::time::sleep(Duration::from_secs(4 * 60 + 59)).await;
    settle().await;
    assert!(registry.get(&ThreadId::from("thr-3")).await.is_some());

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert!(registry.get(&ThreadId::from("thr-3")).await.is_none());

    // Further cleanups are no-ops.
    registry.cleanup(&ThreadId::from("thr-3")).await;
    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_disarms_disconnect_timer() {
    let registry = local_registry();
    let (sub, _rx) = Subscriber::channel();
    let sub_id = sub.id();
    let thread_id = ThreadId::from("thr-3b");

    let instance = registry
        .get_or_create(
            thread_id.clone(),
            "proj".into(),
            "alice".into(),
            InstanceOptions::default(),
            sub,
        )
        .await
        .unwrap();
    registry.remove_connection(&thread_id, sub_id).await;

    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    let (sub2, _rx2) = Subscriber::channel();
    instance.add_connection(sub2).await;

    // Well past the original deadline; the reconnect kept the instance.
    tokio::time::advance(Duration::from_secs(10 * 60)).await;
    settle().await;
    assert!(registry.get(&thread_id).await.is_some());

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_oneshot_timeout() {
    let registry = local_registry();
    let thread_id = ThreadId::from("thr-w");

    let instance = registry
        .create_without_connection(
            thread_id.clone(),
            "proj".into(),
            "svc".into(),
            InstanceOptions::default(),
        )
        .await
        .unwrap();
    assert!(instance.is_oneshot().await);
    assert_eq!(instance.connection_count().await, 0);

    tokio::time::advance(Duration::from_secs(29 * 60)).await;
    settle().await;
    assert!(registry.get(&thread_id).await.is_some());

    tokio::time::advance(Duration::from_secs(2 * 60)).await;
    settle().await;
    assert!(registry.get(&thread_id).await.is_none());

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_connection_clears_oneshot() {
    let registry = local_registry();
    let thread_id = ThreadId::from("thr-w2");

    let instance = registry
        .create_without_connection(
            thread_id.clone(),
            "proj".into(),
            "svc".into(),
            InstanceOptions::default(),
        )
        .await
        .unwrap();

    let (sub, _rx) = Subscriber::channel();
    instance.add_connection(sub).await;
    assert!(!instance.is_oneshot().await);

    // The oneshot deadline passes without expiry.
    tokio::time::advance(Duration::from_secs(31 * 60)).await;
    settle().await;
    assert!(registry.get(&thread_id).await.is_some());
    assert!(instance.inactive_for() >= Duration::from_secs(31 * 60));

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_streaming_output_resets_inactivity() {
    let factory = Arc::new(StreamingFactory::default());
    let registry = InstanceRegistry::new(
        RegistryConfig {
            backend: BackendKind::Local,
            agentos_url: None,
            timeouts: TimeoutConfig::default(),
            heartbeat_interval: Duration::from_secs(30),
        },
        factory.clone(),
    );
    let thread_id = ThreadId::from("thr-s1");

    // Oneshot instance (30 minute inactivity budget), no inbound traffic.
    let instance = registry
        .create_without_connection(
            thread_id.clone(),
            "proj".into(),
            "svc".into(),
            InstanceOptions::default(),
        )
        .await
        .unwrap();
    instance.start().await.unwrap();
    let events_tx = factory.senders.lock().unwrap().pop().unwrap();

    // 29 minutes in, the agent is still streaming output.
    tokio::time::advance(Duration::from_secs(29 * 60)).await;
    events_tx
        .send(assistant_message("still working"))
        .await
        .unwrap();
    settle().await;

    // Past the original deadline; the outbound stream kept it alive.
    tokio::time::advance(Duration::from_secs(29 * 60)).await;
    settle().await;
    assert!(registry.get(&thread_id).await.is_some());

    // True idleness still expires it.
    tokio::time::advance(Duration::from_secs(2 * 60)).await;
    settle().await;
    assert!(registry.get(&thread_id).await.is_none());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_cross_user_rejection() {
    let registry = local_registry();
    let (sub_a, _rx_a) = Subscriber::channel();
    registry
        .get_or_create(
            ThreadId::from("thr-5"),
            "proj".into(),
            "alice".into(),
            InstanceOptions::default(),
            sub_a,
        )
        .await
        .unwrap();

    let (sub_b, _rx_b) = Subscriber::channel();
    let denied = registry
        .get_or_create(
            ThreadId::from("thr-5"),
            "proj".into(),
            "bob".into(),
            InstanceOptions::default(),
            sub_b,
        )
        .await;
    assert!(denied.is_err());

    let instance = registry.get(&ThreadId::from("thr-5")).await.unwrap();
    assert_eq!(instance.connection_count().await, 1);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_broadcast() {
    let registry = InstanceRegistry::new(
        RegistryConfig {
            backend: BackendKind::Local,
            agentos_url: None,
            timeouts: TimeoutConfig::default(),
            heartbeat_interval: Duration::from_millis(20),
        },
        Arc::new(EchoRuntimeFactory::new()),
    );

    let (sub, mut rx) = Subscriber::channel();
    registry
        .get_or_create(
            ThreadId::from("thr-6"),
            "proj".into(),
            "alice".into(),
            InstanceOptions::default(),
            sub,
        )
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("heartbeat within two seconds")
        .unwrap();
    assert_eq!(frame.as_ref(), b"data: {\"type\":\"heartbeat\"}\n\n".as_slice());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_idempotence() {
    let registry = local_registry();
    let (sub, mut rx) = Subscriber::channel();
    registry
        .get_or_create(
            ThreadId::from("thr-7"),
            "proj".into(),
            "alice".into(),
            InstanceOptions::default(),
            sub,
        )
        .await
        .unwrap();

    registry.shutdown().await;
    registry.shutdown().await;

    assert_eq!(registry.instance_count().await, 0);
    // Subscriber stream ended with cleanup.
    assert!(rx.recv().await.is_none());
}
