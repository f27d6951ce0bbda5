use ai_thread_common::config::*;
use std::time::Duration;

#[test]
fn test_timeout_defaults() {
    let timeouts = TimeoutConfig::default();
    assert_eq!(timeouts.disconnect, Duration::from_secs(5 * 60));
    assert_eq!(timeouts.interactive, Duration::from_secs(8 * 60 * 60));
    assert_eq!(timeouts.oneshot, Duration::from_secs(30 * 60));
}

#[test]
fn test_backend_kind_serialization() {
    assert_eq!(
        serde_json::to_string(&BackendKind::Local).unwrap(),
        "\"local\""
    );
    assert_eq!(
        serde_json::from_str::<BackendKind>("\"remote\"").unwrap(),
        BackendKind::Remote
    );
}
