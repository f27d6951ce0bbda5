//! Translation from remote event shapes into the local event taxonomy.
//!
//! Remote lifecycle chatter (`agent_*`, `status`) is dropped; everything
//! mapped carries the remote event id as its timestamp so answers can
//! reference it.

use crate::remote::sse::SseRecord;
use ai_thread_common::{AgentEvent, MessageContent, Role, ThreadEvent};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Canonical hyphenated UUID, case-insensitive.
static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

/// Whether the remote will accept this as an `answerToEventId`.
///
/// Local event ids are timestamp strings while the remote expects UUIDs, so
/// ids that originated locally never pass; this is a known impedance
/// mismatch between the two id spaces.
pub fn is_uuid(s: &str) -> bool {
    UUID_RE.is_match(s)
}

/// Map one remote SSE record onto a local event. `None` means dropped.
pub fn map_remote_event(record: &SseRecord) -> Option<ThreadEvent> {
    let data: Value = match serde_json::from_str(&record.data) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "dropping remote event with unparseable data");
            return None;
        }
    };
    let timestamp = record.id.clone();
    let event_type = record.event.as_deref().unwrap_or("message");

    let mapped = match event_type {
        "message" => {
            let role = match data
                .get("actor")
                .and_then(|a| a.get("role"))
                .and_then(|r| r.as_str())
            {
                Some("USER") => Role::User,
                // AGENT and anything unexpected read as the assistant side.
                _ => Role::Assistant,
            };
            let name = data
                .get("actor")
                .and_then(|a| a.get("displayName"))
                .and_then(|n| n.as_str())
                .unwrap_or(role.default_name())
                .to_string();
            let content = data
                .get("content")
                .and_then(|c| c.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.get("content").and_then(|c| c.as_str()))
                        .map(MessageContent::text)
                        .collect()
                })
                .unwrap_or_default();
            AgentEvent::Message {
                timestamp,
                role,
                name,
                content,
            }
        }
        "thinking" => AgentEvent::Thinking { timestamp },
        "tool_request" => AgentEvent::ToolRequest {
            tool_request_id: string_or(&data, "toolRequestId", record.id.as_deref()),
            name: data
                .get("toolName")
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string(),
            args: data
                .get("args")
                .map(|args| args.to_string())
                .unwrap_or_default(),
            timestamp,
        },
        "tool_response" => AgentEvent::ToolResponse {
            tool_request_id: string_or(&data, "toolRequestId", record.id.as_deref()),
            output: match data.get("output") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            },
            timestamp,
        },
        "text_chunk" => AgentEvent::TextChunk {
            chunk: data
                .get("chunk")
                .and_then(|c| c.as_str())
                .unwrap_or_default()
                .to_string(),
            timestamp,
        },
        "warning" => AgentEvent::Warn {
            warning: message_or_raw(&data, &record.data),
            timestamp,
        },
        "error" => AgentEvent::Error {
            error: message_or_raw(&data, &record.data),
            timestamp,
        },
        "agent_selected" | "agent_running" | "agent_finished" | "status" => return None,
        other => {
            debug!(event = other, "dropping unmapped remote event");
            return None;
        }
    };

    Some(mapped.into())
}

fn string_or(data: &Value, key: &str, fallback: Option<&str>) -> String {
    data.get(key)
        .and_then(|v| v.as_str())
        .or(fallback)
        .unwrap_or_default()
        .to_string()
}

fn message_or_raw(data: &Value, raw: &str) -> String {
    data.get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(event: &str, id: &str, data: Value) -> SseRecord {
        SseRecord {
            event: Some(event.to_string()),
            id: Some(id.to_string()),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_agent_message_mapping() {
        let mapped = map_remote_event(&record(
            "message",
            "01HZZ",
            json!({
                "actor": {"role": "AGENT", "displayName": "Helper"},
                "content": [{"content": "ok"}]
            }),
        ))
        .unwrap();

        assert_eq!(
            serde_json::to_value(&mapped).unwrap(),
            json!({
                "type": "message",
                "timestamp": "01HZZ",
                "role": "assistant",
                "name": "Helper",
                "content": [{"type": "text", "content": "ok"}]
            })
        );
    }

    #[test]
    fn test_user_message_name_default() {
        let mapped = map_remote_event(&record(
            "message",
            "id-2",
            json!({"actor": {"role": "USER"}, "content": []}),
        ))
        .unwrap();
        let value = serde_json::to_value(&mapped).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["name"], "user");
    }

    #[test]
    fn test_unknown_role_maps_to_assistant() {
        let mapped = map_remote_event(&record(
            "message",
            "id-3",
            json!({"actor": {"role": "SYSTEM"}, "content": []}),
        ))
        .unwrap();
        assert_eq!(serde_json::to_value(&mapped).unwrap()["role"], "assistant");
    }

    #[test]
    fn test_thinking_mapping() {
        let mapped = map_remote_event(&record("thinking", "id-4", json!({}))).unwrap();
        assert_eq!(
            serde_json::to_value(&mapped).unwrap(),
            json!({"type": "thinking", "timestamp": "id-4"})
        );
    }

    #[test]
    fn test_tool_request_mapping() {
        let mapped = map_remote_event(&record(
            "tool_request",
            "id-5",
            json!({"toolName": "search", "args": {"q": "x"}}),
        ))
        .unwrap();
        let value = serde_json::to_value(&mapped).unwrap();
        assert_eq!(value["type"], "tool_request");
        assert_eq!(value["toolRequestId"], "id-5");
        assert_eq!(value["name"], "search");
        assert_eq!(value["args"], "{\"q\":\"x\"}");
    }

    #[test]
    fn test_tool_response_mapping() {
        let mapped = map_remote_event(&record(
            "tool_response",
            "id-6",
            json!({"toolRequestId": "req-9", "output": {"rows": 3}}),
        ))
        .unwrap();
        let value = serde_json::to_value(&mapped).unwrap();
        assert_eq!(value["toolRequestId"], "req-9");
        assert_eq!(value["output"], "{\"rows\":3}");
    }

    #[test]
    fn test_text_chunk_mapping() {
        let mapped =
            map_remote_event(&record("text_chunk", "id-7", json!({"chunk": "par"}))).unwrap();
        assert_eq!(serde_json::to_value(&mapped).unwrap()["chunk"], "par");
    }

    #[test]
    fn test_warning_mapping() {
        let mapped =
            map_remote_event(&record("warning", "id-8", json!({"message": "careful"}))).unwrap();
        assert_eq!(serde_json::to_value(&mapped).unwrap()["warning"], "careful");

        let raw = map_remote_event(&record("warning", "id-9", json!({"other": 1}))).unwrap();
        assert_eq!(
            serde_json::to_value(&raw).unwrap()["warning"],
            "{\"other\":1}"
        );
    }

    #[test]
    fn test_error_mapping() {
        let mapped = map_remote_event(&record("error", "id-10", json!({"message": "boom"}))).unwrap();
        let value = serde_json::to_value(&mapped).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"], "boom");
    }

    #[test]
    fn test_lifecycle_events_dropped() {
        for event in ["agent_selected", "agent_running", "agent_finished", "status"] {
            assert!(map_remote_event(&record(event, "id", json!({}))).is_none());
        }
    }

    #[test]
    fn test_unknown_events_dropped() {
        assert!(map_remote_event(&record("mystery", "id", json!({}))).is_none());
    }

    #[test]
    fn test_uuid_filter() {
        assert!(is_uuid("0198d2fc-9f11-7ab3-8001-9f3f70e3cafe"));
        assert!(is_uuid("0198D2FC-9F11-7AB3-8001-9F3F70E3CAFE"));
        assert!(!is_uuid("0198d2fc9f117ab380019f3f70e3cafe"));
        assert!(!is_uuid("2025-01-01T00:00:00.000Z-00001"));
        assert!(!is_uuid(""));
    }
}
