//! The event taxonomy shared by both execution backends and the HTTP layer.
//!
//! Events are internally tagged on `type` with snake_case tags and camelCase
//! field names, matching what the browser client consumes. `ThreadEvent` is
//! the wire-level type: events whose `type` this server does not recognize
//! are carried verbatim as raw JSON so the local backend can forward them
//! untouched.

use serde::{Deserialize, Serialize};

/// Speaker role on a `message` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Default display name when the producer did not supply one.
    pub fn default_name(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One block of message content. Text or an inline base64 image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { content: String },
    #[serde(rename_all = "camelCase")]
    Image { mime_type: String, content: String },
}

impl MessageContent {
    pub fn text(content: impl Into<String>) -> Self {
        MessageContent::Text {
            content: content.into(),
        }
    }
}

/// Every event shape the execution manager produces or consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        role: Role,
        name: String,
        #[serde(default)]
        content: Vec<MessageContent>,
    },
    Thinking {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ToolRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        tool_request_id: String,
        name: String,
        args: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        tool_request_id: String,
        output: String,
    },
    TextChunk {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        chunk: String,
    },
    Warn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        warning: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        error: String,
    },
    /// The agent is waiting for user input.
    Invite {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        invite: String,
    },
    /// Keep-alive for intermediate proxies. Receivers ignore it.
    Heartbeat,
    /// Inbound user input, optionally answering a specific invite and
    /// optionally carrying content blocks (e.g. an uploaded image).
    #[serde(rename_all = "camelCase")]
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        answer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        invite_id: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        content: Vec<MessageContent>,
    },
    /// Inbound OAuth redirect payload, routed to the integration subsystem
    /// rather than the regular answer path.
    #[serde(rename_all = "camelCase")]
    OauthCallback {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
        code: String,
        state: String,
    },
}

/// Wire-level event. Unknown `type` values ride through the `Raw` arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThreadEvent {
    Agent(AgentEvent),
    Raw(serde_json::Value),
}

impl From<AgentEvent> for ThreadEvent {
    fn from(event: AgentEvent) -> Self {
        ThreadEvent::Agent(event)
    }
}

impl ThreadEvent {
    /// The `type` tag of this event, `"unknown"` for untyped raw payloads.
    pub fn event_type(&self) -> &str {
        match self {
            ThreadEvent::Agent(event) => match event {
                AgentEvent::Message { .. } => "message",
                AgentEvent::Thinking { .. } => "thinking",
                AgentEvent::ToolRequest { .. } => "tool_request",
                AgentEvent::ToolResponse { .. } => "tool_response",
                AgentEvent::TextChunk { .. } => "text_chunk",
                AgentEvent::Warn { .. } => "warn",
                AgentEvent::Error { .. } => "error",
                AgentEvent::Invite { .. } => "invite",
                AgentEvent::Heartbeat => "heartbeat",
                AgentEvent::Answer { .. } => "answer",
                AgentEvent::OauthCallback { .. } => "oauth_callback",
            },
            ThreadEvent::Raw(value) => value
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown"),
        }
    }

    pub fn timestamp(&self) -> Option<&str> {
        match self {
            ThreadEvent::Agent(event) => match event {
                AgentEvent::Message { timestamp, .. }
                | AgentEvent::Thinking { timestamp }
                | AgentEvent::ToolRequest { timestamp, .. }
                | AgentEvent::ToolResponse { timestamp, .. }
                | AgentEvent::TextChunk { timestamp, .. }
                | AgentEvent::Warn { timestamp, .. }
                | AgentEvent::Error { timestamp, .. }
                | AgentEvent::Invite { timestamp, .. }
                | AgentEvent::Answer { timestamp, .. }
                | AgentEvent::OauthCallback { timestamp, .. } => timestamp.as_deref(),
                AgentEvent::Heartbeat => None,
            },
            ThreadEvent::Raw(value) => value.get("timestamp").and_then(|v| v.as_str()),
        }
    }

    pub fn heartbeat() -> Self {
        AgentEvent::Heartbeat.into()
    }

    pub fn invite(text: impl Into<String>) -> Self {
        AgentEvent::Invite {
            timestamp: None,
            invite: text.into(),
        }
        .into()
    }

    pub fn warn(message: impl Into<String>) -> Self {
        AgentEvent::Warn {
            timestamp: None,
            warning: message.into(),
        }
        .into()
    }

    pub fn error(message: impl Into<String>) -> Self {
        AgentEvent::Error {
            timestamp: None,
            error: message.into(),
        }
        .into()
    }

    /// Whether this is a persisted conversation message (the replayable kind).
    pub fn is_message(&self) -> bool {
        matches!(self, ThreadEvent::Agent(AgentEvent::Message { .. }))
    }

    pub fn is_user_message(&self) -> bool {
        matches!(
            self,
            ThreadEvent::Agent(AgentEvent::Message {
                role: Role::User,
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_camel_case_round_trip() {
        let event: ThreadEvent = AgentEvent::ToolRequest {
            timestamp: Some("t-1".into()),
            tool_request_id: "req-1".into(),
            name: "search".into(),
            args: "{\"q\":\"x\"}".into(),
        }
        .into();

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_request");
        assert_eq!(value["toolRequestId"], "req-1");

        let back: ThreadEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_timestamp_omitted_when_absent() {
        let event: ThreadEvent = AgentEvent::Message {
            timestamp: None,
            role: Role::Assistant,
            name: "bot".into(),
            content: vec![MessageContent::text("hi")],
        }
        .into();

        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("timestamp"));
        assert!(json.contains("\"type\":\"message\""));
        assert!(json.contains("\"content\":[{\"type\":\"text\",\"content\":\"hi\"}]"));
    }

    #[test]
    fn test_unknown_type_passthrough() {
        let raw = json!({"type": "telemetry_blip", "payload": {"n": 3}});
        let event: ThreadEvent = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(event, ThreadEvent::Raw(_)));
        assert_eq!(event.event_type(), "telemetry_blip");
        assert_eq!(serde_json::to_value(&event).unwrap(), raw);
    }

    #[test]
    fn test_heartbeat_serialization() {
        let json = serde_json::to_string(&ThreadEvent::heartbeat()).unwrap();
        assert_eq!(json, "{\"type\":\"heartbeat\"}");
    }
}
