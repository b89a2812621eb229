//! Wire protocol for controller-agent communication.
//!
//! Every frame is one JSON object:
//!
//! ```json
//! {"protocolVersion":"2.0","requestId":"r-1","timestamp":"…","type":"EXEC_CMD","content":{…}}
//! ```
//!
//! Older controllers send only `type` and `content`, so everything else is
//! optional on the way in.

use chrono::{DateTime, SecondsFormat, Utc};
use host_agent_core::{ExecOutcome, ProcessKind};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Protocol version stamped on outbound frames.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("Invalid {kind} content: {source}")]
    Content {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Raw inbound frame before its content is interpreted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// `EXEC_CMD` content.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCmd {
    pub command: String,
    #[serde(default)]
    pub timeout_ms: Option<i64>,
}

/// `PLUGIN_START` content.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginStart {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub kind: ProcessKind,
}

#[derive(Deserialize)]
struct PluginRef {
    id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InputContent {
    Text(String),
    Wrapped {
        #[serde(default)]
        content: String,
    },
}

/// Interpreted inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    FetchLogs,
    ExecCmd(ExecCmd),
    Input(String),
    PluginStart(PluginStart),
    PluginStop { id: String },
    PluginList,
    Unsupported(String),
}

impl InboundEnvelope {
    /// Parse one frame.
    ///
    /// # Errors
    /// Returns error if the frame is not a JSON object with a `type`.
    pub fn parse(frame: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(frame).map_err(ProtocolError::Envelope)
    }

    /// The request id, treating an empty string as absent.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Interpret the content according to `type`.
    ///
    /// # Errors
    /// Returns error if the content does not match the shape `type` requires.
    pub fn message(&self) -> Result<InboundMessage, ProtocolError> {
        Ok(match self.kind.as_str() {
            "FETCH_LOGS" => InboundMessage::FetchLogs,
            "EXEC_CMD" => InboundMessage::ExecCmd(self.content()?),
            "INPUT" => {
                let text = match &self.content {
                    Value::Null => String::new(),
                    _ => match self.content::<InputContent>()? {
                        InputContent::Text(text) | InputContent::Wrapped { content: text } => text,
                    },
                };
                InboundMessage::Input(text)
            }
            "PLUGIN_START" => InboundMessage::PluginStart(self.content()?),
            "PLUGIN_STOP" => InboundMessage::PluginStop {
                id: self.content::<PluginRef>()?.id,
            },
            "PLUGIN_LIST" => InboundMessage::PluginList,
            other => InboundMessage::Unsupported(other.to_string()),
        })
    }

    fn content<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.content).map_err(|source| ProtocolError::Content {
            kind: self.kind.clone(),
            source,
        })
    }
}

/// Liveness announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub agent_id: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub os_type: String,
}

impl Heartbeat {
    /// An `ONLINE` heartbeat stamped now.
    #[must_use]
    pub fn online(agent_id: impl Into<String>, version: impl Into<String>, os_type: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: "ONLINE".to_string(),
            timestamp: Utc::now(),
            version: version.into(),
            os_type: os_type.into(),
        }
    }
}

/// Outbound message body, serialized as `type` + `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    Log(String),
    LogHistory(Vec<String>),
    Heartbeat(Heartbeat),
    ExecResult(ExecOutcome),
    PluginList(Vec<String>),
}

/// Outbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    pub protocol_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
    #[serde(flatten)]
    pub message: OutboundMessage,
}

impl OutboundEnvelope {
    /// Wrap `message` in an envelope stamped now.
    #[must_use]
    pub fn new(message: OutboundMessage) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            request_id: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            message,
        }
    }

    /// Attach a request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl From<OutboundMessage> for OutboundEnvelope {
    fn from(message: OutboundMessage) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use host_agent_core::ExecStatus;
    use serde_json::json;

    use super::*;

    fn parse(value: &Value) -> InboundEnvelope {
        InboundEnvelope::parse(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_legacy_frame_without_metadata() {
        let env = parse(&json!({"type": "FETCH_LOGS"}));
        assert_eq!(env.message().unwrap(), InboundMessage::FetchLogs);
        assert!(env.request_id().is_none());
        assert!(env.protocol_version.is_none());
    }

    #[test]
    fn test_exec_cmd() {
        let env = parse(&json!({
            "protocolVersion": "2.0",
            "requestId": "r-7",
            "type": "EXEC_CMD",
            "content": {"command": "uptime", "timeoutMs": 1500}
        }));
        assert_eq!(env.request_id(), Some("r-7"));
        assert_eq!(
            env.message().unwrap(),
            InboundMessage::ExecCmd(ExecCmd {
                command: "uptime".into(),
                timeout_ms: Some(1500)
            })
        );

        let env = parse(&json!({"type": "EXEC_CMD", "requestId": "", "content": {"command": "ls"}}));
        assert!(env.request_id().is_none());
        let InboundMessage::ExecCmd(cmd) = env.message().unwrap() else {
            panic!("expected EXEC_CMD");
        };
        assert_eq!(cmd.timeout_ms, None);
    }

    #[test]
    fn test_exec_cmd_without_command_is_rejected() {
        let env = parse(&json!({"type": "EXEC_CMD", "content": {"timeoutMs": 5}}));
        assert!(matches!(env.message(), Err(ProtocolError::Content { .. })));
    }

    #[test]
    fn test_input_shapes() {
        let wrapped = parse(&json!({"type": "INPUT", "content": {"content": "ls\n"}}));
        assert_eq!(wrapped.message().unwrap(), InboundMessage::Input("ls\n".into()));

        let bare = parse(&json!({"type": "INPUT", "content": "pwd"}));
        assert_eq!(bare.message().unwrap(), InboundMessage::Input("pwd".into()));

        let empty = parse(&json!({"type": "INPUT"}));
        assert_eq!(empty.message().unwrap(), InboundMessage::Input(String::new()));
    }

    #[test]
    fn test_plugin_messages() {
        let start = parse(&json!({
            "type": "PLUGIN_START",
            "content": {"id": "collector", "command": "bin/collector", "args": ["-v"], "kind": "TASK"}
        }));
        assert_eq!(
            start.message().unwrap(),
            InboundMessage::PluginStart(PluginStart {
                id: "collector".into(),
                command: "bin/collector".into(),
                args: vec!["-v".into()],
                kind: ProcessKind::Task,
            })
        );

        let defaults = parse(&json!({"type": "PLUGIN_START", "content": {"id": "a", "command": "b"}}));
        let InboundMessage::PluginStart(start) = defaults.message().unwrap() else {
            panic!("expected PLUGIN_START");
        };
        assert!(start.args.is_empty());
        assert_eq!(start.kind, ProcessKind::Service);

        let stop = parse(&json!({"type": "PLUGIN_STOP", "content": {"id": "a"}}));
        assert_eq!(stop.message().unwrap(), InboundMessage::PluginStop { id: "a".into() });
    }

    #[test]
    fn test_unknown_type() {
        let env = parse(&json!({"type": "REBOOT", "content": null}));
        assert_eq!(env.message().unwrap(), InboundMessage::Unsupported("REBOOT".into()));
    }

    #[test]
    fn test_malformed_envelope() {
        assert!(InboundEnvelope::parse(b"{not json").is_err());
        assert!(InboundEnvelope::parse(br#"{"content": 1}"#).is_err());
    }

    #[test]
    fn test_outbound_shape() {
        let env = OutboundEnvelope::new(OutboundMessage::Log("hello".into()));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(json["type"], "LOG");
        assert_eq!(json["content"], "hello");
        assert!(json.get("requestId").is_none());
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));

        let history = OutboundEnvelope::new(OutboundMessage::LogHistory(vec!["a".into(), "b".into()]));
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json["type"], "LOG_HISTORY");
        assert_eq!(json["content"], json!(["a", "b"]));
    }

    #[test]
    fn test_exec_result_and_heartbeat() {
        let outcome = ExecOutcome::finish(Utc::now(), ExecStatus::Failed, 2, "boom".into(), Some("exit status: 2".into()));
        let env = OutboundEnvelope::new(OutboundMessage::ExecResult(outcome)).with_request_id("r-1");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "EXEC_RESULT");
        assert_eq!(json["requestId"], "r-1");
        assert_eq!(json["content"]["status"], "FAILED");
        assert_eq!(json["content"]["exitCode"], 2);
        assert_eq!(json["content"]["errorMessage"], "exit status: 2");

        let hb = OutboundEnvelope::new(OutboundMessage::Heartbeat(Heartbeat::online("host-1", "0.1.0", "linux")));
        let json = serde_json::to_value(&hb).unwrap();
        assert_eq!(json["type"], "HEARTBEAT");
        assert_eq!(json["content"]["agentId"], "host-1");
        assert_eq!(json["content"]["status"], "ONLINE");
        assert_eq!(json["content"]["osType"], "linux");
        assert!(json["content"]["timestamp"].is_string());
    }
}
