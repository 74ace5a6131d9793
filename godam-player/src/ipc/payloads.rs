use crate::core::{
    ClientResult, CommandName, CorrelationId, EventName, ERROR_SUFFIX, MESSAGE_NAMESPACE,
    UNKNOWN_ERROR_MESSAGE,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Outbound
// =============================================================================

/// Command envelope posted to the player iframe:
/// `{ type: "godam:<command>", payload, id }`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: Value,
    pub id: CorrelationId,
}

impl OutboundEnvelope {
    pub fn command(command: &str, payload: Value, id: CorrelationId) -> Self {
        Self {
            message_type: format!("{MESSAGE_NAMESPACE}{command}"),
            payload,
            id,
        }
    }

    /// Command name without the namespace prefix
    pub fn command_name(&self) -> &str {
        self.message_type
            .strip_prefix(MESSAGE_NAMESPACE)
            .unwrap_or(&self.message_type)
    }

    pub fn to_value(&self) -> ClientResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Typed payloads of the commands that carry arguments
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum CommandArgs {
    Seek { time: f64 },
    SetVolume { volume: f64 },
    SetMuted { muted: bool },
}

impl CommandArgs {
    pub fn into_value(self) -> ClientResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// Why a message was dropped by the shape filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    NotAnObject,
    MissingType,
    ForeignNamespace,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectReason::NotAnObject => "message data is not an object",
            RejectReason::MissingType => "message has no string 'type'",
            RejectReason::ForeignNamespace => "message type is outside the godam namespace",
        };
        f.write_str(text)
    }
}

/// Logical kind of an inbound message, decoded once from its `type`
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InboundKind {
    /// `godam:<command>`
    Reply { command: CommandName },
    /// `godam:<command>:error`
    Failure { command: CommandName },
    /// `godam:ready`
    Ready,
    /// `godam:event` carrying a named player event
    Event { name: EventName, data: Value },
    /// In the namespace but not actionable (e.g. an event without a name)
    Unrecognized { raw: String },
}

/// A namespaced message received from the player frame
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    #[serde(flatten)]
    pub kind: InboundKind,
    pub id: Option<String>,
    pub payload: Value,
}

impl InboundEnvelope {
    /// Applies the shape filter and classifies the message
    pub fn decode(data: &Value) -> Result<Self, RejectReason> {
        let object = data.as_object().ok_or(RejectReason::NotAnObject)?;
        let message_type = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or(RejectReason::MissingType)?;
        let raw = message_type
            .strip_prefix(MESSAGE_NAMESPACE)
            .ok_or(RejectReason::ForeignNamespace)?;

        let payload = object.get("payload").cloned().unwrap_or(Value::Null);
        let id = object.get("id").and_then(Value::as_str).map(str::to_string);

        let kind = if let Some(command) = raw.strip_suffix(ERROR_SUFFIX) {
            InboundKind::Failure {
                command: command.to_string(),
            }
        } else if raw == "ready" {
            InboundKind::Ready
        } else if raw == "event" {
            match payload.get("event").and_then(Value::as_str) {
                Some(name) => InboundKind::Event {
                    name: name.to_string(),
                    data: event_data(&payload),
                },
                None => InboundKind::Unrecognized {
                    raw: raw.to_string(),
                },
            }
        } else {
            InboundKind::Reply {
                command: raw.to_string(),
            }
        };

        Ok(Self { kind, id, payload })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.kind, InboundKind::Failure { .. })
    }

    /// Remote error text of a failure response
    pub fn failure_message(&self) -> String {
        self.payload
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_ERROR_MESSAGE)
            .to_string()
    }
}

/// Event data is the payload's `data` field when present, otherwise the
/// payload without its `event` key.
fn event_data(payload: &Value) -> Value {
    if let Some(data) = payload.get("data") {
        return data.clone();
    }
    match payload {
        Value::Object(map) => {
            let mut rest = map.clone();
            rest.remove("event");
            Value::Object(rest)
        }
        other => other.clone(),
    }
}
