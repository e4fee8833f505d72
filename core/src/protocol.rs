//! Wire protocol between in-page adapters and the host bridge.
//!
//! Adapters only ever produce two message kinds, `currentuser` and
//! `newmessage`. Each is delivered as a [`BridgeMessage`] whose `response`
//! field carries the JSON encoding of the payload. The host side decodes the
//! same shape back into a [`HostEvent`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Prefix the in-page bridge puts in front of every console line it emits.
pub const CONSOLE_PREFIX: &str = "PYWEBVIEW_MESSAGE:";

/// Errors from encoding or decoding bridge traffic
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed bridge message: {0}")]
    Malformed(String),
}

/// The seller/shop currently logged in on the monitored page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    pub user_name: String,
    pub mall_name: String,
    pub user_id: String,
    pub mall_id: String,
    pub avatar: String,
}

/// Unread-message tally observed at one sampling instant.
///
/// `has_new_message` is always derived from the count, so the only way to
/// build one is from a count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "MessageStateWire")]
pub struct MessageState {
    has_new_message: bool,
    new_message_count: u32,
}

impl MessageState {
    pub fn new(new_message_count: u32) -> Self {
        Self {
            has_new_message: new_message_count > 0,
            new_message_count,
        }
    }

    pub fn has_new_message(&self) -> bool {
        self.has_new_message
    }

    pub fn new_message_count(&self) -> u32 {
        self.new_message_count
    }
}

// Incoming `hasNewMessage` is ignored and recomputed from the count.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MessageStateWire {
    new_message_count: u32,
}

impl From<MessageStateWire> for MessageState {
    fn from(wire: MessageStateWire) -> Self {
        MessageState::new(wire.new_message_count)
    }
}

/// The two message kinds an adapter reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    CurrentUser,
    NewMessage,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::CurrentUser => "currentuser",
            ReportKind::NewMessage => "newmessage",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One extraction result ready to be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    CurrentUser(Identity),
    NewMessage(MessageState),
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        match self {
            Report::CurrentUser(_) => ReportKind::CurrentUser,
            Report::NewMessage(_) => ReportKind::NewMessage,
        }
    }

    /// Encode into the `{ type, response }` envelope, with `response` as a
    /// JSON string of the payload.
    pub fn encode(&self) -> Result<BridgeMessage, ProtocolError> {
        let response = match self {
            Report::CurrentUser(identity) => serde_json::to_string(identity)?,
            Report::NewMessage(state) => serde_json::to_string(state)?,
        };
        Ok(BridgeMessage {
            kind: self.kind().as_str().to_string(),
            response,
        })
    }
}

/// The envelope handed to the host bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub response: String,
}

impl BridgeMessage {
    /// Render as the console line the in-page bridge logs.
    pub fn to_console_line(&self) -> Result<String, ProtocolError> {
        Ok(format!("{CONSOLE_PREFIX}{}", serde_json::to_string(self)?))
    }
}

/// A bridge message as understood by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    CurrentUser(Identity),
    NewMessage(MessageState),
    /// Any other message type, such as `receiveMessage`, passed through as-is.
    Other { kind: String, payload: Value },
}

impl HostEvent {
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Self::from_value(serde_json::from_str(raw)?)
    }

    /// Decode a `{ type, response }` value. `response` may be an encoded
    /// string or an inline object; a missing `type` is the empty kind and a
    /// missing `response` is `{}`.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut envelope) = value else {
            return Err(ProtocolError::Malformed(
                "bridge message must be an object".to_string(),
            ));
        };

        let kind = match envelope.remove("type") {
            Some(Value::String(kind)) => kind,
            None | Some(Value::Null) => String::new(),
            Some(other) => {
                return Err(ProtocolError::Malformed(format!(
                    "type must be a string, got {other}"
                )));
            }
        };

        let payload = match envelope.remove("response") {
            Some(Value::String(encoded)) => serde_json::from_str(&encoded)?,
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(inline) => inline,
        };

        let event = if kind == ReportKind::CurrentUser.as_str() {
            HostEvent::CurrentUser(serde_json::from_value(payload)?)
        } else if kind == ReportKind::NewMessage.as_str() {
            HostEvent::NewMessage(serde_json::from_value(payload)?)
        } else {
            HostEvent::Other { kind, payload }
        };
        Ok(event)
    }
}

/// Decode a console line emitted by the in-page bridge. Lines without the
/// bridge prefix are not bridge traffic and yield `None`.
pub fn parse_console_line(line: &str) -> Option<Result<HostEvent, ProtocolError>> {
    line.strip_prefix(CONSOLE_PREFIX).map(HostEvent::from_json)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
