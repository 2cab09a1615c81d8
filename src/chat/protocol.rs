//! Wire format of the chat channel.
//!
//! The server pushes JSON text frames discriminated by a `type` field:
//!
//! ```json
//! {"type": "message", "data": {"response": "¡Hola!", "cerrada": false}}
//! ```
//!
//! The client sends `{"message": "..."}` for user text and
//! `{"type": "ping"}` as a keepalive.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

pub const GREETING_FALLBACK: &str = "¡Hola! ¿En qué puedo ayudarte?";
pub const MESSAGE_FALLBACK: &str = "Mensaje recibido";
pub const ERROR_FALLBACK: &str = "Ha ocurrido un error";
pub const PROACTIVE_FALLBACK: &str = "¿Hay algo en lo que pueda ayudarte?";

/// Frames sent by the server, as they appear on the wire.
#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum ServerFrame {
    /// Keepalive acknowledgement
    #[serde(rename = "pong")]
    Pong,

    /// First message of a conversation
    #[serde(rename = "greeting")]
    Greeting {
        #[serde(default, deserialize_with = "lenient")]
        data: Option<Payload>,
    },

    /// Assistant reply, possibly closing the conversation
    #[serde(rename = "message")]
    Message {
        #[serde(default, deserialize_with = "lenient")]
        data: Option<Payload>,
    },

    /// Server ended the conversation
    #[serde(rename = "close")]
    Close {
        #[serde(default, deserialize_with = "lenient")]
        data: Option<Payload>,
    },

    /// Server-side failure; the text lives at the top level
    #[serde(rename = "error")]
    Error {
        #[serde(default, deserialize_with = "lenient")]
        message: Option<String>,
    },

    /// Outreach initiated by the server
    #[serde(rename = "proactive")]
    Proactive {
        #[serde(default, deserialize_with = "lenient")]
        data: Option<Payload>,
    },
}

// Extra fields the server sends along (probabilidad, etapa, perfil,
// datos...) are not needed by the widget and are skipped.
#[derive(Deserialize, Debug, Default)]
struct Payload {
    #[serde(default, deserialize_with = "lenient")]
    response: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    message: Option<String>,
    #[serde(default)]
    cerrada: Option<Value>,
}

/// Read a field as `T`, treating a value of the wrong shape as missing so
/// the frame still dispatches by type with its fallback copy.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// `cerrada` closes the conversation for any truthy value, not only `true`.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

const KNOWN_TYPES: &[&str] = &["pong", "greeting", "message", "close", "error", "proactive"];

/// An inbound frame after parsing, with fallback copy already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Pong,
    Greeting(String),
    Message { text: String, closes: bool },
    Close(Option<String>),
    Error(String),
    Proactive(String),
    /// Valid JSON without a recognized `type`
    Unknown(Option<String>),
    /// Text that is not JSON at all; rendered verbatim
    Raw(String),
}

/// Empty strings count as missing, matching how the widget has always
/// treated blank payloads.
fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.is_empty())
}

fn response_or(data: Option<Payload>, fallback: &str) -> String {
    non_empty(data.and_then(|d| d.response)).unwrap_or_else(|| fallback.to_string())
}

/// Parse a raw text frame from the server.
pub fn parse(raw: &str) -> Inbound {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return Inbound::Raw(raw.to_string()),
    };

    let kind = value.get("type").and_then(Value::as_str).map(str::to_string);
    match kind.as_deref() {
        Some(k) if KNOWN_TYPES.contains(&k) => {}
        _ => return Inbound::Unknown(kind),
    }

    // Every field is read leniently so a known type always deserializes
    let frame: ServerFrame = match serde_json::from_value(value) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::warn!("Dropping malformed {:?} frame: {}", kind, err);
            return Inbound::Unknown(kind);
        }
    };

    match frame {
        ServerFrame::Pong => Inbound::Pong,
        ServerFrame::Greeting { data } => Inbound::Greeting(response_or(data, GREETING_FALLBACK)),
        ServerFrame::Message { data } => {
            let closes = data
                .as_ref()
                .and_then(|d| d.cerrada.as_ref())
                .is_some_and(is_truthy);
            Inbound::Message {
                text: response_or(data, MESSAGE_FALLBACK),
                closes,
            }
        }
        ServerFrame::Close { data } => Inbound::Close(non_empty(data.and_then(|d| d.message))),
        ServerFrame::Error { message } => {
            Inbound::Error(non_empty(message).unwrap_or_else(|| ERROR_FALLBACK.to_string()))
        }
        ServerFrame::Proactive { data } => {
            Inbound::Proactive(response_or(data, PROACTIVE_FALLBACK))
        }
    }
}

/// User text sent to the server.
#[derive(Serialize, Debug)]
pub struct OutboundMessage<'a> {
    pub message: &'a str,
}

impl<'a> OutboundMessage<'a> {
    pub fn new(message: &'a str) -> Self {
        Self { message }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub fn ping_frame() -> String {
    json!({"type": "ping"}).to_string()
}
