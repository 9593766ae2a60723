use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload unit moved across a channel.
///
/// Either an opaque string or a string-keyed JSON object. The wire
/// encoding is self-describing: a structured message round-trips to the
/// same mapping and a plain string round-trips to a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Message {
    Structured(Map<String, Value>),
    Text(String),
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(text.into())
    }

    pub fn structured(fields: Map<String, Value>) -> Self {
        Message::Structured(fields)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            Message::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Map<String, Value>> {
        match self {
            Message::Text(_) => None,
            Message::Structured(fields) => Some(fields),
        }
    }

    /// Encode for the wire: raw UTF-8 for text, a UTF-8 JSON object for
    /// structured payloads.
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Message::Text(text) => Ok(text.clone().into_bytes()),
            Message::Structured(fields) => serde_json::to_vec(fields),
        }
    }

    /// Decode a datagram. A payload that parses as a JSON object becomes
    /// `Structured`; everything else, including valid JSON scalars, is
    /// kept as the raw text. Malformed UTF-8 is replaced, not rejected.
    pub fn from_wire(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(fields)) => Message::Structured(fields),
            _ => Message::Text(text.into_owned()),
        }
    }
}
