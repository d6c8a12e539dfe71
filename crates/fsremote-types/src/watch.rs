//! Frames carried on a watch side channel.
//!
//! Each frame is one line of JSON text holding an envelope of
//! [`watch_message`]. The bare line `close` is reserved as the control frame
//! asking the remote side to tear the watcher down.

use crate::envelope::Envelope;
use crate::error::{MarshalError, MarshalResult};
use crate::schema::TypeDef;
use crate::value::Value;
use std::str::FromStr;
use strum::{Display, EnumString};

/// Control frame sent by the local side.
pub const CLOSE_FRAME: &str = "close";

/// Which logical event source a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FrameSource {
    /// Routed to the caller's listener function.
    Listener,
    /// Re-emitted as a named event on the watcher.
    Watcher,
}

/// Description of a remote error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescription {
    pub name: String,
    pub message: String,
    pub code: Option<String>,
}

impl std::fmt::Display for ErrorDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    None,
    Text(String),
    Bytes(Vec<u8>),
    Error(ErrorDescription),
}

impl FrameData {
    /// The payload as a native value.
    pub fn to_value(&self) -> Value {
        match self {
            FrameData::None => Value::Undefined,
            FrameData::Text(s) => Value::String(s.clone()),
            FrameData::Bytes(b) => Value::Buffer(b.clone()),
            FrameData::Error(e) => Value::object([
                ("name", Value::from(e.name.as_str())),
                ("message", Value::from(e.message.as_str())),
                ("code", Value::from(e.code.clone())),
            ]),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Undefined => FrameData::None,
            Value::String(s) => FrameData::Text(s.clone()),
            Value::Buffer(b) => FrameData::Bytes(b.clone()),
            Value::Object(_) => FrameData::Error(ErrorDescription {
                name: value.field("name").as_str()?.to_string(),
                message: value.field("message").as_str()?.to_string(),
                code: value.field("code").as_str().map(str::to_string),
            }),
            _ => return None,
        })
    }
}

fn error_description() -> TypeDef {
    TypeDef::object([
        ("name", TypeDef::string()),
        ("message", TypeDef::string()),
        ("code", TypeDef::maybe(TypeDef::string())),
    ])
}

/// Descriptor for a watch frame.
pub fn watch_message() -> TypeDef {
    TypeDef::object([
        ("type", TypeDef::string()),
        ("eventType", TypeDef::string()),
        (
            "data",
            TypeDef::union([
                TypeDef::undefined(),
                TypeDef::string(),
                TypeDef::buffer(),
                error_description(),
            ]),
        ),
    ])
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchFrame {
    pub source: FrameSource,
    pub event_type: String,
    pub data: FrameData,
}

impl WatchFrame {
    pub fn listener(event_type: impl Into<String>, data: FrameData) -> Self {
        Self {
            source: FrameSource::Listener,
            event_type: event_type.into(),
            data,
        }
    }

    pub fn watcher(event_type: impl Into<String>, data: FrameData) -> Self {
        Self {
            source: FrameSource::Watcher,
            event_type: event_type.into(),
            data,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::object([
            ("type", Value::String(self.source.to_string())),
            ("eventType", Value::from(self.event_type.as_str())),
            ("data", self.data.to_value()),
        ])
    }

    /// Encode as one line of JSON text, without the newline.
    pub fn encode(&self) -> MarshalResult<String> {
        let envelope = watch_message().serialize(&self.to_value())?;
        serde_json::to_string(&envelope).map_err(|e| MarshalError::MalformedEnvelope(e.to_string()))
    }

    /// Decode one line of JSON text.
    pub fn decode(text: &str) -> MarshalResult<Self> {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| MarshalError::MalformedEnvelope(format!("{e}: {text}")))?;
        let def = watch_message();
        let value = def.deserialize(&Envelope::from_json(&json)?)?;
        if !def.check(&value) {
            return Err(MarshalError::mismatch(def.name(), &value));
        }
        let kind = value.field("type").as_str().unwrap_or_default();
        let source = FrameSource::from_str(kind)
            .map_err(|_| MarshalError::malformed(def.name(), format!("unknown frame type {kind:?}")))?;
        let data = FrameData::from_value(value.field("data"))
            .ok_or_else(|| MarshalError::malformed(def.name(), "unreadable data"))?;
        Ok(Self {
            source,
            event_type: value.field("eventType").as_str().unwrap_or_default().to_string(),
            data,
        })
    }
}
