//! The `{type, value}` wire envelope.

use crate::error::{MarshalError, MarshalResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Tagged wire representation of a value.
///
/// `tag` is the producing descriptor's name. `value` is the payload; nested
/// envelopes inside it are plain JSON objects of the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub value: Json,
}

impl Envelope {
    pub fn new(tag: impl Into<String>, value: Json) -> Self {
        Self {
            tag: tag.into(),
            value,
        }
    }

    /// Convert into its JSON object form.
    pub fn into_json(self) -> Json {
        let mut map = Map::with_capacity(2);
        map.insert("type".to_string(), Json::String(self.tag));
        map.insert("value".to_string(), self.value);
        Json::Object(map)
    }

    /// Read an envelope back out of JSON. `value` may be omitted.
    pub fn from_json(json: &Json) -> MarshalResult<Self> {
        let Json::Object(map) = json else {
            return Err(MarshalError::MalformedEnvelope(format!(
                "expected an object, got {json}"
            )));
        };
        let tag = map
            .get("type")
            .and_then(Json::as_str)
            .ok_or_else(|| MarshalError::MalformedEnvelope(format!("missing type tag in {json}")))?;
        Ok(Self {
            tag: tag.to_string(),
            value: map.get("value").cloned().unwrap_or(Json::Null),
        })
    }
}
