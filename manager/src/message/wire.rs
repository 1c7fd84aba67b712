//! Build-progress wire message
//!
//! The image builder publishes `{"topic": "...", "error": "..."}` per step.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::deploy::{BuildStep, Step};

/// Error text attached to payloads that are not a build message at all
pub const PARSE_ERROR: &str = "parse error";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildMessage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub topic: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub error: String,
}

/// Producers send `null` for fields they have nothing to say about
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl BuildMessage {
    pub fn parse_topic(&self) -> Step {
        match self.topic.as_str() {
            "clone" => Step::Clone,
            "build" => Step::Build,
            "push" => Step::Push,
            _ => Step::Unknown,
        }
    }

    pub fn into_build_step(self) -> BuildStep {
        BuildStep {
            step: self.parse_topic(),
            error: self.error,
        }
    }
}

/// Decode a raw payload. Anything but a `{topic, error}` object becomes an
/// `Unknown` step so the consumer sees it instead of it being dropped.
pub fn decode(payload: &[u8]) -> BuildStep {
    // serde accepts a positional array for a struct, only objects are messages
    let message = match serde_json::from_slice::<Value>(payload) {
        Ok(value @ Value::Object(_)) => serde_json::from_value::<BuildMessage>(value).ok(),
        _ => None,
    };

    match message {
        Some(message) => message.into_build_step(),
        None => BuildStep::failed(Step::Unknown, PARSE_ERROR),
    }
}
