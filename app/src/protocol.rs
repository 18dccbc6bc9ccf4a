//! Tag-based message protocol spoken by the remote agent.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// A single name/value tag. Values are strings on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    pub fn action(action: Action) -> Self {
        Self::new("Action", action.as_str())
    }
}

/// Actions understood by the agent and the caller's process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    GetUser,
    Status,
    GetArbitrageData,
    Setup,
    Start,
    Stop,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GetUser => "getUser",
            Action::Status => "Status",
            Action::GetArbitrageData => "GetArbitrageData",
            Action::Setup => "Setup",
            Action::Start => "Start",
            Action::Stop => "Stop",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalised result of a dry-run or message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub tags: Vec<Tag>,
    pub data: Option<String>,
    /// Explicit error reported by the agent.
    pub error: Option<String>,
}

impl RawResponse {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.value.as_str())
    }

    /// True when the named tag carries a boolean true.
    pub fn tag_is_true(&self, name: &str) -> bool {
        self.tag(name)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn with_tags(tags: Vec<Tag>) -> Self {
        Self { tags, ..Self::default() }
    }

    pub fn with_data(data: impl Into<String>) -> Self {
        Self { data: Some(data.into()), ..Self::default() }
    }

    pub fn with_error(error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Self::default() }
    }
}

/// Result envelope returned by the compute unit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultEnvelope {
    #[serde(rename = "Messages", default)]
    pub messages: Vec<EnvelopeMessage>,
    #[serde(rename = "Error", default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvelopeMessage {
    #[serde(rename = "Tags", default)]
    pub tags: Vec<Tag>,
    #[serde(rename = "Data", default)]
    pub data: Option<Value>,
}

impl From<ResultEnvelope> for RawResponse {
    fn from(envelope: ResultEnvelope) -> Self {
        let first = envelope.messages.into_iter().next().unwrap_or_default();
        let tag_error = first
            .tags
            .iter()
            .find(|t| t.name == "Error")
            .map(|t| t.value.clone());
        let error = envelope
            .error
            .and_then(|e| value_to_text(&e))
            .or(tag_error);
        RawResponse {
            tags: first.tags,
            data: first.data.and_then(|d| value_to_text(&d)),
            error,
        }
    }
}

/// Stringify a JSON value; null and empty strings count as absent.
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
