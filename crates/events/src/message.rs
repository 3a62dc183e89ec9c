use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A named message with an optional structured payload.
///
/// Messages are the pre-commit shape of events (and the shape of commands):
/// the store turns them into [`CommittedEvent`](crate::CommittedEvent)s by
/// assigning a global id, stream version and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl Message {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
        }
    }

    pub fn with_data(name: impl Into<String>, data: JsonValue) -> Self {
        Self {
            name: name.into(),
            data: Some(data),
        }
    }
}
