use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::Message;

/// The actor a command was issued on behalf of.
///
/// `expected_count` enables actor-scoped idempotency: when present, the store
/// rejects the commit unless exactly that many events were previously
/// committed on behalf of this actor id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "expectedCount", skip_serializing_if = "Option::is_none")]
    pub expected_count: Option<usize>,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            expected_count: None,
        }
    }

    pub fn with_expected_count(mut self, count: usize) -> Self {
        self.expected_count = Some(count);
        self
    }
}

/// The command that caused a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCausation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
}

/// The committed event that caused a commit (policies, process managers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCausation {
    pub name: String,
    pub stream: String,
    pub id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Causation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandCausation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventCausation>,
}

/// Metadata attached to every event of a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
    #[serde(default)]
    pub causation: Causation,
}

impl EventMetadata {
    /// Metadata for events produced while handling the named command.
    pub fn for_command(name: impl Into<String>, stream: Option<String>) -> Self {
        Self {
            correlation: None,
            causation: Causation {
                command: Some(CommandCausation {
                    name: name.into(),
                    stream,
                    actor: None,
                }),
                event: None,
            },
        }
    }

    /// Metadata for events (or commands) produced in reaction to a committed event.
    ///
    /// The correlation of the triggering event is carried over.
    pub fn for_event(event: &CommittedEvent) -> Self {
        Self {
            correlation: event.metadata.correlation.clone(),
            causation: Causation {
                command: None,
                event: Some(EventCausation {
                    name: event.name.clone(),
                    stream: event.stream.clone(),
                    id: event.id,
                }),
            },
        }
    }

    /// Attach an actor to the command causation, creating an anonymous one if
    /// none exists yet.
    pub fn with_actor(mut self, actor: Actor) -> Self {
        let command = self.causation.command.get_or_insert_with(|| CommandCausation {
            name: String::new(),
            stream: None,
            actor: None,
        });
        command.actor = Some(actor);
        self
    }

    pub fn with_correlation(mut self, correlation: impl Into<String>) -> Self {
        self.correlation = Some(correlation.into());
        self
    }

    pub fn actor(&self) -> Option<&Actor> {
        self.causation.command.as_ref().and_then(|c| c.actor.as_ref())
    }
}

/// An event persisted in the global log.
///
/// - `id` is the global position (unique, strictly increasing across streams)
/// - `version` is the 0-based position within `stream`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedEvent {
    pub id: i64,
    pub stream: String,
    pub version: i64,
    pub created: DateTime<Utc>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl CommittedEvent {
    /// Id of the actor on whose behalf this event was committed.
    pub fn actor_id(&self) -> Option<&str> {
        self.metadata.actor().map(|a| a.id.as_str())
    }

    pub fn correlation(&self) -> Option<&str> {
        self.metadata.correlation.as_deref()
    }

    /// The message this event was committed from.
    pub fn message(&self) -> Message {
        Message {
            name: self.name.clone(),
            data: self.data.clone(),
        }
    }
}
