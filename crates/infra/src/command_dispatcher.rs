//! Command execution pipeline (producer side of the event store).
//!
//! ```text
//! Command
//!   ↓
//! 1. Read the aggregate stream from the store
//!   ↓
//! 2. Rehydrate state (apply historical events in version order)
//!   ↓
//! 3. Handle command (pure decision, produces messages)
//!   ↓
//! 4. Commit messages with `ExpectedVersion::Exact(current)` and causation metadata
//! ```
//!
//! Conflicts detected by the store are surfaced unchanged so callers can tell
//! a concurrency conflict apart from a validation failure or a backend fault.

use thiserror::Error;
use tracing::debug;

use folio_core::{DomainError, ExpectedVersion};
use folio_events::{Actor, Aggregate, CommittedEvent, EventMetadata, Message};

use crate::event_store::{
    ActorConcurrencyError, AllQuery, ConcurrencyError, EventStore, EventStoreError,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The stream moved on since it was read.
    #[error(transparent)]
    Concurrency(ConcurrencyError),

    /// The actor's command was already applied (or arrived out of order).
    #[error(transparent)]
    ActorConcurrency(ActorConcurrencyError),

    /// Domain validation failure (deterministic).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Domain invariant failure (deterministic).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// No handler for the command or for a historical event.
    #[error("no handler registered for {0}")]
    MissingHandler(String),

    /// The loaded stream is not a contiguous version sequence.
    #[error("corrupt stream {stream}: expected version {expected}, found {found}")]
    CorruptStream {
        stream: String,
        expected: i64,
        found: i64,
    },

    /// The event store failed.
    #[error("event store error: {0}")]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(e) => DispatchError::Concurrency(e),
            EventStoreError::ActorConcurrency(e) => DispatchError::ActorConcurrency(e),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::MissingHandler(name) => DispatchError::MissingHandler(name),
            DomainError::DuplicateHandler(name) => {
                DispatchError::Validation(format!("duplicate handler {name}"))
            }
        }
    }
}

impl DispatchError {
    /// Whether re-reading the stream and retrying may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Optimistic concurrency: the dispatcher expects the stream version it read.
/// If another writer commits in between, the commit fails with
/// [`DispatchError::Concurrency`]; callers reload and retry, or surface the
/// conflict.
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Dispatch `command` against the current state of `aggregate`'s stream.
    ///
    /// Returns the committed events; empty when the command decided nothing.
    /// When `actor` carries an expected count, the store's actor check applies.
    pub async fn dispatch<A>(
        &self,
        aggregate: &A,
        command: Message,
        actor: Option<Actor>,
        correlation: Option<String>,
    ) -> Result<Vec<CommittedEvent>, DispatchError>
    where
        A: Aggregate,
    {
        let stream = aggregate.stream();

        // 1) Read history
        let history = self.store.read(&AllQuery::new().stream(stream.clone())).await?;
        let version = validate_stream(&stream, &history)?;

        // 2) Rehydrate
        let mut state = A::State::default();
        for event in &history {
            aggregate.apply(&mut state, event)?;
        }

        // 3) Decide
        let decided = aggregate.handle(&state, &command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Commit
        let mut metadata = EventMetadata::for_command(command.name.clone(), Some(stream.clone()));
        if let Some(actor) = actor {
            metadata = metadata.with_actor(actor);
        }
        if let Some(correlation) = correlation {
            metadata = metadata.with_correlation(correlation);
        }

        let committed = self
            .store
            .commit(&stream, decided, metadata, ExpectedVersion::Exact(version))
            .await?;
        debug!(
            stream = %stream,
            command = %command.name,
            count = committed.len(),
            "command dispatched"
        );
        Ok(committed)
    }
}

/// Checks versions run `0..n` and returns the current version (`-1` when empty).
fn validate_stream(stream: &str, history: &[CommittedEvent]) -> Result<i64, DispatchError> {
    let mut expected = 0;
    for event in history {
        if event.version != expected {
            return Err(DispatchError::CorruptStream {
                stream: stream.to_string(),
                expected,
                found: event.version,
            });
        }
        expected += 1;
    }
    Ok(expected - 1)
}
