use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use folio_core::{ExpectedVersion, Lease};
use folio_events::{CommittedEvent, EventMetadata, Message};

use super::query::AllQuery;

/// Stream-version mismatch on commit.
///
/// Recoverable: re-read the stream and retry with the current version.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("concurrency error on stream {stream}: expected version {expected}, actual {actual}")]
pub struct ConcurrencyError {
    pub stream: String,
    pub actual: i64,
    pub expected: i64,
    pub events: Vec<Message>,
}

/// Actor-scoped idempotency count mismatch on commit.
///
/// Signals a duplicate or out-of-order command for the actor; callers should
/// not retry blindly.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("actor concurrency error for {actor}: expected count {expected_count}, actual {count}")]
pub struct ActorConcurrencyError {
    /// `name:id` of the actor.
    pub actor: String,
    /// First message of the rejected batch.
    pub event: Option<Message>,
    pub count: usize,
    pub expected_count: usize,
}

/// Event store operation error.
///
/// The two concurrency variants are expected, business-meaningful outcomes
/// and leave the log untouched. `Storage` covers backend faults.
/// Lease contention is never an error: `poll` and `ack` report it through
/// their return values.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    #[error(transparent)]
    ActorConcurrency(#[from] ActorConcurrencyError),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Per-consumer polling state.
///
/// `watermark` is the last acknowledged global id (`-1` before the first ack).
/// `lease`/`expires` are present while a batch is checked out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub consumer: String,
    pub watermark: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<Lease>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn new(consumer: impl Into<String>) -> Self {
        Self {
            consumer: consumer.into(),
            watermark: -1,
            lease: None,
            expires: None,
        }
    }

    /// Whether a lease is checked out and has not expired at `now`.
    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.lease.is_some() && self.expires.is_some_and(|e| e > now)
    }

    /// Whether `lease` is the live lease at `now`.
    pub fn holds(&self, lease: &Lease, now: DateTime<Utc>) -> bool {
        self.is_leased(now) && self.lease.as_ref() == Some(lease)
    }
}

/// Per event name diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStat {
    pub name: String,
    pub count: usize,
    pub stream_count: usize,
    pub first_id: i64,
    pub last_id: i64,
    pub first_created: DateTime<Utc>,
    pub last_created: DateTime<Utc>,
}

/// Append-only event store with competing-consumer subscriptions.
///
/// ## Commit
///
/// `commit()` is the only mutation of the log and is atomic per call:
/// - checks `expected_version` against the stream's current version
///   (`len - 1`, `-1` when empty)
/// - checks the actor's `expected_count` (from `metadata.causation.command.actor`)
///   against the number of events previously committed for that actor id
/// - assigns strictly increasing global ids and contiguous stream versions
///
/// ## Subscriptions
///
/// `poll()` leases the next batch after a consumer's watermark; while the lease
/// is live further polls for the same consumer deliver nothing. `ack()` with
/// the live lease advances the watermark (never backwards) and releases it.
/// Expired leases are simply ignored, letting the next `poll` redeliver.
///
/// ## Implementation Requirements
///
/// Durable backends must keep the version/actor checks and the append atomic
/// with respect to concurrent commits, and must treat `(lease, expires)` as a
/// compare-and-swap pair in `poll` and `ack`.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    fn name(&self) -> &str;

    /// Initialise backing storage (idempotent).
    async fn seed(&self) -> Result<(), EventStoreError>;

    /// Release backing resources.
    async fn dispose(&self) -> Result<(), EventStoreError>;

    /// Erase the log and all subscriptions.
    async fn reset(&self) -> Result<(), EventStoreError>;

    /// Scan the log in ascending id order, invoking `callback` per match.
    ///
    /// Returns the number of events delivered.
    async fn query(
        &self,
        callback: &mut (dyn FnMut(CommittedEvent) + Send),
        query: &AllQuery,
    ) -> Result<usize, EventStoreError>;

    /// Append `events` to `stream` as one atomic batch.
    async fn commit(
        &self,
        stream: &str,
        events: Vec<Message>,
        metadata: EventMetadata,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<CommittedEvent>, EventStoreError>;

    /// Lease and deliver the next batch for `consumer`.
    ///
    /// Delivers nothing while another lease for the consumer is live.
    async fn poll(
        &self,
        consumer: &str,
        names: &[String],
        limit: usize,
        lease: &Lease,
        timeout: std::time::Duration,
        callback: &mut (dyn FnMut(CommittedEvent) + Send),
    ) -> Result<(), EventStoreError>;

    /// Release `lease` and advance the consumer's watermark.
    ///
    /// Returns `false` (without changing anything) when the consumer is
    /// unknown or `lease` is not its live lease.
    async fn ack(
        &self,
        consumer: &str,
        lease: &Lease,
        watermark: i64,
    ) -> Result<bool, EventStoreError>;

    async fn stats(&self) -> Result<Vec<StoreStat>, EventStoreError>;

    async fn subscriptions(&self) -> Result<Vec<Subscription>, EventStoreError>;

    /// Collect the matches of `query`.
    async fn read(&self, query: &AllQuery) -> Result<Vec<CommittedEvent>, EventStoreError> {
        let mut events = Vec::new();
        self.query(&mut |e| events.push(e), query).await?;
        Ok(events)
    }

    /// Current version of `stream` (`-1` when empty).
    async fn stream_version(&self, stream: &str) -> Result<i64, EventStoreError> {
        let mut version = -1;
        self.query(&mut |e| version = e.version, &AllQuery::new().stream(stream))
            .await?;
        Ok(version)
    }
}

#[async_trait::async_trait]
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn seed(&self) -> Result<(), EventStoreError> {
        (**self).seed().await
    }

    async fn dispose(&self) -> Result<(), EventStoreError> {
        (**self).dispose().await
    }

    async fn reset(&self) -> Result<(), EventStoreError> {
        (**self).reset().await
    }

    async fn query(
        &self,
        callback: &mut (dyn FnMut(CommittedEvent) + Send),
        query: &AllQuery,
    ) -> Result<usize, EventStoreError> {
        (**self).query(callback, query).await
    }

    async fn commit(
        &self,
        stream: &str,
        events: Vec<Message>,
        metadata: EventMetadata,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<CommittedEvent>, EventStoreError> {
        (**self)
            .commit(stream, events, metadata, expected_version)
            .await
    }

    async fn poll(
        &self,
        consumer: &str,
        names: &[String],
        limit: usize,
        lease: &Lease,
        timeout: std::time::Duration,
        callback: &mut (dyn FnMut(CommittedEvent) + Send),
    ) -> Result<(), EventStoreError> {
        (**self)
            .poll(consumer, names, limit, lease, timeout, callback)
            .await
    }

    async fn ack(
        &self,
        consumer: &str,
        lease: &Lease,
        watermark: i64,
    ) -> Result<bool, EventStoreError> {
        (**self).ack(consumer, lease, watermark).await
    }

    async fn stats(&self) -> Result<Vec<StoreStat>, EventStoreError> {
        (**self).stats().await
    }

    async fn subscriptions(&self) -> Result<Vec<Subscription>, EventStoreError> {
        (**self).subscriptions().await
    }
}
