use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use folio_core::{ExpectedVersion, Lease};
use folio_events::{CommittedEvent, EventMetadata, Message};

use super::query::{AllQuery, Scan};
use super::r#trait::{
    ActorConcurrencyError, ConcurrencyError, EventStore, EventStoreError, StoreStat, Subscription,
};

#[derive(Debug, Default)]
struct Log {
    /// Global log; an event's id is its index.
    events: Vec<CommittedEvent>,
    subscriptions: BTreeMap<String, Subscription>,
}

/// In-memory event store.
///
/// Reference engine for tests/dev: a single lock makes every commit, lease
/// grant and ack atomic. Not optimized for performance (stream and actor
/// checks scan the log).
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<Log>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_log(&self) -> Result<RwLockReadGuard<'_, Log>, EventStoreError> {
        self.log
            .read()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))
    }

    fn write_log(&self) -> Result<RwLockWriteGuard<'_, Log>, EventStoreError> {
        self.log
            .write()
            .map_err(|_| EventStoreError::Storage("lock poisoned".to_string()))
    }
}

/// Collect matches of `query`, starting right after `query.after`.
///
/// A `limit` of zero means no limit.
fn collect(events: &[CommittedEvent], query: &AllQuery) -> Vec<CommittedEvent> {
    let start = usize::try_from(query.after.saturating_add(1)).unwrap_or(0);
    let limit = query.limit.filter(|l| *l > 0);

    let mut matches = Vec::new();
    for e in events.iter().skip(start) {
        match query.scan(e) {
            Scan::Stop => break,
            Scan::Skip => continue,
            Scan::Match => {
                matches.push(e.clone());
                if limit.is_some_and(|l| matches.len() >= l) {
                    break;
                }
            }
        }
    }
    matches
}

fn expiry(now: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    fn name(&self) -> &str {
        "InMemoryStore"
    }

    async fn seed(&self) -> Result<(), EventStoreError> {
        Ok(())
    }

    async fn dispose(&self) -> Result<(), EventStoreError> {
        self.write_log()?.events.clear();
        Ok(())
    }

    async fn reset(&self) -> Result<(), EventStoreError> {
        let mut log = self.write_log()?;
        log.events.clear();
        log.subscriptions.clear();
        Ok(())
    }

    async fn query(
        &self,
        callback: &mut (dyn FnMut(CommittedEvent) + Send),
        query: &AllQuery,
    ) -> Result<usize, EventStoreError> {
        let matches = collect(&self.read_log()?.events, query);
        let count = matches.len();
        matches.into_iter().for_each(|e| callback(e));
        Ok(count)
    }

    async fn commit(
        &self,
        stream: &str,
        events: Vec<Message>,
        metadata: EventMetadata,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<CommittedEvent>, EventStoreError> {
        let mut log = self.write_log()?;

        let length = log.events.iter().filter(|e| e.stream == stream).count() as i64;
        let actual = length - 1;
        if let ExpectedVersion::Exact(expected) = expected_version {
            if expected != actual {
                return Err(ConcurrencyError {
                    stream: stream.to_string(),
                    actual,
                    expected,
                    events,
                }
                .into());
            }
        }

        if let Some(actor) = metadata.actor() {
            if let Some(expected_count) = actor.expected_count {
                let count = log
                    .events
                    .iter()
                    .filter(|e| e.actor_id() == Some(actor.id.as_str()))
                    .count();
                if count != expected_count {
                    return Err(ActorConcurrencyError {
                        actor: format!("{}:{}", actor.name, actor.id),
                        event: events.into_iter().next(),
                        count,
                        expected_count,
                    }
                    .into());
                }
            }
        }

        // Assign ids and versions, then append (append-only).
        let created = Utc::now();
        let mut version = length;
        let mut committed = Vec::with_capacity(events.len());
        for Message { name, data } in events {
            let event = CommittedEvent {
                id: log.events.len() as i64,
                stream: stream.to_string(),
                version,
                created,
                name,
                data,
                metadata: metadata.clone(),
            };
            version += 1;
            log.events.push(event.clone());
            committed.push(event);
        }

        debug!(
            stream = %stream,
            count = committed.len(),
            version = version - 1,
            "committed events"
        );
        Ok(committed)
    }

    async fn poll(
        &self,
        consumer: &str,
        names: &[String],
        limit: usize,
        lease: &Lease,
        timeout: Duration,
        callback: &mut (dyn FnMut(CommittedEvent) + Send),
    ) -> Result<(), EventStoreError> {
        let now = Utc::now();
        let batch = {
            let mut guard = self.write_log()?;
            let log = &mut *guard;
            let subscription = log
                .subscriptions
                .entry(consumer.to_string())
                .or_insert_with(|| Subscription::new(consumer));

            // Competing consumers are blocked while the current lease is live.
            if subscription.is_leased(now) {
                debug!(consumer = %consumer, "poll skipped: lease still held");
                return Ok(());
            }

            subscription.lease = Some(lease.clone());
            subscription.expires = Some(expiry(now, timeout));

            let mut query = AllQuery::new().after(subscription.watermark).limit(limit);
            if !names.is_empty() {
                query = query.names(names.iter().cloned());
            }
            debug!(
                consumer = %consumer,
                lease = %lease,
                watermark = subscription.watermark,
                "lease granted"
            );
            collect(&log.events, &query)
        };

        batch.into_iter().for_each(|e| callback(e));
        Ok(())
    }

    async fn ack(
        &self,
        consumer: &str,
        lease: &Lease,
        watermark: i64,
    ) -> Result<bool, EventStoreError> {
        let now = Utc::now();
        let mut log = self.write_log()?;

        match log.subscriptions.get_mut(consumer) {
            Some(subscription) if subscription.holds(lease, now) => {
                subscription.watermark = subscription.watermark.max(watermark);
                subscription.lease = None;
                subscription.expires = None;
                debug!(
                    consumer = %consumer,
                    watermark = subscription.watermark,
                    "acknowledged"
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stats(&self) -> Result<Vec<StoreStat>, EventStoreError> {
        let log = self.read_log()?;

        let mut stats: Vec<StoreStat> = Vec::new();
        let mut streams: Vec<HashSet<&str>> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for e in &log.events {
            let i = *index.entry(e.name.as_str()).or_insert_with(|| {
                stats.push(StoreStat {
                    name: e.name.clone(),
                    count: 0,
                    stream_count: 0,
                    first_id: e.id,
                    last_id: e.id,
                    first_created: e.created,
                    last_created: e.created,
                });
                streams.push(HashSet::new());
                stats.len() - 1
            });
            let stat = &mut stats[i];
            stat.count += 1;
            stat.last_id = e.id;
            stat.last_created = e.created;
            streams[i].insert(e.stream.as_str());
            stat.stream_count = streams[i].len();
        }

        Ok(stats)
    }

    async fn subscriptions(&self) -> Result<Vec<Subscription>, EventStoreError> {
        Ok(self.read_log()?.subscriptions.values().cloned().collect())
    }
}
