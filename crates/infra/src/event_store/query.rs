//! Filters for scanning the global ("all") stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use folio_events::CommittedEvent;

/// Filter criteria for [`EventStore::query`](super::EventStore::query).
///
/// All supplied filters apply conjunctively. Ids and creation times grow
/// together, so `before` and `created_before` end the scan at the first
/// event past the bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllQuery {
    /// Exact stream name.
    pub stream: Option<String>,
    /// Event name membership.
    pub names: Option<Vec<String>>,
    /// Causation actor id.
    pub actor: Option<String>,
    pub correlation: Option<String>,
    /// Exclusive lower id bound (`-1` reads from the start).
    pub after: i64,
    /// Exclusive upper id bound.
    pub before: Option<i64>,
    /// Exclusive lower creation-time bound.
    pub created_after: Option<DateTime<Utc>>,
    /// Exclusive upper creation-time bound.
    pub created_before: Option<DateTime<Utc>>,
    /// Maximum number of events to deliver.
    pub limit: Option<usize>,
}

impl Default for AllQuery {
    fn default() -> Self {
        Self {
            stream: None,
            names: None,
            actor: None,
            correlation: None,
            after: -1,
            before: None,
            created_after: None,
            created_before: None,
            limit: None,
        }
    }
}

/// Outcome of testing one event against an [`AllQuery`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Scan {
    Match,
    Skip,
    Stop,
}

impl AllQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    pub fn names<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn correlation(mut self, correlation: impl Into<String>) -> Self {
        self.correlation = Some(correlation.into());
        self
    }

    pub fn after(mut self, after: i64) -> Self {
        self.after = after;
        self
    }

    pub fn before(mut self, before: i64) -> Self {
        self.before = Some(before);
        self
    }

    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Classify an event read at or after `after + 1`.
    pub fn scan(&self, e: &CommittedEvent) -> Scan {
        if self.before.is_some_and(|b| e.id >= b) {
            return Scan::Stop;
        }
        if self.created_before.is_some_and(|b| e.created >= b) {
            return Scan::Stop;
        }
        if self.stream.as_deref().is_some_and(|s| s != e.stream) {
            return Scan::Skip;
        }
        if self.actor.as_deref().is_some_and(|a| e.actor_id() != Some(a)) {
            return Scan::Skip;
        }
        if self.names.as_ref().is_some_and(|n| !n.contains(&e.name)) {
            return Scan::Skip;
        }
        if self.correlation.as_deref().is_some_and(|c| e.correlation() != Some(c)) {
            return Scan::Skip;
        }
        if self.created_after.is_some_and(|a| e.created <= a) {
            return Scan::Skip;
        }
        Scan::Match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_events::{Actor, EventMetadata};

    fn event(id: i64, stream: &str, name: &str) -> CommittedEvent {
        CommittedEvent {
            id,
            stream: stream.to_string(),
            version: 0,
            created: Utc::now(),
            name: name.to_string(),
            data: None,
            metadata: EventMetadata::default()
                .with_actor(Actor::new("user-1", "User"))
                .with_correlation("corr-1"),
        }
    }

    #[test]
    fn empty_query_matches_everything() {
        assert_eq!(AllQuery::new().scan(&event(0, "a", "X")), Scan::Match);
    }

    #[test]
    fn filters_skip_non_matching_events() {
        let e = event(3, "a", "X");
        assert_eq!(AllQuery::new().stream("b").scan(&e), Scan::Skip);
        assert_eq!(AllQuery::new().names(["Y"]).scan(&e), Scan::Skip);
        assert_eq!(AllQuery::new().actor("user-2").scan(&e), Scan::Skip);
        assert_eq!(AllQuery::new().correlation("corr-2").scan(&e), Scan::Skip);
        assert_eq!(
            AllQuery::new().stream("a").names(["X", "Y"]).actor("user-1").correlation("corr-1").scan(&e),
            Scan::Match
        );
    }

    #[test]
    fn upper_bounds_stop_the_scan() {
        let e = event(3, "a", "X");
        assert_eq!(AllQuery::new().before(3).scan(&e), Scan::Stop);
        assert_eq!(AllQuery::new().before(4).scan(&e), Scan::Match);
        assert_eq!(AllQuery::new().created_before(e.created).scan(&e), Scan::Stop);
        assert_eq!(AllQuery::new().created_after(e.created).scan(&e), Scan::Skip);
    }
}
