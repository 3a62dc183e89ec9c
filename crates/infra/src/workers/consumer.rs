//! Broker consumers.

use tracing::debug;

use folio_events::{CommittedEvent, Projector};

use crate::projector_store::ProjectorStore;

/// A named consumer driven by the [`Broker`](super::Broker).
///
/// Handlers must be idempotent: a batch whose ack does not land (handler
/// failure, lease expiry) is delivered again.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// Consumer name; keys the subscription and the consumer's loop.
    fn name(&self) -> &str;

    /// Event names to poll for. Empty means every event.
    fn events(&self) -> Vec<String>;

    async fn handle(&self, event: &CommittedEvent) -> anyhow::Result<()>;
}

/// Applies a [`Projector`] to a [`ProjectorStore`], one commit per event.
///
/// Each commit is made at `watermark = event.id`, so a redelivered event
/// leaves the rows it already reached untouched.
#[derive(Debug)]
pub struct ProjectorHandler<P> {
    projector: Projector,
    store: P,
}

impl<P> ProjectorHandler<P> {
    pub fn new(projector: Projector, store: P) -> Self {
        Self { projector, store }
    }

    pub fn store(&self) -> &P {
        &self.store
    }
}

#[async_trait::async_trait]
impl<P> EventHandler for ProjectorHandler<P>
where
    P: ProjectorStore,
{
    fn name(&self) -> &str {
        self.projector.name()
    }

    fn events(&self) -> Vec<String> {
        self.projector.events()
    }

    async fn handle(&self, event: &CommittedEvent) -> anyhow::Result<()> {
        let projection = self.projector.project(event)?;
        if projection.is_empty() {
            return Ok(());
        }

        let results = self.store.commit(&projection, event.id).await?;
        debug!(
            projector = %self.projector.name(),
            event_id = event.id,
            affected = results.affected(),
            "projection committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::{json, Map};

    use folio_events::{EventMetadata, Projection, State};

    use crate::projector_store::InMemoryProjectorStore;

    fn obj(value: serde_json::Value) -> State {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn event(id: i64, name: &str, data: serde_json::Value) -> CommittedEvent {
        CommittedEvent {
            id,
            stream: "counter-1".to_string(),
            version: id,
            created: Utc::now(),
            name: name.to_string(),
            data: Some(data),
            metadata: EventMetadata::default(),
        }
    }

    fn counter_projector() -> Projector {
        Projector::new("counters")
            .on("Incremented", |e| {
                let by = e
                    .data
                    .as_ref()
                    .and_then(|d| d.get("total"))
                    .cloned()
                    .unwrap_or(json!(0));
                Projection::new().upsert(obj(json!({"id": e.stream})), obj(json!({"total": by})))
            })
            .unwrap()
    }

    #[tokio::test]
    async fn projector_handler_commits_at_event_id() {
        let store = Arc::new(InMemoryProjectorStore::new());
        let handler = ProjectorHandler::new(counter_projector(), store.clone());
        assert_eq!(handler.name(), "counters");
        assert_eq!(handler.events(), vec!["Incremented".to_string()]);

        handler
            .handle(&event(3, "Incremented", json!({"total": 2})))
            .await
            .unwrap();
        // Redelivery of an older event is gated out.
        handler
            .handle(&event(1, "Incremented", json!({"total": 99})))
            .await
            .unwrap();

        let records = store.load(&["counter-1".to_string()]).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].watermark, 3);
        assert_eq!(records[0].state.get("total"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn unknown_event_is_an_error() {
        let handler =
            ProjectorHandler::new(counter_projector(), Arc::new(InMemoryProjectorStore::new()));
        let err = handler
            .handle(&event(0, "Reset", json!({})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Reset"));
    }
}
