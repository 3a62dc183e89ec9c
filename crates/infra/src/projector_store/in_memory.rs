use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value as JsonValue;
use tracing::debug;

use folio_events::{
    CommitCount, Projection, ProjectionQuery, ProjectionRecord, ProjectionResults, State,
};

use super::condition::{evaluate, key_text, matches_filter};
use super::r#trait::{ProjectorStore, ProjectorStoreError};

type Records = BTreeMap<String, ProjectionRecord>;

/// In-memory projector store for tests/dev.
///
/// Records are keyed by their `id` and scanned in id order.
#[derive(Debug, Default)]
pub struct InMemoryProjectorStore {
    records: RwLock<Records>,
}

impl InMemoryProjectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_records(&self) -> Result<RwLockReadGuard<'_, Records>, ProjectorStoreError> {
        self.records
            .read()
            .map_err(|_| ProjectorStoreError::Storage("lock poisoned".to_string()))
    }

    fn write_records(&self) -> Result<RwLockWriteGuard<'_, Records>, ProjectorStoreError> {
        self.records
            .write()
            .map_err(|_| ProjectorStoreError::Storage("lock poisoned".to_string()))
    }
}

/// Record key addressed by a `where.id`, if any.
fn addressed_id(filter: &State) -> Result<Option<String>, ProjectorStoreError> {
    match filter.get("id") {
        None | Some(JsonValue::Null) => Ok(None),
        Some(v @ (JsonValue::String(_) | JsonValue::Number(_) | JsonValue::Bool(_))) => {
            Ok(Some(key_text(v)))
        }
        Some(other) => Err(ProjectorStoreError::InvalidRecord(format!(
            "unsupported id {other}"
        ))),
    }
}

/// Keys of records eligible at `watermark` and matching `filter`.
fn select(records: &Records, watermark: i64, filter: &State) -> Vec<String> {
    records
        .iter()
        .filter(|(_, r)| r.watermark < watermark && matches_filter(&r.state, filter))
        .map(|(key, _)| key.clone())
        .collect()
}

#[async_trait::async_trait]
impl ProjectorStore for InMemoryProjectorStore {
    fn name(&self) -> &str {
        "InMemoryProjectorStore"
    }

    async fn seed(&self) -> Result<(), ProjectorStoreError> {
        Ok(())
    }

    async fn dispose(&self) -> Result<(), ProjectorStoreError> {
        self.write_records()?.clear();
        Ok(())
    }

    async fn load(&self, ids: &[String]) -> Result<Vec<ProjectionRecord>, ProjectorStoreError> {
        let records = self.read_records()?;
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }

    async fn commit(
        &self,
        projection: &Projection,
        watermark: i64,
    ) -> Result<ProjectionResults, ProjectorStoreError> {
        // Validate addressed ids up front so a bad entry leaves the table untouched.
        let seeds = projection
            .upserts
            .iter()
            .map(|u| addressed_id(&u.filter))
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = self.write_records()?;
        let mut results = ProjectionResults::new(watermark);

        for (upsert, seed) in projection.upserts.iter().zip(seeds) {
            if let Some(id) = seed {
                records.entry(id.clone()).or_insert_with(|| {
                    let mut state = upsert.values.clone();
                    state.insert("id".to_string(), JsonValue::String(id));
                    ProjectionRecord {
                        state,
                        watermark: -1,
                    }
                });
            }

            let selected = select(&records, watermark, &upsert.filter);
            for key in &selected {
                if let Some(record) = records.get_mut(key) {
                    record
                        .state
                        .extend(upsert.values.iter().map(|(k, v)| (k.clone(), v.clone())));
                    // Record ids are immutable.
                    record
                        .state
                        .insert("id".to_string(), JsonValue::String(key.clone()));
                    record.watermark = watermark;
                }
            }
            results.upserted.push(CommitCount {
                filter: upsert.filter.clone(),
                count: selected.len(),
            });
        }

        for delete in &projection.deletes {
            let selected = select(&records, watermark, &delete.filter);
            for key in &selected {
                records.remove(key);
            }
            results.deleted.push(CommitCount {
                filter: delete.filter.clone(),
                count: selected.len(),
            });
        }

        debug!(
            watermark,
            affected = results.affected(),
            "projection committed"
        );
        Ok(results)
    }

    async fn query(
        &self,
        query: &ProjectionQuery,
        callback: &mut (dyn FnMut(ProjectionRecord) + Send),
    ) -> Result<usize, ProjectorStoreError> {
        let limit = query.limit.filter(|l| *l > 0);
        let (count, delivered) = {
            let records = self.read_records()?;
            let mut count = 0;
            let mut delivered = Vec::new();
            for record in records.values() {
                let matched = query
                    .filter
                    .iter()
                    .all(|(field, condition)| evaluate(condition, record.state.get(field)));
                if matched {
                    count += 1;
                    if limit.is_none_or(|l| count <= l) {
                        delivered.push(record.clone());
                    }
                }
            }
            (count, delivered)
        };

        delivered.into_iter().for_each(|r| callback(r));
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_events::Condition;
    use serde_json::json;

    fn state(value: JsonValue) -> State {
        value.as_object().cloned().unwrap()
    }

    async fn load_one(store: &InMemoryProjectorStore, id: &str) -> Option<ProjectionRecord> {
        store.load(&[id.to_string()]).await.unwrap().into_iter().next()
    }

    #[tokio::test]
    async fn upsert_by_id_round_trips_through_load() {
        let store = InMemoryProjectorStore::new();
        let projection = Projection::new().upsert(state(json!({ "id": "x" })), state(json!({ "n": 1 })));

        let results = store.commit(&projection, 0).await.unwrap();
        assert_eq!(results.upserted[0].count, 1);
        assert_eq!(results.watermark, 0);

        let record = load_one(&store, "x").await.unwrap();
        assert_eq!(record.state["n"], json!(1));
        assert_eq!(record.id(), Some("x"));
        assert_eq!(record.watermark, 0);
    }

    #[tokio::test]
    async fn repeated_commit_affects_no_rows() {
        let store = InMemoryProjectorStore::new();
        let projection = Projection::new()
            .upsert(state(json!({ "id": "x" })), state(json!({ "n": 1 })))
            .upsert(state(json!({ "id": "y" })), state(json!({ "n": 2 })));

        let first = store.commit(&projection, 5).await.unwrap();
        assert_eq!(first.affected(), 2);

        let second = store.commit(&projection, 5).await.unwrap();
        assert!(second.upserted.iter().all(|c| c.count == 0));
        assert_eq!(load_one(&store, "x").await.unwrap().watermark, 5);

        // Older watermarks are ignored as well.
        let older = Projection::new().upsert(state(json!({ "id": "x" })), state(json!({ "n": 9 })));
        assert_eq!(store.commit(&older, 3).await.unwrap().affected(), 0);
        assert_eq!(load_one(&store, "x").await.unwrap().state["n"], json!(1));
    }

    #[tokio::test]
    async fn upsert_merges_into_existing_state() {
        let store = InMemoryProjectorStore::new();
        store
            .commit(
                &Projection::new().upsert(state(json!({ "id": "x" })), state(json!({ "a": 1, "b": 1 }))),
                0,
            )
            .await
            .unwrap();
        store
            .commit(
                &Projection::new().upsert(state(json!({ "id": "x" })), state(json!({ "b": 2, "id": "z" }))),
                1,
            )
            .await
            .unwrap();

        let record = load_one(&store, "x").await.unwrap();
        assert_eq!(record.state, state(json!({ "id": "x", "a": 1, "b": 2 })));
        assert!(load_one(&store, "z").await.is_none());
    }

    #[tokio::test]
    async fn predicate_upsert_updates_every_matching_row() {
        let store = InMemoryProjectorStore::new();
        let seed = Projection::new()
            .upsert(state(json!({ "id": "a" })), state(json!({ "team": "red", "score": 0 })))
            .upsert(state(json!({ "id": "b" })), state(json!({ "team": "red", "score": 0 })))
            .upsert(state(json!({ "id": "c" })), state(json!({ "team": "blue", "score": 0 })));
        store.commit(&seed, 1).await.unwrap();

        let bump = Projection::new().upsert(state(json!({ "team": "red" })), state(json!({ "score": 5 })));
        let results = store.commit(&bump, 2).await.unwrap();
        assert_eq!(results.upserted[0].count, 2);

        let records = store
            .load(&["a".to_string(), "zz".to_string(), "c".to_string(), "b".to_string()])
            .await
            .unwrap();
        let ids: Vec<_> = records.iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(records[0].state["score"], json!(5));
        assert_eq!(records[1].state["score"], json!(0));
        assert_eq!(records[1].watermark, 1);
    }

    #[tokio::test]
    async fn seeded_row_is_skipped_when_other_where_keys_differ() {
        let store = InMemoryProjectorStore::new();
        let projection = Projection::new().upsert(
            state(json!({ "id": "x", "status": "open" })),
            state(json!({ "n": 1 })),
        );

        // The pre-seeded row has no status, so the predicate pass finds nothing.
        let results = store.commit(&projection, 0).await.unwrap();
        assert_eq!(results.upserted[0].count, 0);

        let record = load_one(&store, "x").await.unwrap();
        assert_eq!(record.watermark, -1);
        assert_eq!(record.state["n"], json!(1));
    }

    #[tokio::test]
    async fn deletes_are_watermark_gated() {
        let store = InMemoryProjectorStore::new();
        store
            .commit(
                &Projection::new()
                    .upsert(state(json!({ "id": "a" })), state(json!({ "kind": "tmp" })))
                    .upsert(state(json!({ "id": "b" })), state(json!({ "kind": "tmp" }))),
                4,
            )
            .await
            .unwrap();

        let delete = Projection::new().delete(state(json!({ "kind": "tmp" })));
        assert_eq!(store.commit(&delete, 4).await.unwrap().deleted[0].count, 0);
        assert_eq!(store.commit(&delete, 5).await.unwrap().deleted[0].count, 2);
        assert!(store.load(&["a".to_string()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_id_rejects_the_whole_commit() {
        let store = InMemoryProjectorStore::new();
        let projection = Projection::new()
            .upsert(state(json!({ "id": "ok" })), state(json!({ "n": 1 })))
            .upsert(state(json!({ "id": { "nested": true } })), state(json!({ "n": 2 })));

        let err = store.commit(&projection, 0).await.unwrap_err();
        assert!(matches!(err, ProjectorStoreError::InvalidRecord(_)));
        assert!(load_one(&store, "ok").await.is_none());
    }

    #[tokio::test]
    async fn query_counts_all_matches_but_delivers_up_to_limit() {
        let store = InMemoryProjectorStore::new();
        let mut projection = Projection::new();
        for i in 0..5 {
            projection = projection.upsert(
                state(json!({ "id": format!("r{i}") })),
                state(json!({ "total": i * 10 })),
            );
        }
        store.commit(&projection, 0).await.unwrap();

        let mut delivered = Vec::new();
        let count = store
            .query(
                &ProjectionQuery::new().filter("total", Condition::gte(20)).limit(2),
                &mut |r| delivered.push(r),
            )
            .await
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(delivered.len(), 2);

        let mut all = 0;
        let count = store
            .query(&ProjectionQuery::new(), &mut |_| all += 1)
            .await
            .unwrap();
        assert_eq!((count, all), (5, 5));
    }

    #[tokio::test]
    async fn dispose_clears_records() {
        let store = InMemoryProjectorStore::new();
        store.seed().await.unwrap();
        store
            .commit(&Projection::new().upsert(state(json!({ "id": "x" })), State::new()), 0)
            .await
            .unwrap();
        store.dispose().await.unwrap();
        assert!(load_one(&store, "x").await.is_none());
    }
}
