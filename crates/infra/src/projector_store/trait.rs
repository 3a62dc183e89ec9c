use std::sync::Arc;

use thiserror::Error;

use folio_events::{Projection, ProjectionQuery, ProjectionRecord, ProjectionResults};

#[derive(Debug, Error)]
pub enum ProjectorStoreError {
    /// A projection addressed a record with an unusable id.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Keyed table of projection states, each guarded by its own watermark.
///
/// ## Commit Semantics
///
/// `commit(projection, watermark)` only touches records whose watermark is
/// strictly lower than `watermark`; touched records move to `watermark`.
/// Redelivering a commit is therefore a no-op for every record it already
/// reached, while records it never reached (e.g. after a crash mid-batch)
/// are still applied.
///
/// Upserts whose `where` names an `id` with no record first seed one at
/// watermark `-1`, then select by predicate like any other upsert.
#[async_trait::async_trait]
pub trait ProjectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Initialise backing storage (idempotent).
    async fn seed(&self) -> Result<(), ProjectorStoreError>;

    /// Clear backing storage.
    async fn dispose(&self) -> Result<(), ProjectorStoreError>;

    /// Records for `ids`, in input order, skipping unknown ids.
    async fn load(&self, ids: &[String]) -> Result<Vec<ProjectionRecord>, ProjectorStoreError>;

    async fn commit(
        &self,
        projection: &Projection,
        watermark: i64,
    ) -> Result<ProjectionResults, ProjectorStoreError>;

    /// Deliver records matching every condition of `query` to `callback`,
    /// at most `limit` of them. Returns the total number of matches.
    async fn query(
        &self,
        query: &ProjectionQuery,
        callback: &mut (dyn FnMut(ProjectionRecord) + Send),
    ) -> Result<usize, ProjectorStoreError>;
}

#[async_trait::async_trait]
impl<S> ProjectorStore for Arc<S>
where
    S: ProjectorStore + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn seed(&self) -> Result<(), ProjectorStoreError> {
        (**self).seed().await
    }

    async fn dispose(&self) -> Result<(), ProjectorStoreError> {
        (**self).dispose().await
    }

    async fn load(&self, ids: &[String]) -> Result<Vec<ProjectionRecord>, ProjectorStoreError> {
        (**self).load(ids).await
    }

    async fn commit(
        &self,
        projection: &Projection,
        watermark: i64,
    ) -> Result<ProjectionResults, ProjectorStoreError> {
        (**self).commit(projection, watermark).await
    }

    async fn query(
        &self,
        query: &ProjectionQuery,
        callback: &mut (dyn FnMut(ProjectionRecord) + Send),
    ) -> Result<usize, ProjectorStoreError> {
        (**self).query(query, callback).await
    }
}
