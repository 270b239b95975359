use crate::{RecordFilter, StoreResult};
use async_trait::async_trait;
use carelink_types::{Entity, EntityUuid};

/// The cloud copy of the record graph.
///
/// Writes are always full records, so retrying an abandoned write is safe.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns every record matching the filter.
    async fn query(&self, filter: &RecordFilter) -> StoreResult<Vec<Entity>>;

    /// Creates a record. The store binds a remote id onto the returned copy.
    async fn create(&self, entity: Entity) -> StoreResult<Entity>;

    /// Replaces an existing record.
    async fn update(&self, entity: Entity) -> StoreResult<Entity>;

    /// Tombstones a record. Records are never physically removed.
    async fn delete(&self, entity: Entity) -> StoreResult<()>;

    /// Fetches the version with this identity, if present.
    async fn fetch_by_uuid(&self, uuid: &EntityUuid) -> StoreResult<Option<Entity>> {
        Ok(self
            .query(&RecordFilter::Uuid(*uuid))
            .await?
            .into_iter()
            .next())
    }
}
