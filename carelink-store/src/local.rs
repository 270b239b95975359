use crate::StoreResult;
use async_trait::async_trait;
use carelink_types::{Entity, EntityUuid, LogicalClock};

/// The on-device store.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Fetches the version with this identity, if present.
    async fn fetch_by_uuid(&self, uuid: &EntityUuid) -> StoreResult<Option<Entity>>;

    /// Fetches every record carrying a tag.
    async fn fetch_by_tag(&self, tag: &str) -> StoreResult<Vec<Entity>>;

    /// Writes a full record, inserting it if unknown. Returns the stored copy.
    async fn update(&self, entity: Entity) -> StoreResult<Entity>;

    /// Records changed locally with a clock above `clock`, oldest first.
    async fn pending_revisions_since(&self, clock: LogicalClock) -> StoreResult<Vec<Entity>>;
}
