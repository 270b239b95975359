use carelink_types::{Entity, EntityUuid, LogicalClock};
use serde::{Deserialize, Serialize};

/// Selects records from a remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordFilter {
    /// The single version with this identity.
    Uuid(EntityUuid),
    /// Every version sharing a stable key.
    EntityId(String),
    /// Records carrying a tag.
    Tag(String),
    /// Records stamped with a clock strictly above the given one, in the
    /// order the store accepted them.
    ChangedSince(LogicalClock),
}

impl RecordFilter {
    /// Whether a record satisfies this filter.
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            RecordFilter::Uuid(uuid) => entity.uuid.as_ref() == Some(uuid),
            RecordFilter::EntityId(id) => entity.entity_id == *id,
            RecordFilter::Tag(tag) => entity.has_tag(tag),
            RecordFilter::ChangedSince(clock) => entity.logical_clock > *clock,
        }
    }
}
