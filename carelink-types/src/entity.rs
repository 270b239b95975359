//! The versioned record exchanged between the local and remote stores.

use crate::{EntityUuid, LogicalClock, RemoteId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The record kinds the sync layer knows how to order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Patient,
    CarePlan,
    Contact,
    Task,
    Outcome,
    OutcomeValue,
    Note,
}

impl EntityKind {
    /// Push order for a revision: records before the records that refer to them.
    pub const SYNC_ORDER: [EntityKind; 6] = [
        EntityKind::Patient,
        EntityKind::CarePlan,
        EntityKind::Contact,
        EntityKind::Task,
        EntityKind::Outcome,
        EntityKind::Note,
    ];

    /// Whether records of this kind hold a child collection.
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, EntityKind::Outcome)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patient",
            EntityKind::CarePlan => "care_plan",
            EntityKind::Contact => "contact",
            EntityKind::Task => "task",
            EntityKind::Outcome => "outcome",
            EntityKind::OutcomeValue => "outcome_value",
            EntityKind::Note => "note",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pointer of the version chain to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Link {
    /// Toward older versions (`previous_version_uuid`).
    Backward,
    /// Toward newer versions (`next_version_uuid`).
    Forward,
}

impl Link {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Link::Backward => Link::Forward,
            Link::Forward => Link::Backward,
        }
    }
}

/// A versioned record.
///
/// Entities are never physically removed: deletion sets `deleted_date`.
/// Successive versions of one logical record share `entity_id` and are
/// linked through `previous_version_uuid` / `next_version_uuid`, resolved
/// through store lookups rather than in-memory references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identity of this version. `None` until the owning store assigns one.
    pub uuid: Option<EntityUuid>,
    /// Human-chosen stable key shared by every version.
    pub entity_id: String,
    pub kind: EntityKind,
    pub logical_clock: LogicalClock,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_date: Option<DateTime<Utc>>,
    /// Date this version takes effect; orders the version chain.
    #[serde(default)]
    pub effective_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub previous_version_uuid: Option<EntityUuid>,
    #[serde(default)]
    pub next_version_uuid: Option<EntityUuid>,
    #[serde(default)]
    pub remote_id: Option<RemoteId>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub group_identifier: Option<String>,
    /// Kind-specific fields, carried through untouched.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Child values of a container record, each with its own identity.
    #[serde(default)]
    pub children: Vec<Entity>,
}

impl Entity {
    /// Creates the first version of a record, stamped now at clock zero.
    pub fn new(kind: EntityKind, entity_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            uuid: Some(EntityUuid::new()),
            entity_id: entity_id.into(),
            kind,
            logical_clock: LogicalClock::ZERO,
            created_date: Some(now),
            updated_date: Some(now),
            effective_date: Some(now),
            deleted_date: None,
            previous_version_uuid: None,
            next_version_uuid: None,
            remote_id: None,
            tags: Vec::new(),
            notes: Vec::new(),
            group_identifier: None,
            payload: serde_json::Value::Null,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Into<LogicalClock>) -> Self {
        self.logical_clock = clock.into();
        self
    }

    #[must_use]
    pub fn with_updated_date(mut self, date: DateTime<Utc>) -> Self {
        self.updated_date = Some(date);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Entity) -> Self {
        self.children.push(child);
        self
    }

    /// Creates the successor version: a fresh identity sharing `entity_id`,
    /// pointing back at this version. Only the new version's pointer is set;
    /// the back-link on `self` is established by chain repair.
    #[must_use]
    pub fn next_version(&self) -> Self {
        let now = Utc::now();
        Self {
            uuid: Some(EntityUuid::new()),
            created_date: Some(now),
            updated_date: Some(now),
            effective_date: Some(now),
            deleted_date: None,
            previous_version_uuid: self.uuid,
            next_version_uuid: None,
            remote_id: None,
            ..self.clone()
        }
    }

    /// Returns the chain pointer in the given direction.
    #[must_use]
    pub fn link(&self, direction: Link) -> Option<EntityUuid> {
        match direction {
            Link::Backward => self.previous_version_uuid,
            Link::Forward => self.next_version_uuid,
        }
    }

    /// Sets the chain pointer in the given direction.
    pub fn set_link(&mut self, direction: Link, target: Option<EntityUuid>) {
        match direction {
            Link::Backward => self.previous_version_uuid = target,
            Link::Forward => self.next_version_uuid = target,
        }
    }

    /// Whether any chain pointer is set.
    #[must_use]
    pub fn has_links(&self) -> bool {
        self.previous_version_uuid.is_some() || self.next_version_uuid.is_some()
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_date.is_some()
    }

    /// Adds a tag if not already present. Returns true if the tag was added.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.tags.iter().any(|t| *t == tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Returns a tombstoned copy, keeping an existing deletion date.
    #[must_use]
    pub fn tombstoned(&self, at: DateTime<Utc>) -> Self {
        let mut copy = self.clone();
        copy.deleted_date.get_or_insert(at);
        copy
    }

    /// Copies every record field from `source` except the storage-owned
    /// ones: `remote_id` and the child collection stay as they are.
    pub fn copy_record_fields_from(&mut self, source: &Entity) {
        let remote_id = self.remote_id.take();
        let children = std::mem::take(&mut self.children);
        *self = Self {
            remote_id,
            children,
            ..source.clone()
        };
    }

    /// Fills each unset chain pointer from `other`. Pointers already set
    /// are kept. Returns true if any pointer changed.
    pub fn merge_links(&mut self, other: &Entity) -> bool {
        let mut changed = false;
        for direction in [Link::Backward, Link::Forward] {
            if self.link(direction).is_none() && other.link(direction).is_some() {
                self.set_link(direction, other.link(direction));
                changed = true;
            }
        }
        changed
    }

    /// Finds a child by identity.
    #[must_use]
    pub fn child(&self, uuid: &EntityUuid) -> Option<&Entity> {
        self.children.iter().find(|c| c.uuid.as_ref() == Some(uuid))
    }
}
