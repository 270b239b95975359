//! Writes a local record to the remote store.
//!
//! A push is:
//! 1. validate the record's identity
//! 2. write the full record (create, or update the cloud copy in place)
//! 3. re-fetch the cloud copy by its stable key and bind the remote id and
//!    any repaired chain pointer onto the local record if they differ
//! 4. for container records, reconcile child values by identity
//! 5. write the reconciled cloud copy back only if it changed

use crate::error::{SyncError, SyncResult};
use crate::resolver::{ConflictReason, ConflictResolver, Decision};
use carelink_store::{LocalStore, RecordFilter, RemoteStore, StoreError};
use carelink_types::{Entity, EntityUuid};
use std::sync::Arc;
use tracing::{debug, info};

/// What a push wrote.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    /// The cloud copy after the push.
    pub record: Entity,
    /// Remote writes issued, child tombstones included.
    pub remote_writes: usize,
    /// Whether the local record's remote id was (re)bound.
    pub remote_id_bound: bool,
    /// Whether the push introduced or changed a chain pointer.
    pub chain_changed: bool,
    /// Number of local children matched with a cloud child.
    pub children_merged: usize,
}

/// Pushes local records to the remote store.
#[derive(Clone)]
pub struct RevisionPusher {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    resolver: ConflictResolver,
}

impl RevisionPusher {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        resolver: ConflictResolver,
    ) -> Self {
        Self {
            local,
            remote,
            resolver,
        }
    }

    /// Returns the record's identity, failing fast if it has none.
    pub fn validate(&self, entity: &Entity) -> SyncResult<EntityUuid> {
        entity.uuid.ok_or_else(|| {
            SyncError::RequiredValueMissing(format!(
                "uuid on {} {}",
                entity.kind, entity.entity_id
            ))
        })
    }

    /// Writes `entity` over `existing` (the cloud copy it was compared
    /// against, `None` if the remote has never seen it).
    pub async fn push(&self, entity: &Entity, existing: Option<Entity>) -> SyncResult<PushOutcome> {
        let uuid = self.validate(entity)?;
        let chain_changed = match existing {
            None => {
                let mut fresh = entity.clone();
                fresh.remote_id = None;
                fresh.children.clear();
                self.remote.create(fresh).await.map_err(SyncError::remote)?;
                info!("created {} {} in cloud", entity.kind, uuid);
                entity.has_links()
            }
            Some(mut cloud) => {
                // A pointer set by chain repair may not have reached this
                // device yet; never clear it.
                let mut outgoing = entity.clone();
                outgoing.merge_links(&cloud);
                let chain_changed = cloud.previous_version_uuid != outgoing.previous_version_uuid
                    || cloud.next_version_uuid != outgoing.next_version_uuid;
                cloud.copy_record_fields_from(&outgoing);
                self.remote.update(cloud).await.map_err(SyncError::remote)?;
                info!(
                    "updated {} {} in cloud at clock {}",
                    entity.kind, uuid, entity.logical_clock
                );
                chain_changed
            }
        };
        let mut remote_writes = 1;

        let cloud = self.refetch(entity, uuid).await?;
        let remote_id_bound = self.bind_local(entity, &cloud).await?;

        let mut record = cloud;
        let mut children_merged = 0;
        if entity.kind.is_container() || !entity.children.is_empty() {
            let mut merged = record.clone();
            children_merged = reconcile_children(&self.resolver, entity, &mut merged)?;
            if merged != record {
                record = self
                    .remote
                    .update(merged)
                    .await
                    .map_err(SyncError::remote)?;
                remote_writes += 1;
                debug!("reconciled {} children of {}", record.children.len(), uuid);
            }
        }

        Ok(PushOutcome {
            record,
            remote_writes,
            remote_id_bound,
            chain_changed,
            children_merged,
        })
    }

    /// Pushes a local tombstone, then tombstones each orphaned child that
    /// the remote still holds.
    pub async fn push_tombstone(
        &self,
        entity: &Entity,
        existing: Option<Entity>,
        orphans: &[EntityUuid],
    ) -> SyncResult<PushOutcome> {
        if entity.deleted_date.is_none() {
            return Err(SyncError::RequiredValueMissing(format!(
                "deletedDate on {} {}",
                entity.kind, entity.entity_id
            )));
        }
        let mut outcome = self.push(entity, existing).await?;

        for orphan in orphans {
            let child = self
                .remote
                .fetch_by_uuid(orphan)
                .await
                .map_err(SyncError::remote)?;
            match child {
                Some(child) if !child.is_deleted() => {
                    self.remote.delete(child).await.map_err(SyncError::remote)?;
                    outcome.remote_writes += 1;
                    debug!("tombstoned orphaned child {}", orphan);
                }
                Some(_) => {}
                None => debug!("orphaned child {} was never synced", orphan),
            }
        }

        Ok(outcome)
    }

    /// Looks the cloud copy up by `entity_id` rather than remote id, which
    /// may not be bound yet.
    async fn refetch(&self, entity: &Entity, uuid: EntityUuid) -> SyncResult<Entity> {
        self.remote
            .query(&RecordFilter::EntityId(entity.entity_id.clone()))
            .await
            .map_err(SyncError::remote)?
            .into_iter()
            .find(|candidate| candidate.uuid == Some(uuid))
            .ok_or_else(|| {
                SyncError::Remote(StoreError::NotFound(format!(
                    "{uuid} missing from cloud after write"
                )))
            })
    }

    /// Writes the cloud remote id and any chain pointer the local record
    /// lacks onto the local record, only if something changed. Returns
    /// whether the remote id was (re)bound.
    async fn bind_local(&self, entity: &Entity, cloud: &Entity) -> SyncResult<bool> {
        let uuid = self.validate(entity)?;
        let mut local = self
            .local
            .fetch_by_uuid(&uuid)
            .await
            .map_err(SyncError::local)?
            .unwrap_or_else(|| entity.clone());

        let remote_id_bound = local.remote_id != cloud.remote_id;
        let links_adopted = local.merge_links(cloud);
        if !remote_id_bound && !links_adopted {
            return Ok(false);
        }
        local.remote_id = cloud.remote_id.clone();
        self.local.update(local).await.map_err(SyncError::local)?;
        if remote_id_bound {
            debug!("bound remote id {:?} to {}", cloud.remote_id, uuid);
        }
        Ok(remote_id_bound)
    }
}

/// Merges `local`'s children into `cloud`'s by child uuid.
///
/// Each local child is matched with the cloud child of the same identity and
/// resolved on its own. Unmatched local children are carried over as they
/// are, and cloud-only children are kept. The result lists local children in
/// local order followed by cloud-only children in uuid order, so it does not
/// depend on how the cloud ordered its array. Parent and children are tagged
/// with the parent's uuid and `entity_id`.
///
/// Returns the number of matched children.
pub fn reconcile_children(
    resolver: &ConflictResolver,
    local: &Entity,
    cloud: &mut Entity,
) -> SyncResult<usize> {
    let parent_uuid = local.uuid.ok_or_else(|| {
        SyncError::RequiredValueMissing(format!("uuid on container {}", local.entity_id))
    })?;
    let uuid_tag = parent_uuid.to_string();
    let key_tag = local.entity_id.clone();

    cloud.add_tag(uuid_tag.clone());
    cloud.add_tag(key_tag.clone());

    let mut remaining = std::mem::take(&mut cloud.children);
    let mut merged = Vec::with_capacity(local.children.len() + remaining.len());
    let mut matched = 0;

    for local_child in &local.children {
        let child_uuid = local_child.uuid.ok_or_else(|| {
            SyncError::RequiredValueMissing(format!(
                "uuid on child {} of {}",
                local_child.entity_id, parent_uuid
            ))
        })?;
        let position = remaining
            .iter()
            .position(|c| c.uuid == Some(child_uuid));

        let child = match position {
            None => local_child.clone(),
            Some(i) => {
                matched += 1;
                let cloud_child = remaining.swap_remove(i);
                match resolver.compare_update(local_child, &cloud_child, false)? {
                    Decision::PushLocalToRemote => {
                        let mut updated = cloud_child;
                        updated.copy_record_fields_from(local_child);
                        updated
                    }
                    Decision::PullRemoteToLocal | Decision::NoOp => cloud_child,
                    Decision::Conflict(ConflictReason::CloudClockExceedsLocal {
                        local,
                        remote,
                    }) => {
                        return Err(SyncError::ClockRegression {
                            uuid: child_uuid,
                            local,
                            remote,
                        });
                    }
                }
            }
        };
        merged.push(child);
    }

    remaining.sort_by_key(|c| c.uuid);
    merged.extend(remaining);
    for child in &mut merged {
        child.add_tag(uuid_tag.clone());
        child.add_tag(key_tag.clone());
    }
    cloud.children = merged;

    Ok(matched)
}
