//! Version chain repair.
//!
//! Concurrent writers can create a version before they know about the
//! sibling that should point back at it. After a version is written, repair
//! walks the chain through remote lookups (the uuid is the index, the remote
//! store is the arena) and fills in any back-pointer that is still unset.
//!
//! A node is only rewritten while its pointer is unset, so the walk stops at
//! the first node that already points somewhere. This bounds the walk even
//! on a cyclic chain, and it runs as a loop rather than recursion because
//! chains can be arbitrarily long.

use crate::error::{SyncError, SyncResult};
use carelink_store::RemoteStore;
use carelink_types::{Entity, EntityUuid, Link};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// What one repair pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Number of sibling records rewritten.
    pub writes: usize,
    /// Siblings whose back-pointer was set, in walk order.
    pub linked: Vec<EntityUuid>,
    /// Siblings referenced by the chain that the remote does not hold yet.
    pub gaps: Vec<EntityUuid>,
}

impl RepairReport {
    fn absorb(&mut self, other: RepairReport) {
        self.writes += other.writes;
        self.linked.extend(other.linked);
        self.gaps.extend(other.gaps);
    }
}

/// Repairs chain pointers on the remote side.
#[derive(Clone)]
pub struct VersionLink {
    remote: Arc<dyn RemoteStore>,
}

impl VersionLink {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }

    /// Walks the chain from `entity` in `direction`, pointing each unlinked
    /// sibling back at its predecessor in the walk.
    ///
    /// A sibling that is missing remotely ends the walk without error; it is
    /// recorded in [`RepairReport::gaps`] and picked up by a later pass.
    pub async fn repair(&self, entity: &Entity, direction: Link) -> SyncResult<RepairReport> {
        let mut report = RepairReport::default();
        let mut visited = HashSet::new();
        let back = direction.opposite();
        let mut current = entity.clone();

        loop {
            let current_uuid = current.uuid.ok_or_else(|| {
                SyncError::RequiredValueMissing(format!(
                    "uuid on chain member {}",
                    current.entity_id
                ))
            })?;
            if !visited.insert(current_uuid) {
                break;
            }
            let Some(target) = current.link(direction) else {
                break;
            };

            let sibling = self
                .remote
                .fetch_by_uuid(&target)
                .await
                .map_err(SyncError::remote)?;
            let Some(mut sibling) = sibling else {
                let gap = SyncError::ChainInconsistent {
                    uuid: current_uuid,
                    missing: target,
                };
                debug!("{gap}; deferring to a later pass");
                report.gaps.push(target);
                break;
            };

            if let Some(existing) = sibling.link(back) {
                if existing != current_uuid {
                    debug!(
                        "chain member {} already links {:?} to {}, leaving it",
                        target, back, existing
                    );
                }
                break;
            }

            sibling.set_link(back, Some(current_uuid));
            let stored = self
                .remote
                .update(sibling)
                .await
                .map_err(SyncError::remote)?;
            report.writes += 1;
            report.linked.push(target);
            debug!("linked {} {:?} to {}", target, back, current_uuid);
            current = stored;
        }

        Ok(report)
    }

    /// Repairs both directions from a freshly written version.
    pub async fn repair_chain(&self, entity: &Entity) -> SyncResult<RepairReport> {
        let mut report = self.repair(entity, Link::Backward).await?;
        report.absorb(self.repair(entity, Link::Forward).await?);
        Ok(report)
    }
}
