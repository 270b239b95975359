//! Sync engine: orchestrates push, pull and chain repair.
//!
//! Each public operation runs one [`SyncAttempt`] per record while holding
//! that record's key in a [`KeyedLock`], under the configured deadline. The
//! engine holds no reference to its callers and never retries on its own.

use crate::error::{SyncError, SyncResult};
use crate::lock::{KeyedGuard, KeyedLock};
use crate::puller::{Change, RevisionPuller};
use crate::pusher::RevisionPusher;
use crate::resolver::{ComparisonMode, ConflictReason, ConflictResolver, Decision};
use crate::state::{SyncAttempt, SyncPhase};
use crate::version_link::{RepairReport, VersionLink};
use carelink_store::{LocalStore, RemoteStore};
use carelink_types::{Entity, EntityKind, EntityUuid, KnowledgeVector, LogicalClock, ScopeId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What to do when a push arrives for a record that is already being pushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushContention {
    /// Wait for the in-flight push to finish.
    #[default]
    Queue,
    /// Fail with [`SyncError::PushInFlight`].
    Reject,
}

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Comparison mode, fixed for the engine's lifetime.
    pub mode: ComparisonMode,
    /// Scope whose clock the remote stamps writes with.
    pub remote_scope: ScopeId,
    /// Deadline for each public operation (ms).
    pub timeout_ms: u64,
    pub contention: PushContention,
    /// Kinds handled by `push_revision`, in push order.
    pub kinds: Vec<EntityKind>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: ComparisonMode::Clock,
            remote_scope: ScopeId::default(),
            timeout_ms: 30_000,
            contention: PushContention::Queue,
            kinds: EntityKind::SYNC_ORDER.to_vec(),
        }
    }
}

impl SyncConfig {
    /// Parses a configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Result of syncing one record.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub uuid: EntityUuid,
    pub decision: Decision,
    /// Phases entered, from `Idle` to `Done`.
    pub phases: Vec<SyncPhase>,
    pub remote_writes: usize,
    pub remote_id_bound: bool,
    /// Present when the push changed a chain pointer.
    pub repair: Option<RepairReport>,
}

/// Result of [`SyncEngine::push_revision`].
#[derive(Debug, Clone, Default)]
pub struct PushReport {
    pub outcomes: Vec<SyncOutcome>,
    /// Highest clock among the pushed records.
    pub pushed_through: LogicalClock,
}

/// Result of [`SyncEngine::pull_revisions`].
#[derive(Debug, Clone)]
pub struct PullReport {
    pub applied: usize,
    /// Knowledge to pass as the starting point of the next pull.
    pub knowledge: KnowledgeVector,
}

enum Operation<'a> {
    Update { overwrite_remote: bool },
    Delete { orphans: &'a [EntityUuid] },
}

/// The sync engine.
pub struct SyncEngine {
    config: SyncConfig,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    resolver: ConflictResolver,
    pusher: RevisionPusher,
    puller: RevisionPuller,
    links: VersionLink,
    locks: Arc<KeyedLock<EntityUuid>>,
}

impl SyncEngine {
    /// Creates an engine with its own per-record lock set.
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
    ) -> Self {
        Self::with_locks(local, remote, config, Arc::new(KeyedLock::new()))
    }

    /// Creates an engine sharing a lock set with other engines writing to
    /// the same remote store.
    pub fn with_locks(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
        locks: Arc<KeyedLock<EntityUuid>>,
    ) -> Self {
        let resolver = ConflictResolver::new(config.mode);
        Self {
            pusher: RevisionPusher::new(local.clone(), remote.clone(), resolver),
            puller: RevisionPuller::new(remote.clone(), config.remote_scope.clone()),
            links: VersionLink::new(remote.clone()),
            resolver,
            config,
            local,
            remote,
            locks,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn mode(&self) -> ComparisonMode {
        self.resolver.mode()
    }

    // ── Push side ────────────────────────────────────────────────

    /// Sends a new local record to the cloud. A record the cloud already
    /// holds is compared like an update, so retries are safe.
    pub async fn add_to_cloud(&self, entity: Entity) -> SyncResult<SyncOutcome> {
        self.run(&entity, Operation::Update {
            overwrite_remote: false,
        })
        .await
    }

    /// Sends a local update to the cloud.
    pub async fn update_cloud(
        &self,
        entity: Entity,
        overwrite_remote: bool,
    ) -> SyncResult<SyncOutcome> {
        self.run(&entity, Operation::Update { overwrite_remote }).await
    }

    /// Sends a local tombstone to the cloud and tombstones the given
    /// children of the deleted record.
    pub async fn delete_from_cloud(
        &self,
        entity: Entity,
        orphaned_children: &[EntityUuid],
    ) -> SyncResult<SyncOutcome> {
        if entity.deleted_date.is_none() {
            return Err(SyncError::RequiredValueMissing(format!(
                "deletedDate on {} {}",
                entity.kind, entity.entity_id
            )));
        }
        self.run(&entity, Operation::Delete {
            orphans: orphaned_children,
        })
        .await
    }

    /// Pushes every local record changed after `cloud_clock`, kind by kind in
    /// the configured order. Stops at the first failure.
    pub async fn push_revision(&self, cloud_clock: LogicalClock) -> SyncResult<PushReport> {
        let pending = self
            .local
            .pending_revisions_since(cloud_clock)
            .await
            .map_err(SyncError::local)?;
        let mut report = PushReport {
            outcomes: Vec::with_capacity(pending.len()),
            pushed_through: cloud_clock,
        };

        for kind in &self.config.kinds {
            for entity in pending.iter().filter(|e| e.kind == *kind) {
                let clock = entity.logical_clock;
                let outcome = if entity.is_deleted() {
                    self.delete_from_cloud(entity.clone(), &[]).await?
                } else {
                    self.update_cloud(entity.clone(), false).await?
                };
                report.outcomes.push(outcome);
                report.pushed_through = report.pushed_through.max(clock);
            }
        }

        let skipped = pending
            .iter()
            .filter(|e| !self.config.kinds.contains(&e.kind))
            .count();
        if skipped > 0 {
            debug!("push_revision skipped {} records of unsynced kinds", skipped);
        }
        info!(
            "pushed {} records through clock {}",
            report.outcomes.len(),
            report.pushed_through
        );
        Ok(report)
    }

    // ── Pull side ────────────────────────────────────────────────

    /// Pulls remote changes stamped after `since` and hands each one to
    /// `merge_revision`, strictly one at a time in remote order. Stops at the
    /// first merge failure.
    pub async fn pull_revisions<F, Fut>(
        &self,
        since: LogicalClock,
        cloud_knowledge: &KnowledgeVector,
        mut merge_revision: F,
    ) -> SyncResult<PullReport>
    where
        F: FnMut(Change) -> Fut,
        Fut: Future<Output = SyncResult<()>>,
    {
        let pull = async {
            let mut cursor = self.puller.pull(since, cloud_knowledge).await?;
            while let Some(pending) = cursor.next_change() {
                pending.apply(&mut merge_revision).await?;
            }
            let applied = cursor.applied();
            Ok::<_, SyncError>(PullReport {
                applied,
                knowledge: cursor.finish(),
            })
        };
        tokio::time::timeout(self.config.timeout(), pull)
            .await
            .unwrap_or(Err(SyncError::Timeout))
    }

    /// Pulls with [`SyncEngine::merge_revision`] as the merge callback.
    pub async fn pull_and_merge(
        &self,
        since: LogicalClock,
        cloud_knowledge: &KnowledgeVector,
    ) -> SyncResult<PullReport> {
        self.pull_revisions(since, cloud_knowledge, |change| self.merge_revision(change))
            .await
    }

    /// Applies one pulled change to the local store.
    ///
    /// A record the device has never seen is inserted. Otherwise the pull
    /// rules decide: a newer cloud copy replaces the local one (keeping the
    /// local remote id if the cloud copy lacks one), and a newer local copy
    /// is kept for the next push.
    pub async fn merge_revision(&self, change: Change) -> SyncResult<()> {
        let cloud = change.into_entity();
        let uuid = self.pusher.validate(&cloud)?;
        let _guard = self.acquire(uuid).await?;

        let local = self
            .local
            .fetch_by_uuid(&uuid)
            .await
            .map_err(SyncError::local)?;
        let Some(local) = local else {
            self.local.update(cloud).await.map_err(SyncError::local)?;
            debug!("inserted pulled record {}", uuid);
            return Ok(());
        };

        match self.resolver.compare_incoming(&local, &cloud)? {
            Decision::PullRemoteToLocal => self.apply_cloud_copy(cloud, &local).await,
            Decision::PushLocalToRemote | Decision::NoOp | Decision::Conflict(_) => {
                // Chain repair rewrites siblings without raising their clock.
                let mut kept = local;
                if kept.merge_links(&cloud) {
                    self.local.update(kept).await.map_err(SyncError::local)?;
                    debug!("adopted cloud chain pointers for {}", uuid);
                }
                Ok(())
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────

    /// Copies pointers set by a repair pass onto the local copies of the
    /// linked siblings, so a later push of a sibling carries them.
    async fn adopt_repaired_links(&self, repair: &RepairReport) -> SyncResult<()> {
        for uuid in &repair.linked {
            let Some(mut local) = self
                .local
                .fetch_by_uuid(uuid)
                .await
                .map_err(SyncError::local)?
            else {
                continue;
            };
            let cloud = self
                .remote
                .fetch_by_uuid(uuid)
                .await
                .map_err(SyncError::remote)?;
            if cloud.is_some_and(|cloud| local.merge_links(&cloud)) {
                self.local.update(local).await.map_err(SyncError::local)?;
                debug!("adopted repaired chain pointers for {}", uuid);
            }
        }
        Ok(())
    }

    async fn acquire(&self, uuid: EntityUuid) -> SyncResult<KeyedGuard<EntityUuid>> {
        match self.config.contention {
            PushContention::Queue => Ok(self.locks.lock(uuid).await),
            PushContention::Reject => self
                .locks
                .try_lock(uuid)
                .ok_or(SyncError::PushInFlight(uuid)),
        }
    }

    async fn run(&self, entity: &Entity, op: Operation<'_>) -> SyncResult<SyncOutcome> {
        let uuid = self.pusher.validate(entity)?;
        let mut attempt = SyncAttempt::new(uuid);

        let result = tokio::time::timeout(self.config.timeout(), async {
            let _guard = self.acquire(uuid).await?;
            self.drive(&mut attempt, entity, op).await
        })
        .await
        .unwrap_or(Err(SyncError::Timeout));

        if let Err(e) = &result {
            attempt.fail(e);
        }
        result
    }

    async fn drive(
        &self,
        attempt: &mut SyncAttempt,
        entity: &Entity,
        op: Operation<'_>,
    ) -> SyncResult<SyncOutcome> {
        let uuid = attempt.uuid();
        attempt.advance(SyncPhase::Comparing);

        let existing = self
            .remote
            .fetch_by_uuid(&uuid)
            .await
            .map_err(SyncError::remote)?;
        let decision = match (&existing, &op) {
            (None, _) => Decision::PushLocalToRemote,
            (Some(cloud), Operation::Update { overwrite_remote }) => {
                self.resolver.compare_update(entity, cloud, *overwrite_remote)?
            }
            (Some(cloud), Operation::Delete { .. }) => self.resolver.compare_delete(entity, cloud)?,
        };

        let mut outcome = SyncOutcome {
            uuid,
            decision,
            phases: Vec::new(),
            remote_writes: 0,
            remote_id_bound: false,
            repair: None,
        };

        match decision {
            Decision::PushLocalToRemote => {
                attempt.advance(SyncPhase::Pushing);
                let pushed = match op {
                    Operation::Update { .. } => self.pusher.push(entity, existing).await?,
                    Operation::Delete { orphans } => {
                        self.pusher.push_tombstone(entity, existing, orphans).await?
                    }
                };
                outcome.remote_writes = pushed.remote_writes;
                outcome.remote_id_bound = pushed.remote_id_bound;
                if pushed.chain_changed {
                    attempt.advance(SyncPhase::Repairing);
                    let repair = self.links.repair_chain(&pushed.record).await?;
                    self.adopt_repaired_links(&repair).await?;
                    outcome.remote_writes += repair.writes;
                    outcome.repair = Some(repair);
                }
            }
            Decision::PullRemoteToLocal => {
                attempt.advance(SyncPhase::Pulling);
                if let Some(cloud) = existing {
                    self.apply_cloud_copy(cloud, entity).await?;
                }
            }
            Decision::NoOp => debug!("{} already in sync", uuid),
            Decision::Conflict(ConflictReason::CloudClockExceedsLocal { local, remote }) => {
                warn!(
                    "cloud clock {} exceeds local clock {} for {}",
                    remote, local, uuid
                );
                return Err(SyncError::ClockRegression {
                    uuid,
                    local,
                    remote,
                });
            }
        }

        attempt.advance(SyncPhase::Done);
        outcome.phases = attempt.phases().to_vec();
        Ok(outcome)
    }

    async fn apply_cloud_copy(&self, mut cloud: Entity, local: &Entity) -> SyncResult<()> {
        if cloud.remote_id.is_none() {
            cloud.remote_id = local.remote_id.clone();
        }
        cloud.merge_links(local);
        let uuid = cloud.uuid;
        self.local.update(cloud).await.map_err(SyncError::local)?;
        debug!("applied cloud copy of {:?} locally", uuid);
        Ok(())
    }
}
