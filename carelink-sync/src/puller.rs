//! Pulls remote changes newer than a caller's last sync point.
//!
//! [`RevisionPuller::pull`] returns a [`RevisionCursor`] over the changes in
//! the order the remote accepted them. Nothing is merged until the caller
//! applies a change, and the cursor hands out one [`PendingChange`] at a
//! time: it mutably borrows the cursor, so a second change cannot be taken
//! until the first one's merge has resolved. Two merges can therefore never
//! run concurrently against the same cursor.

use crate::error::{SyncError, SyncResult};
use carelink_store::{RecordFilter, RemoteStore};
use carelink_types::{Entity, KnowledgeVector, LogicalClock, ScopeId};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// One remote change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// The record was created or updated.
    Upserted(Entity),
    /// The record was tombstoned.
    Deleted(Entity),
}

impl Change {
    fn from_record(entity: Entity) -> Self {
        if entity.is_deleted() {
            Change::Deleted(entity)
        } else {
            Change::Upserted(entity)
        }
    }

    pub fn entity(&self) -> &Entity {
        match self {
            Change::Upserted(e) | Change::Deleted(e) => e,
        }
    }

    pub fn into_entity(self) -> Entity {
        match self {
            Change::Upserted(e) | Change::Deleted(e) => e,
        }
    }

    pub fn clock(&self) -> LogicalClock {
        self.entity().logical_clock
    }
}

/// Fetches revision sets from one remote scope.
#[derive(Clone)]
pub struct RevisionPuller {
    remote: Arc<dyn RemoteStore>,
    scope: ScopeId,
}

impl RevisionPuller {
    pub fn new(remote: Arc<dyn RemoteStore>, scope: ScopeId) -> Self {
        Self { remote, scope }
    }

    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    /// Collects every remote change stamped after `since`.
    ///
    /// `remote_knowledge` is what the remote reported knowing when the pull
    /// started; the cursor adopts it once every change has been applied.
    pub async fn pull(
        &self,
        since: LogicalClock,
        remote_knowledge: &KnowledgeVector,
    ) -> SyncResult<RevisionCursor> {
        let changes: VecDeque<Change> = self
            .remote
            .query(&RecordFilter::ChangedSince(since))
            .await
            .map_err(SyncError::remote)?
            .into_iter()
            .map(Change::from_record)
            .collect();
        info!(
            "pulled {} changes from {} since clock {}",
            changes.len(),
            self.scope,
            since
        );

        Ok(RevisionCursor {
            scope: self.scope.clone(),
            total: changes.len(),
            pending: changes,
            knowledge: KnowledgeVector::for_scope(self.scope.clone(), since),
            remote_knowledge: remote_knowledge.clone(),
            applied: 0,
        })
    }
}

/// A finite, ordered sequence of remote changes awaiting merge.
#[derive(Debug)]
pub struct RevisionCursor {
    scope: ScopeId,
    total: usize,
    pending: VecDeque<Change>,
    knowledge: KnowledgeVector,
    remote_knowledge: KnowledgeVector,
    applied: usize,
}

impl RevisionCursor {
    /// Takes the next change. The cursor stays borrowed until the change is
    /// applied or dropped.
    pub fn next_change(&mut self) -> Option<PendingChange<'_>> {
        let change = self.pending.pop_front()?;
        Some(PendingChange {
            change,
            cursor: self,
        })
    }

    /// Changes not yet taken.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Changes merged successfully.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Knowledge covering exactly the changes merged so far.
    pub fn knowledge(&self) -> &KnowledgeVector {
        &self.knowledge
    }

    /// Ends the pull. If every change was merged, the result also covers the
    /// remote's reported knowledge.
    pub fn finish(self) -> KnowledgeVector {
        if self.applied == self.total {
            self.knowledge.merged(&self.remote_knowledge)
        } else {
            self.knowledge
        }
    }
}

/// A change taken from a [`RevisionCursor`], not yet merged.
#[derive(Debug)]
pub struct PendingChange<'a> {
    change: Change,
    cursor: &'a mut RevisionCursor,
}

impl PendingChange<'_> {
    pub fn change(&self) -> &Change {
        &self.change
    }

    /// Runs `merge` on the change. On success the cursor's knowledge advances
    /// to the change's clock once no pending change shares that clock. On
    /// failure it does not, so a later pull from the cursor's knowledge
    /// fetches the change again.
    pub async fn apply<F, Fut>(self, merge: F) -> SyncResult<()>
    where
        F: FnOnce(Change) -> Fut,
        Fut: Future<Output = SyncResult<()>>,
    {
        let clock = self.change.clock();
        merge(self.change).await?;
        let cursor = self.cursor;
        cursor.applied += 1;
        if cursor.pending.front().is_none_or(|next| next.clock() > clock) {
            cursor.knowledge.update(cursor.scope.clone(), clock);
        }
        debug!("merged change at clock {}", clock);
        Ok(())
    }
}
