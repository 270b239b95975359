//! In-process stores.
//!
//! Both stores keep records in a mutex-guarded map and count writes, so
//! callers can assert that an operation issued no writes at all. The remote
//! store can be switched offline to exercise transient failures.

use crate::{LocalStore, RecordFilter, RemoteStore, StoreError, StoreResult};
use async_trait::async_trait;
use carelink_types::{Entity, EntityUuid, LogicalClock, RemoteId};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn require_uuid(entity: &Entity) -> StoreResult<EntityUuid> {
    entity.uuid.ok_or_else(|| {
        StoreError::InvalidData(format!("record {} has no uuid", entity.entity_id))
    })
}

// ── Remote ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RemoteRecords {
    /// uuid -> (acceptance sequence, record)
    records: HashMap<EntityUuid, (u64, Entity)>,
    next_seq: u64,
    next_remote_id: u64,
}

/// A remote store held in memory.
#[derive(Debug)]
pub struct MemoryRemoteStore {
    inner: Mutex<RemoteRecords>,
    writes: AtomicUsize,
    available: AtomicBool,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RemoteRecords::default()),
            writes: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Inserts a record without counting it as a write. Binds a remote id
    /// if the record has none.
    pub fn seed(&self, mut entity: Entity) -> Entity {
        let mut inner = lock(&self.inner);
        if entity.remote_id.is_none() {
            inner.next_remote_id += 1;
            entity.remote_id = Some(RemoteId::new(format!("rec-{}", inner.next_remote_id)));
        }
        if let Some(uuid) = entity.uuid {
            inner.next_seq += 1;
            let seq = inner.next_seq;
            inner.records.insert(uuid, (seq, entity.clone()));
        }
        entity
    }

    /// Returns the stored copy of a record, bypassing availability.
    pub fn snapshot(&self, uuid: &EntityUuid) -> Option<Entity> {
        lock(&self.inner).records.get(uuid).map(|(_, e)| e.clone())
    }

    /// Number of records held, tombstones included.
    pub fn len(&self) -> usize {
        lock(&self.inner).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of create/update/delete calls that changed the store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Takes the store offline (`false`) or back online (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("remote store offline".into()))
        }
    }

    fn accept(&self, inner: &mut RemoteRecords, uuid: EntityUuid, entity: Entity) {
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.records.insert(uuid, (seq, entity));
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn query(&self, filter: &RecordFilter) -> StoreResult<Vec<Entity>> {
        self.check_available()?;
        let inner = lock(&self.inner);
        let mut matched: Vec<(LogicalClock, u64, Entity)> = inner
            .records
            .values()
            .filter(|(_, e)| filter.matches(e))
            .map(|(seq, e)| (e.logical_clock, *seq, e.clone()))
            .collect();
        if matches!(filter, RecordFilter::ChangedSince(_)) {
            matched.sort_by_key(|(clock, seq, _)| (*clock, *seq));
        } else {
            matched.sort_by_key(|(_, seq, _)| *seq);
        }
        Ok(matched.into_iter().map(|(_, _, e)| e).collect())
    }

    async fn create(&self, mut entity: Entity) -> StoreResult<Entity> {
        self.check_available()?;
        let uuid = require_uuid(&entity)?;
        let mut inner = lock(&self.inner);
        if inner.records.contains_key(&uuid) {
            return Err(StoreError::Conflict(format!("record {uuid} already exists")));
        }
        inner.next_remote_id += 1;
        entity.remote_id = Some(RemoteId::new(format!("rec-{}", inner.next_remote_id)));
        debug!("remote create {} ({})", uuid, entity.kind);
        self.accept(&mut inner, uuid, entity.clone());
        Ok(entity)
    }

    async fn update(&self, mut entity: Entity) -> StoreResult<Entity> {
        self.check_available()?;
        let uuid = require_uuid(&entity)?;
        let mut inner = lock(&self.inner);
        let existing = match inner.records.get(&uuid) {
            Some((_, e)) => e,
            None => return Err(StoreError::NotFound(uuid.to_string())),
        };
        if entity.logical_clock < existing.logical_clock {
            return Err(StoreError::Conflict(format!(
                "record {uuid} is at clock {}, refusing {}",
                existing.logical_clock, entity.logical_clock
            )));
        }
        if entity.remote_id.is_none() {
            entity.remote_id = existing.remote_id.clone();
        }
        debug!("remote update {} at clock {}", uuid, entity.logical_clock);
        self.accept(&mut inner, uuid, entity.clone());
        Ok(entity)
    }

    async fn delete(&self, entity: Entity) -> StoreResult<()> {
        self.check_available()?;
        let uuid = require_uuid(&entity)?;
        let mut inner = lock(&self.inner);
        let tombstone = match inner.records.get(&uuid) {
            Some((_, existing)) => existing.tombstoned(Utc::now()),
            None => return Err(StoreError::NotFound(uuid.to_string())),
        };
        debug!("remote tombstone {}", uuid);
        self.accept(&mut inner, uuid, tombstone);
        Ok(())
    }
}

// ── Local ────────────────────────────────────────────────────────

/// An on-device store held in memory.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    records: Mutex<HashMap<EntityUuid, Entity>>,
    updates: AtomicUsize,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record without counting it as an update.
    pub fn seed(&self, entity: Entity) {
        if let Some(uuid) = entity.uuid {
            lock(&self.records).insert(uuid, entity);
        }
    }

    /// Returns the stored copy of a record.
    pub fn snapshot(&self, uuid: &EntityUuid) -> Option<Entity> {
        lock(&self.records).get(uuid).cloned()
    }

    /// Number of `update` calls.
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn fetch_by_uuid(&self, uuid: &EntityUuid) -> StoreResult<Option<Entity>> {
        Ok(lock(&self.records).get(uuid).cloned())
    }

    async fn fetch_by_tag(&self, tag: &str) -> StoreResult<Vec<Entity>> {
        let mut found: Vec<Entity> = lock(&self.records)
            .values()
            .filter(|e| e.has_tag(tag))
            .cloned()
            .collect();
        found.sort_by_key(|e| e.uuid);
        Ok(found)
    }

    async fn update(&self, entity: Entity) -> StoreResult<Entity> {
        let uuid = require_uuid(&entity)?;
        lock(&self.records).insert(uuid, entity.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(entity)
    }

    async fn pending_revisions_since(&self, clock: LogicalClock) -> StoreResult<Vec<Entity>> {
        let mut pending: Vec<Entity> = lock(&self.records)
            .values()
            .filter(|e| e.logical_clock > clock)
            .cloned()
            .collect();
        pending.sort_by_key(|e| (e.logical_clock, e.uuid));
        Ok(pending)
    }
}
