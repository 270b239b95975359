//! Shared test helpers for sync tests.

#![allow(dead_code)]

use carelink_store::memory::{MemoryLocalStore, MemoryRemoteStore};
use carelink_sync::{SyncConfig, SyncEngine};
use carelink_types::{Entity, EntityKind};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An engine wired to fresh in-memory stores.
pub struct Harness {
    pub local: Arc<MemoryLocalStore>,
    pub remote: Arc<MemoryRemoteStore>,
    pub engine: SyncEngine,
}

pub fn harness(config: SyncConfig) -> Harness {
    init_tracing();
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(MemoryRemoteStore::new());
    let engine = SyncEngine::new(local.clone(), remote.clone(), config);
    Harness {
        local,
        remote,
        engine,
    }
}

/// A second device sharing `remote`.
pub fn device(remote: &Arc<MemoryRemoteStore>, config: SyncConfig) -> Harness {
    let local = Arc::new(MemoryLocalStore::new());
    let engine = SyncEngine::new(local.clone(), remote.clone(), config);
    Harness {
        local,
        remote: remote.clone(),
        engine,
    }
}

pub fn task(entity_id: &str, clock: u64) -> Entity {
    Entity::new(EntityKind::Task, entity_id)
        .with_clock(clock)
        .with_payload(serde_json::json!({ "title": entity_id }))
}

pub fn outcome(entity_id: &str, clock: u64, values: Vec<Entity>) -> Entity {
    let mut e = Entity::new(EntityKind::Outcome, entity_id).with_clock(clock);
    e.children = values;
    e
}

pub fn value(entity_id: &str, clock: u64, reading: f64) -> Entity {
    Entity::new(EntityKind::OutcomeValue, entity_id)
        .with_clock(clock)
        .with_payload(serde_json::json!({ "value": reading }))
}
