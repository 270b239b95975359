mod common;

use carelink_store::memory::MemoryRemoteStore;
use carelink_sync::{Change, RevisionPuller, SyncError, SyncResult};
use carelink_types::{KnowledgeVector, LogicalClock, ScopeId};
use chrono::Utc;
use common::task;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn cloud() -> ScopeId {
    ScopeId::new("cloud")
}

async fn accept(_: Change) -> SyncResult<()> {
    Ok(())
}

async fn reject(_: Change) -> SyncResult<()> {
    Err(SyncError::RequiredValueMissing("uuid".into()))
}

fn setup() -> (Arc<MemoryRemoteStore>, RevisionPuller) {
    common::init_tracing();
    let remote = Arc::new(MemoryRemoteStore::new());
    let puller = RevisionPuller::new(remote.clone(), cloud());
    (remote, puller)
}

#[tokio::test]
async fn changes_arrive_in_clock_order() {
    let (remote, puller) = setup();
    remote.seed(task("c", 3));
    remote.seed(task("a", 1));
    remote.seed(task("b", 2).tombstoned(Utc::now()));

    let mut cursor = puller
        .pull(LogicalClock::ZERO, &KnowledgeVector::new())
        .await
        .unwrap();
    assert_eq!(cursor.remaining(), 3);

    let mut seen = Vec::new();
    while let Some(pending) = cursor.next_change() {
        pending
            .apply(|change| {
                seen.push(change);
                async { Ok::<_, SyncError>(()) }
            })
            .await
            .unwrap();
    }

    let ids: Vec<&str> = seen.iter().map(|c| c.entity().entity_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(matches!(seen[1], Change::Deleted(_)));
    assert!(matches!(seen[0], Change::Upserted(_)));
    assert_eq!(cursor.applied(), 3);
}

#[tokio::test]
async fn only_changes_after_since_are_pulled() {
    let (remote, puller) = setup();
    remote.seed(task("old", 2));
    remote.seed(task("new", 5));

    let cursor = puller
        .pull(LogicalClock::new(2), &KnowledgeVector::new())
        .await
        .unwrap();
    assert_eq!(cursor.remaining(), 1);
}

#[tokio::test]
async fn knowledge_tracks_applied_changes() {
    let (remote, puller) = setup();
    remote.seed(task("a", 1));
    remote.seed(task("b", 4));

    let mut cursor = puller
        .pull(LogicalClock::ZERO, &KnowledgeVector::new())
        .await
        .unwrap();
    assert_eq!(cursor.knowledge().get(&cloud()), LogicalClock::ZERO);

    let first = cursor.next_change().unwrap();
    first.apply(accept).await.unwrap();
    assert_eq!(cursor.knowledge().get(&cloud()), LogicalClock::new(1));

    let second = cursor.next_change().unwrap();
    second.apply(accept).await.unwrap();
    assert_eq!(cursor.knowledge().get(&cloud()), LogicalClock::new(4));
}

#[tokio::test]
async fn shared_clock_advances_after_last_change() {
    let (remote, puller) = setup();
    remote.seed(task("a", 3));
    remote.seed(task("b", 3));

    let mut cursor = puller
        .pull(LogicalClock::ZERO, &KnowledgeVector::new())
        .await
        .unwrap();
    cursor.next_change().unwrap().apply(accept).await.unwrap();
    assert_eq!(cursor.knowledge().get(&cloud()), LogicalClock::ZERO);

    cursor.next_change().unwrap().apply(accept).await.unwrap();
    assert_eq!(cursor.knowledge().get(&cloud()), LogicalClock::new(3));
}

#[tokio::test]
async fn failed_merge_does_not_advance_knowledge() {
    let (remote, puller) = setup();
    remote.seed(task("a", 1));
    remote.seed(task("b", 2));

    let mut remote_knowledge = KnowledgeVector::new();
    remote_knowledge.update(ScopeId::new("phone"), LogicalClock::new(9));

    let mut cursor = puller
        .pull(LogicalClock::ZERO, &remote_knowledge)
        .await
        .unwrap();
    cursor.next_change().unwrap().apply(accept).await.unwrap();

    let err = cursor
        .next_change()
        .unwrap()
        .apply(reject)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RequiredValueMissing(_)));

    assert_eq!(cursor.applied(), 1);
    let knowledge = cursor.finish();
    assert_eq!(knowledge.get(&cloud()), LogicalClock::new(1));
    assert_eq!(knowledge.get(&ScopeId::new("phone")), LogicalClock::ZERO);
}

#[tokio::test]
async fn finished_pull_adopts_remote_knowledge() {
    let (remote, puller) = setup();
    remote.seed(task("a", 2));

    let mut remote_knowledge = KnowledgeVector::new();
    remote_knowledge.update(ScopeId::new("phone"), LogicalClock::new(9));
    remote_knowledge.update(cloud(), LogicalClock::new(2));

    let mut cursor = puller
        .pull(LogicalClock::ZERO, &remote_knowledge)
        .await
        .unwrap();
    while let Some(pending) = cursor.next_change() {
        pending.apply(accept).await.unwrap();
    }
    let knowledge = cursor.finish();
    assert!(knowledge.dominates(&remote_knowledge));
    assert_eq!(knowledge.get(&ScopeId::new("phone")), LogicalClock::new(9));
}

#[tokio::test]
async fn offline_remote_fails_pull() {
    let (remote, puller) = setup();
    remote.set_available(false);
    let err = puller
        .pull(LogicalClock::ZERO, &KnowledgeVector::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RemoteUnavailable(_)));
}
