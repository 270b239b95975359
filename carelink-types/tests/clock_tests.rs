use carelink_types::{KnowledgeVector, LogicalClock, ScopeId};
use proptest::prelude::*;

fn cloud() -> ScopeId {
    ScopeId::new("cloud")
}

fn device() -> ScopeId {
    ScopeId::new("device")
}

// ── LogicalClock ─────────────────────────────────────────────────

#[test]
fn clocks_order_by_value() {
    assert!(LogicalClock::new(3) > LogicalClock::new(2));
    assert_eq!(LogicalClock::new(2), LogicalClock::from(2));
    assert_eq!(LogicalClock::default(), LogicalClock::ZERO);
}

// ── KnowledgeVector ──────────────────────────────────────────────

#[test]
fn unknown_scope_reads_zero() {
    let kv = KnowledgeVector::new();
    assert!(kv.is_empty());
    assert_eq!(kv.get(&cloud()), LogicalClock::ZERO);
}

#[test]
fn update_never_lowers_a_clock() {
    let mut kv = KnowledgeVector::for_scope(cloud(), LogicalClock::new(5));
    kv.update(cloud(), LogicalClock::new(3));
    assert_eq!(kv.get(&cloud()), LogicalClock::new(5));
    kv.update(cloud(), LogicalClock::new(8));
    assert_eq!(kv.get(&cloud()), LogicalClock::new(8));
}

#[test]
fn merge_takes_pointwise_max() {
    let mut a = KnowledgeVector::for_scope(cloud(), LogicalClock::new(4));
    a.update(device(), LogicalClock::new(1));
    let mut b = KnowledgeVector::for_scope(cloud(), LogicalClock::new(2));
    b.update(device(), LogicalClock::new(9));

    let merged = a.merged(&b);
    assert_eq!(merged.get(&cloud()), LogicalClock::new(4));
    assert_eq!(merged.get(&device()), LogicalClock::new(9));
    assert_eq!(merged.scopes().count(), 2);
}

#[test]
fn dominates() {
    let a = KnowledgeVector::for_scope(cloud(), LogicalClock::new(4));
    let b = KnowledgeVector::for_scope(cloud(), LogicalClock::new(2));
    assert!(a.dominates(&b));
    assert!(!b.dominates(&a));
    assert!(a.dominates(&KnowledgeVector::new()));
    assert!(!a.dominates(&KnowledgeVector::for_scope(device(), LogicalClock::new(1))));
}

#[test]
fn json_roundtrip() {
    let mut kv = KnowledgeVector::for_scope(cloud(), LogicalClock::new(11));
    kv.update(device(), LogicalClock::new(2));
    let restored = KnowledgeVector::from_json(&kv.to_json().unwrap()).unwrap();
    assert_eq!(restored, kv);
}

proptest! {
    #[test]
    fn merge_is_commutative(a in 0u64..1000, b in 0u64..1000, c in 0u64..1000, d in 0u64..1000) {
        let mut x = KnowledgeVector::for_scope(cloud(), LogicalClock::new(a));
        x.update(device(), LogicalClock::new(b));
        let mut y = KnowledgeVector::for_scope(cloud(), LogicalClock::new(c));
        y.update(device(), LogicalClock::new(d));

        prop_assert_eq!(x.merged(&y), y.merged(&x));
        prop_assert!(x.merged(&y).dominates(&x));
        prop_assert!(x.merged(&y).dominates(&y));
    }
}
