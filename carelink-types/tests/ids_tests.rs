use carelink_types::{EntityUuid, RemoteId, ScopeId};
use std::collections::HashSet;

#[test]
fn entity_uuid_is_unique() {
    let ids: HashSet<EntityUuid> = (0..100).map(|_| EntityUuid::new()).collect();
    assert_eq!(ids.len(), 100);
}

#[test]
fn entity_uuid_roundtrips_through_string() {
    let id = EntityUuid::new();
    let parsed: EntityUuid = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn entity_uuid_rejects_garbage() {
    assert!(EntityUuid::parse("not-a-uuid").is_err());
    assert!("".parse::<EntityUuid>().is_err());
}

#[test]
fn entity_uuid_serializes_transparently() {
    let id = EntityUuid::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
}

#[test]
fn remote_id_display() {
    let id = RemoteId::new("rec-7");
    assert_eq!(id.as_str(), "rec-7");
    assert_eq!(id.to_string(), "rec-7");
}

#[test]
fn default_scope_is_cloud() {
    assert_eq!(ScopeId::default().as_str(), "cloud");
}
