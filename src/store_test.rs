use super::*;

fn sample_context() -> JoinContext {
    JoinContext {
        cpcs_region: "us".to_owned(),
        presenter_email: "teacher@example.com".to_owned(),
        class_code: "ABC123".to_owned(),
        participant_id: "p-1".to_owned(),
        participant_username: "pat".to_owned(),
        participant_name: "Pat".to_owned(),
        class_session_id: Some("sess-1".to_owned()),
    }
}

// =============================================================
// Round trips
// =============================================================

#[test]
fn write_then_read_round_trips() {
    let store = MemoryStore::new();
    store.write(&sample_context());
    assert_eq!(store.read(), Some(sample_context()));
}

#[test]
fn read_without_write_is_none() {
    let store = MemoryStore::new();
    assert_eq!(store.read(), None);
}

#[test]
fn clear_removes_the_blob() {
    let store = MemoryStore::new();
    store.write(&sample_context());
    store.clear();
    assert_eq!(store.read(), None);
}

#[test]
fn corrupt_blob_reads_as_none() {
    let store = MemoryStore::new();
    store
        .slots
        .lock()
        .expect("lock")
        .insert(CONTEXT_KEY.to_owned(), "{not json".to_owned());
    assert_eq!(store.read(), None);
}

// =============================================================
// Wire shape
// =============================================================

#[test]
fn context_serializes_camel_case() {
    let encoded = serde_json::to_value(sample_context()).expect("serialize");
    assert_eq!(encoded["cpcsRegion"], "us");
    assert_eq!(encoded["classSessionId"], "sess-1");
    assert_eq!(encoded["participantUsername"], "pat");
}

#[test]
fn missing_session_id_is_omitted() {
    let mut ctx = sample_context();
    ctx.class_session_id = None;
    let encoded = serde_json::to_value(ctx).expect("serialize");
    assert!(encoded.get("classSessionId").is_none());
}
