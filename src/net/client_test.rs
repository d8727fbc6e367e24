use std::sync::Arc;

use serde_json::json;
use tokio_tungstenite::accept_async;

use super::*;
use crate::state::SubmissionStatus;
use crate::store::MemoryStore;

fn sample_ctx() -> JoinContext {
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

/// Client pointed at a dead endpoint; connection attempts fail fast and
/// everything else is exercised offline.
fn offline_client() -> (SessionClient, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let client = SessionClient::new(
        SessionConfig::for_url("ws://127.0.0.1:9/classsession"),
        sample_ctx(),
        Arc::<MemoryStore>::clone(&store),
        Logger::new(),
    );
    (client, store)
}

// =============================================================
// Lifecycle
// =============================================================

#[tokio::test]
async fn connect_is_idempotent() {
    let (client, _store) = offline_client();
    client.connect();
    assert!(client.is_started());

    // Re-entrant connect observes the guard and no-ops.
    client.connect();
    assert!(client.is_started());

    client.disconnect();
    assert!(!client.is_started());
}

#[tokio::test]
async fn disconnect_without_a_connection_is_safe() {
    let (client, _store) = offline_client();
    client.disconnect();
    client.disconnect();
    assert!(!client.is_started());
    assert_eq!(
        client.with_state(|state| state.status),
        ConnectionStatus::Disconnected
    );
}

#[tokio::test]
async fn mount_refcount_closes_only_at_zero() {
    let (client, _store) = offline_client();
    client.acquire();
    client.acquire();
    assert_eq!(client.mounts(), 2);
    assert!(client.is_started());

    // A transient remount must not close the shared connection.
    client.release();
    assert_eq!(client.mounts(), 1);
    assert!(client.is_started());

    client.release();
    assert_eq!(client.mounts(), 0);
    assert!(!client.is_started());
}

#[tokio::test]
async fn release_saturates_at_zero() {
    let (client, _store) = offline_client();
    client.release();
    client.release();
    assert_eq!(client.mounts(), 0);

    client.acquire();
    assert_eq!(client.mounts(), 1);
    assert!(client.is_started());
}

#[tokio::test]
async fn clones_share_one_connection() {
    let (client, _store) = offline_client();
    let other = client.clone();

    client.acquire();
    assert_eq!(other.mounts(), 1);
    assert!(other.is_started());

    other.release();
    assert!(!client.is_started());
}

// =============================================================
// Handshake and keepalive
// =============================================================

#[tokio::test]
async fn refused_handshake_surfaces_failed_not_connected() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("ws");
        // Consume the client handshake record, then refuse the protocol.
        let _ = ws.next().await;
        ws.send(Message::Text(
            format!("{}\u{1e}", json!({"error": "unsupported protocol"})).into(),
        ))
        .await
        .expect("send rejection");
        // Hold the socket open so the failure is the handshake, not a drop.
        let _ = ws.next().await;
    });

    let client = SessionClient::new(
        SessionConfig::for_url(format!("ws://{addr}/classsession")),
        sample_ctx(),
        Arc::new(MemoryStore::new()),
        Logger::new(),
    );
    client.connect();

    let mut changes = client.subscribe();
    tokio::time::timeout(Duration::from_secs(2), async {
        while client.with_state(|state| state.status) != ConnectionStatus::Failed {
            if changes.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .expect("status must settle on Failed");
    assert_eq!(
        client.with_state(|state| state.status),
        ConnectionStatus::Failed
    );

    client.disconnect();
    server.abort();
}

#[tokio::test]
async fn idle_connection_sends_keepalives() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (ping_tx, ping_rx) = tokio::sync::oneshot::channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(stream).await.expect("ws");
        let _ = ws.next().await;
        ws.send(Message::Text("{}\u{1e}".into()))
            .await
            .expect("accept handshake");

        let mut ping_tx = Some(ping_tx);
        while let Some(Ok(message)) = ws.next().await {
            let Ok(text) = message.to_text() else {
                continue;
            };
            if protocol::decode(text).contains(&HubMessage::Ping) {
                if let Some(tx) = ping_tx.take() {
                    let _ = tx.send(());
                }
            }
        }
    });

    let mut config = SessionConfig::for_url(format!("ws://{addr}/classsession"));
    config.keepalive_interval = Duration::from_millis(50);
    let client = SessionClient::new(
        config,
        sample_ctx(),
        Arc::new(MemoryStore::new()),
        Logger::new(),
    );
    client.connect();

    tokio::time::timeout(Duration::from_secs(2), ping_rx)
        .await
        .expect("keepalive within the window")
        .expect("server must observe a ping record");

    client.disconnect();
    server.abort();
}

// =============================================================
// Removal and duplicate connections
// =============================================================

#[tokio::test]
async fn removal_ends_the_session_for_good() {
    let (client, _store) = offline_client();
    client.connect();

    assert!(client.apply_hub_invocation("RemovedFromClass", &[]));
    assert!(client.with_state(|state| state.removed_from_class));
    assert_eq!(
        client.with_state(|state| state.status),
        ConnectionStatus::Removed
    );
    assert!(!client.is_started());

    // Removal is terminal: reconnect attempts are refused.
    client.connect();
    assert!(!client.is_started());
}

#[tokio::test]
async fn force_reconnect_clears_the_duplicate_flag() {
    let (client, _store) = offline_client();
    client.connect();

    assert!(!client.apply_hub_invocation("DuplicateConnection", &[json!({})]));
    assert!(client.with_state(|state| state.duplicate_connection));

    client.force_reconnect();
    assert!(!client.with_state(|state| state.duplicate_connection));
    assert!(client.is_started());
}

// =============================================================
// Event dispatch
// =============================================================

#[tokio::test]
async fn identity_correction_is_persisted_to_the_store() {
    let (client, store) = offline_client();
    store.write(&sample_ctx());

    client.apply_hub_invocation(
        "SendJoinClass",
        &[json!({"participantId": "p-server", "classSessionId": "sess-2"})],
    );

    assert_eq!(client.context().participant_id, "p-server");
    let persisted = store.read().expect("persisted context");
    assert_eq!(persisted.participant_id, "p-server");
    assert_eq!(persisted.class_session_id.as_deref(), Some("sess-2"));
}

#[tokio::test]
async fn unknown_targets_are_dropped() {
    let (client, _store) = offline_client();
    assert!(!client.apply_hub_invocation("SomethingNew", &[json!({})]));
    assert_eq!(client.with_state(|state| state.events_count), 0);
}

#[tokio::test]
async fn dispatch_notifies_subscribers() {
    let (client, _store) = offline_client();
    let rx = client.subscribe();
    let before = *rx.borrow();

    client.apply_hub_invocation("GotPoints", &[json!(2)]);
    assert!(*rx.borrow() > before);
    assert_eq!(client.with_state(|state| state.stars), 2);
}

// =============================================================
// Submissions
// =============================================================

#[tokio::test]
async fn submit_without_an_activity_is_rejected() {
    let (client, _store) = offline_client();
    assert_eq!(client.submit_short("hello"), Err(SubmitError::NoActivity));
}

#[tokio::test]
async fn submit_keeps_optimistic_state_when_offline() {
    let (client, _store) = offline_client();
    client.apply_hub_invocation(
        "StartActivity",
        &[json!({"activityId": "a-1", "activityType": "Multiple Choice", "choices": ["A", "B"]})],
    );

    client.submit_choices(&["A".to_owned()]).expect("submit");
    client.with_state(|state| {
        let activity = state.activity.as_ref().expect("activity");
        assert_eq!(activity.submitted, vec!["A"]);
        assert_eq!(activity.status, Some(SubmissionStatus::Submitted));
    });
}

#[tokio::test]
async fn selection_edits_route_to_the_live_activity() {
    let (client, _store) = offline_client();
    client.apply_hub_invocation(
        "StartActivity",
        &[json!({"activityId": "a-1", "choices": ["A", "B"]})],
    );

    client.select_choice("B");
    assert_eq!(
        client.with_state(|state| state.activity.as_ref().map(|a| a.submitted.clone())),
        Some(vec!["B".to_owned()])
    );

    client.toggle_reveal();
    assert!(client.with_state(|state| state.activity.as_ref().is_some_and(|a| a.reveal)));
}

// =============================================================
// Leave
// =============================================================

#[tokio::test]
async fn leave_clears_the_stored_context() {
    let (client, store) = offline_client();
    store.write(&sample_ctx());
    client.connect();
    client.apply_hub_invocation("DuplicateConnection", &[]);

    client.leave().await;
    assert_eq!(store.read(), None);
    assert!(!client.with_state(|state| state.duplicate_connection));
    assert!(!client.is_started());
}
