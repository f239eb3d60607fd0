//! Request store scenarios against a fake backend.

mod common;

use common::{poll_once, FakeConnectionApi, START};
use linkup_sync::{
    ConnectionStatus, FetchOutcome, Invalidate, ManualClock, RecordingAlerts, RequestDirection,
    RequestStore, RespondAction,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn harness() -> (Arc<FakeConnectionApi>, ManualClock, RecordingAlerts, RequestStore) {
    let api = Arc::new(FakeConnectionApi::default());
    let clock = ManualClock::new(START);
    let alerts = RecordingAlerts::new();
    let store = RequestStore::new(
        api.clone(),
        Arc::new(clock.clone()),
        Arc::new(alerts.clone()),
    );
    (api, clock, alerts, store)
}

#[tokio::test]
async fn test_second_fetch_within_window_returns_cached_state() {
    let (api, clock, _, store) = harness();
    api.add_incoming("ada");

    assert_eq!(
        store.fetch_requests(RequestDirection::Incoming).await,
        FetchOutcome::Fetched
    );
    let before = store.snapshot();

    api.add_incoming("grace");
    clock.advance(Duration::from_millis(1_500));
    assert_eq!(
        store.fetch_requests(RequestDirection::Incoming).await,
        FetchOutcome::Throttled
    );

    assert_eq!(store.snapshot(), before);
    assert_eq!(api.list_calls(RequestDirection::Incoming), 1);
}

#[tokio::test]
async fn test_send_request_forces_stats_within_window() {
    let (api, clock, _, store) = harness();

    store.fetch_stats().await;
    assert_eq!(store.stats().pending_outgoing, 0);

    clock.advance(Duration::from_secs(5));
    store.send_request("user-x", Some("Hi!")).await.unwrap();

    assert_eq!(store.stats().pending_outgoing, 1);
    assert_eq!(api.stats_calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.snapshot().outgoing.len(), 1);
    assert_eq!(store.snapshot().last_stats_fetch(), START + 5_000);

    // Still inside the window for ordinary calls.
    clock.advance(Duration::from_secs(5));
    assert_eq!(store.fetch_stats().await, FetchOutcome::Throttled);
}

#[tokio::test]
async fn test_duplicate_send_surfaces_error_and_resyncs() {
    let (api, _, alerts, store) = harness();
    store.send_request("user-x", None).await.unwrap();
    let stats_calls = api.stats_calls.load(Ordering::SeqCst);

    let err = store.send_request("user-x", None).await.unwrap_err();
    assert!(err.to_string().contains("409"));
    assert_eq!(api.stats_calls.load(Ordering::SeqCst), stats_calls + 1);
    assert_eq!(alerts.alerts().len(), 1);
    assert_eq!(store.snapshot().outgoing.len(), 1);
}

#[tokio::test]
async fn test_accept_moves_counts() {
    let (api, _, _, store) = harness();
    let id = api.add_incoming("ada");
    store.fetch_requests(RequestDirection::Incoming).await;
    store.fetch_stats().await;
    assert_eq!(store.stats().pending_incoming, 1);

    store
        .respond_to_request(&id, RespondAction::Accept)
        .await
        .unwrap();

    let state = store.snapshot();
    assert!(state.incoming.is_empty());
    assert_eq!(state.stats.pending_incoming, 0);
    assert_eq!(state.stats.total_connections, 1);
    assert_eq!(api.list_calls(RequestDirection::Outgoing), 0);
}

#[tokio::test]
async fn test_failed_respond_keeps_prior_state() {
    let (api, _, alerts, store) = harness();
    api.add_incoming("ada");
    store.fetch_requests(RequestDirection::Incoming).await;
    let before = store.snapshot().incoming;

    api.fail_mutations.store(true, Ordering::SeqCst);
    let id = before[0].id.clone();
    assert!(store
        .respond_to_request(&id, RespondAction::Decline)
        .await
        .is_err());

    assert_eq!(store.snapshot().incoming, before);
    assert_eq!(api.list_calls(RequestDirection::Incoming), 1);
    assert_eq!(api.stats_calls.load(Ordering::SeqCst), 1);
    assert_eq!(alerts.alerts()[0].title, "Could not decline connection request");
}

#[tokio::test]
async fn test_remove_connection_resyncs_stats_only() {
    let (api, _, _, store) = harness();
    api.connections.store(3, Ordering::SeqCst);

    store.remove_connection("conn-1").await.unwrap();
    assert_eq!(store.stats().total_connections, 2);
    assert_eq!(api.list_calls(RequestDirection::Incoming), 0);
    assert_eq!(api.list_calls(RequestDirection::Outgoing), 0);
}

#[tokio::test]
async fn test_read_failure_sets_error_field() {
    let (api, clock, _, store) = harness();
    api.fail_reads.store(true, Ordering::SeqCst);

    assert_eq!(store.fetch_stats().await, FetchOutcome::Failed);
    assert!(store.snapshot().last_error.is_some());

    api.fail_reads.store(false, Ordering::SeqCst);
    clock.advance(Duration::from_secs(60));
    assert_eq!(store.fetch_stats().await, FetchOutcome::Fetched);
    assert!(store.snapshot().last_error.is_none());
}

#[tokio::test]
async fn test_check_connection_is_best_effort() {
    let (api, _, _, store) = harness();
    store.send_request("user-y", None).await.unwrap();
    assert!(matches!(
        store.check_connection("user-y").await,
        ConnectionStatus::PendingOutgoing { .. }
    ));

    api.fail_reads.store(true, Ordering::SeqCst);
    assert_eq!(
        store.check_connection("user-y").await,
        ConnectionStatus::NotConnected
    );
}

#[tokio::test]
async fn test_invalidation_during_stats_fetch_is_kept() {
    let (api, clock, _, store) = harness();
    api.stats_gate.hold();
    let fetch = store.fetch_stats();
    tokio::pin!(fetch);
    assert!(poll_once(fetch.as_mut()).await.is_none());

    api.add_incoming("ada");
    store.invalidate();
    api.stats_gate.release();
    assert_eq!(fetch.await, FetchOutcome::Fetched);
    assert_eq!(store.stats().pending_incoming, 0);
    assert_eq!(store.snapshot().last_stats_fetch(), 0);

    clock.advance(Duration::from_secs(1));
    assert_eq!(store.fetch_stats().await, FetchOutcome::Fetched);
    assert_eq!(store.stats().pending_incoming, 1);
}

#[tokio::test]
async fn test_invalidation_during_list_fetch_keeps_stale() {
    let (api, clock, _, store) = harness();
    api.list_gate.hold();
    let fetch = store.fetch_requests(RequestDirection::Incoming);
    tokio::pin!(fetch);
    assert!(poll_once(fetch.as_mut()).await.is_none());

    api.add_incoming("ada");
    store.invalidate();
    api.list_gate.release();
    assert_eq!(fetch.await, FetchOutcome::Fetched);
    let state = store.snapshot();
    assert!(state.incoming.is_empty());
    assert!(state.stale);
    assert_eq!(state.last_fetch(RequestDirection::Incoming), 0);

    clock.advance(Duration::from_millis(100));
    assert_eq!(
        store.fetch_requests(RequestDirection::Incoming).await,
        FetchOutcome::Fetched
    );
    assert_eq!(store.snapshot().incoming.len(), 1);
}

#[tokio::test]
async fn test_send_during_list_fetch_resyncs_after_it() {
    let (api, _, _, store) = harness();
    api.list_gate.hold();
    let fetch = store.fetch_requests(RequestDirection::Outgoing);
    tokio::pin!(fetch);
    assert!(poll_once(fetch.as_mut()).await.is_none());

    // The send lands while the older list read is still on the wire.
    let send = store.send_request("user-x", None);
    tokio::pin!(send);
    assert!(poll_once(send.as_mut()).await.is_none());
    assert_eq!(api.outgoing.lock().unwrap().len(), 1);

    api.list_gate.release();
    assert_eq!(fetch.await, FetchOutcome::Fetched);
    assert!(store.snapshot().outgoing.is_empty());

    send.await.unwrap();
    let state = store.snapshot();
    assert_eq!(state.outgoing.len(), 1);
    assert_eq!(state.outgoing[0].receiver.id, "user-x");
    assert_eq!(state.last_fetch(RequestDirection::Outgoing), START);
    assert_eq!(api.list_calls(RequestDirection::Outgoing), 2);
}
