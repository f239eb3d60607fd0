//! Notification store scenarios against a fake backend.

mod common;

use common::{poll_once, FakeNotificationApi, START};
use linkup_sync::{FetchOutcome, Invalidate, ManualClock, NotificationStore, RecordingAlerts};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    api: Arc<FakeNotificationApi>,
    clock: ManualClock,
    alerts: RecordingAlerts,
    store: NotificationStore,
}

fn harness(api: FakeNotificationApi) -> Harness {
    let api = Arc::new(api);
    let clock = ManualClock::new(START);
    let alerts = RecordingAlerts::new();
    let store = NotificationStore::new(
        api.clone(),
        Arc::new(clock.clone()),
        Arc::new(alerts.clone()),
    );
    Harness {
        api,
        clock,
        alerts,
        store,
    }
}

#[tokio::test]
async fn test_unread_count_never_negative() {
    let h = harness(FakeNotificationApi::with_unread(&["a", "b"]));
    h.store.refresh().await;

    for id in ["a", "b", "a", "missing", "b", "a"] {
        h.store.mark_as_read(id).await.unwrap();
        assert!(h.store.unread_count() <= 2);
    }
    assert_eq!(h.store.unread_count(), 0);

    h.api.fail_mutations.store(true, Ordering::SeqCst);
    for id in ["a", "b", "c"] {
        let _ = h.store.mark_as_read(id).await;
    }
    assert_eq!(h.store.unread_count(), 0);
}

#[tokio::test]
async fn test_mark_all_as_read_is_idempotent() {
    let h = harness(FakeNotificationApi::with_unread(&["a", "b", "c"]));
    h.store.refresh().await;

    h.store.mark_all_as_read().await.unwrap();
    let once = h.store.snapshot();
    h.store.mark_all_as_read().await.unwrap();
    let twice = h.store.snapshot();

    assert_eq!(once, twice);
    assert_eq!(twice.unread_count, 0);
    assert!(twice.notifications.iter().all(|n| n.is_read));
    // The second call still reaches the server.
    assert_eq!(h.api.mark_all_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unread_fetch_within_window_is_skipped() {
    let h = harness(FakeNotificationApi::with_unread(&["a"]));

    assert_eq!(h.store.fetch_unread_count().await, FetchOutcome::Fetched);
    let stamped = h.store.snapshot().last_unread_fetch();
    assert_eq!(stamped, START);

    h.clock.advance(Duration::from_millis(29_999));
    assert_eq!(h.store.fetch_unread_count().await, FetchOutcome::Throttled);
    assert_eq!(h.api.unread_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.snapshot().last_unread_fetch(), stamped);
}

#[tokio::test]
async fn test_forced_refresh_ignores_recency() {
    let h = harness(FakeNotificationApi::with_unread(&["a"]));
    h.store.fetch_unread_count().await;

    h.clock.advance(Duration::from_millis(10));
    h.api.unread.store(9, Ordering::SeqCst);
    assert_eq!(h.store.force_unread_resync().await, FetchOutcome::Fetched);
    assert_eq!(h.api.unread_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.store.unread_count(), 9);
    assert_eq!(h.store.snapshot().last_unread_fetch(), START + 10);
}

#[tokio::test]
async fn test_failed_reads_restore_server_count() {
    let h = harness(FakeNotificationApi::with_unread(&["a", "b", "c", "d", "e"]));
    h.store.refresh().await;
    h.store.fetch_unread_count().await;
    assert_eq!(h.store.unread_count(), 5);

    h.api.fail_mutations.store(true, Ordering::SeqCst);
    let (r1, r2) = tokio::join!(h.store.mark_as_read("a"), h.store.mark_as_read("b"));

    assert!(r1.is_err() && r2.is_err());
    assert_eq!(h.api.unread_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.store.unread_count(), 5);
    assert_eq!(h.alerts.alerts().len(), 2);
    // isRead is not rolled back.
    let state = h.store.snapshot();
    assert!(state.get("a").unwrap().is_read);
    assert!(state.get("b").unwrap().is_read);
}

#[tokio::test]
async fn test_optimistic_count_applies_before_network() {
    let h = harness(FakeNotificationApi::with_unread(&["a", "b", "c", "d", "e"]));
    h.store.refresh().await;

    // Poll each call once: the local patch runs synchronously, the fake
    // backend has not been reached yet.
    let first = h.store.mark_as_read("a");
    let second = h.store.mark_as_read("b");
    tokio::pin!(first, second);
    assert!(poll_once(first.as_mut()).await.is_none());
    assert!(poll_once(second.as_mut()).await.is_none());

    assert_eq!(h.store.unread_count(), 3);
    assert_eq!(h.api.mark_read_calls.load(Ordering::SeqCst), 0);

    first.await.unwrap();
    second.await.unwrap();
    assert_eq!(h.api.unread.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_next_page_past_end_keeps_list() {
    let h = harness(FakeNotificationApi::with_unread(&["a"]));
    h.store.refresh().await;
    assert!(!h.store.snapshot().has_more());
    assert_eq!(h.store.fetch_next_page().await, FetchOutcome::Fetched);
    assert_eq!(h.store.snapshot().notifications.len(), 1);
}

#[tokio::test]
async fn test_invalidation_during_unread_fetch_is_kept() {
    let h = harness(FakeNotificationApi::default());
    h.api.read_gate.hold();
    let fetch = h.store.fetch_unread_count();
    tokio::pin!(fetch);
    assert!(poll_once(fetch.as_mut()).await.is_none());
    assert_eq!(h.api.read_gate.entered(), 1);

    // A new notification is pushed while the old count is on the wire.
    h.api.unread.store(1, Ordering::SeqCst);
    h.store.invalidate();
    h.api.read_gate.release();
    assert_eq!(fetch.await, FetchOutcome::Fetched);
    assert_eq!(h.store.unread_count(), 0);
    assert_eq!(h.store.snapshot().last_unread_fetch(), 0);

    assert_eq!(h.store.fetch_unread_count().await, FetchOutcome::Fetched);
    assert_eq!(h.store.unread_count(), 1);
}

#[tokio::test]
async fn test_invalidation_during_refresh_keeps_stale() {
    let h = harness(FakeNotificationApi::with_unread(&["a"]));
    h.api.read_gate.hold();
    let refresh = h.store.refresh();
    tokio::pin!(refresh);
    assert!(poll_once(refresh.as_mut()).await.is_none());

    h.store.invalidate();
    h.api.read_gate.release();
    assert_eq!(refresh.await, FetchOutcome::Fetched);
    assert!(h.store.snapshot().stale);

    h.store.refresh().await;
    assert!(!h.store.snapshot().stale);
}
