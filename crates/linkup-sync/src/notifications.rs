//! Notification list and unread counter.
//!
//! The store is the single owner of [`NotificationListState`]. Readers take
//! snapshots or subscribe to changes; only the store's own operations write.
//!
//! The unread count is server truth whenever a fetch lands. Between fetches
//! it is decremented locally by `mark_as_read` (never below zero) and zeroed
//! by `mark_all_as_read`; a failed mutation forces a count resync that
//! overwrites whatever the optimistic patch left behind.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::alert::{Alert, AlertSink};
use crate::api::{ApiError, NotificationApi};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::metrics;
use crate::model::Notification;
use crate::optimistic::optimistic;
use crate::router::Invalidate;
use crate::throttle::{FetchOutcome, ThrottleWindow};

/// Throttle key of the unread-count lookup.
pub const UNREAD_COUNT_KEY: &str = "unread_count";

/// Metrics label of the notification list.
const NOTIFICATIONS_KEY: &str = "notifications";

const DEFAULT_UNREAD_INTERVAL_MS: u64 = 30_000;
const DEFAULT_PAGE_SIZE: u32 = 20;

/// Snapshot of the notification store.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationListState {
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub unread_count: u32,
    pub total: u32,
    /// Last page fetched, 0 before the first fetch.
    pub page: u32,
    /// Set by a server push; cleared when page 1 is fetched again.
    pub stale: bool,
    pub loading: bool,
    /// Message of the last failed read, cleared by the next successful one.
    pub last_error: Option<String>,
    unread_window: ThrottleWindow<&'static str>,
    /// Bumped by every invalidation.
    generation: u64,
}

impl NotificationListState {
    fn new(unread_interval_ms: u64) -> Self {
        Self {
            notifications: Vec::new(),
            unread_count: 0,
            total: 0,
            page: 0,
            stale: false,
            loading: false,
            last_error: None,
            unread_window: ThrottleWindow::new(unread_interval_ms),
            generation: 0,
        }
    }

    /// When the unread count was last fetched (epoch ms), 0 if never or forced.
    #[must_use]
    pub fn last_unread_fetch(&self) -> u64 {
        self.unread_window.last_fetch(&UNREAD_COUNT_KEY)
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        (self.notifications.len() as u64) < u64::from(self.total)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }
}

enum LocalRead {
    Flipped,
    AlreadyRead,
    NotLoaded,
}

pub struct NotificationStore {
    api: Arc<dyn NotificationApi>,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
    state: watch::Sender<NotificationListState>,
    page_size: u32,
}

impl NotificationStore {
    #[must_use]
    pub fn new(
        api: Arc<dyn NotificationApi>,
        clock: Arc<dyn Clock>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let (state, _) = watch::channel(NotificationListState::new(DEFAULT_UNREAD_INTERVAL_MS));
        Self {
            api,
            clock,
            alerts,
            state,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Apply the throttle interval and page size from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &SyncConfig) -> Self {
        self.page_size = config.notifications.page_size.max(1);
        let interval = config.throttle.unread_count_ms;
        self.state
            .send_modify(|s| s.unread_window = ThrottleWindow::new(interval));
        self
    }

    #[must_use]
    pub fn snapshot(&self) -> NotificationListState {
        self.state.borrow().clone()
    }

    /// Receive every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NotificationListState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn unread_count(&self) -> u32 {
        self.state.borrow().unread_count
    }

    /// Fetch the unread count, unless it was fetched less than the throttle
    /// interval ago.
    pub async fn fetch_unread_count(&self) -> FetchOutcome {
        let now = self.clock.now_ms();
        let proceed = self
            .state
            .send_if_modified(|s| s.unread_window.try_acquire(&UNREAD_COUNT_KEY, now));
        if !proceed {
            trace!("Unread count fetch throttled");
            metrics::record_throttled(UNREAD_COUNT_KEY);
            return FetchOutcome::Throttled;
        }

        match self.api.unread_count().await {
            Ok(count) => {
                let at = self.clock.now_ms();
                let mut current = true;
                self.state.send_modify(|s| {
                    s.unread_count = count;
                    current = s.unread_window.settle(&UNREAD_COUNT_KEY, now, at);
                    s.last_error = None;
                });
                debug!(unread = count, current, "Unread count synced");
                FetchOutcome::Fetched
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Unread count fetch failed");
                metrics::record_fetch_failure(UNREAD_COUNT_KEY, &e);
                self.state.send_modify(|s| s.last_error = Some(e.to_string()));
                FetchOutcome::Failed
            }
        }
    }

    /// Reset the unread-count window and fetch.
    pub async fn force_unread_resync(&self) -> FetchOutcome {
        self.state
            .send_modify(|s| s.unread_window.force(&UNREAD_COUNT_KEY));
        self.fetch_unread_count().await
    }

    /// Fetch one page of notifications. Page 1 replaces the list, later pages
    /// append. The unread count is taken from every response.
    pub async fn fetch_notifications(&self, page: u32, limit: u32) -> FetchOutcome {
        let page = page.max(1);
        let mut generation = 0;
        self.state.send_modify(|s| {
            s.loading = true;
            generation = s.generation;
        });

        match self.api.list(page, limit).await {
            Ok(response) => {
                let received = response.notifications.len();
                self.state.send_modify(|s| {
                    if page == 1 {
                        s.notifications = response.notifications;
                        // An invalidation that landed mid-flight still stands.
                        s.stale &= s.generation != generation;
                    } else {
                        s.notifications.extend(response.notifications);
                    }
                    s.total = response.total;
                    s.unread_count = response.unread_count;
                    s.page = page;
                    s.loading = false;
                    s.last_error = None;
                });
                debug!(page, received, unread = response.unread_count, "Notifications fetched");
                FetchOutcome::Fetched
            }
            Err(e) => {
                warn!(page, error = %e, transient = e.is_transient(), "Notification list fetch failed");
                metrics::record_fetch_failure(NOTIFICATIONS_KEY, &e);
                self.state.send_modify(|s| {
                    s.loading = false;
                    s.last_error = Some(e.to_string());
                });
                FetchOutcome::Failed
            }
        }
    }

    /// Fetch page 1 with the configured page size.
    pub async fn refresh(&self) -> FetchOutcome {
        self.fetch_notifications(1, self.page_size).await
    }

    /// Fetch the page after the last one loaded.
    pub async fn fetch_next_page(&self) -> FetchOutcome {
        let next = self.state.borrow().page + 1;
        self.fetch_notifications(next, self.page_size).await
    }

    /// Add a notification pushed by the server.
    ///
    /// Returns `false` if it was already in the list.
    pub fn receive(&self, notification: Notification) -> bool {
        self.state.send_if_modified(|s| {
            if s.notifications.iter().any(|n| n.id == notification.id) {
                return false;
            }
            if !notification.is_read {
                s.unread_count = s.unread_count.saturating_add(1);
            }
            s.total = s.total.saturating_add(1);
            s.notifications.insert(0, notification);
            true
        })
    }

    /// Mark one notification read.
    ///
    /// The local flag flips and the count drops before the request is sent.
    /// On failure the flag stays flipped and the count is resynced from the
    /// server.
    ///
    /// # Errors
    ///
    /// Returns the API error after the resync has run.
    pub async fn mark_as_read(&self, id: &str) -> Result<(), ApiError> {
        let mut local = LocalRead::NotLoaded;

        let result = optimistic(
            "mark_as_read",
            || {
                self.state.send_if_modified(|s| {
                    match s.notifications.iter_mut().find(|n| n.id == id) {
                        Some(n) if !n.is_read => {
                            n.is_read = true;
                            s.unread_count = s.unread_count.saturating_sub(1);
                            local = LocalRead::Flipped;
                            true
                        }
                        Some(_) => {
                            local = LocalRead::AlreadyRead;
                            false
                        }
                        None => false,
                    }
                });
            },
            self.api.mark_read(id),
            || async {
                self.force_unread_resync().await;
            },
        )
        .await;

        match result {
            Ok(()) => {
                if matches!(local, LocalRead::NotLoaded) {
                    // The count may include it; only the server knows.
                    self.force_unread_resync().await;
                }
                trace!(id, already_read = matches!(local, LocalRead::AlreadyRead), "Notification marked read");
                Ok(())
            }
            Err(e) => {
                self.alerts.show(Alert::error(
                    "Could not mark notification as read",
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    /// Mark every notification read.
    ///
    /// Always issues the request, even when nothing is unread locally.
    ///
    /// # Errors
    ///
    /// Returns the API error after the unread count has been resynced.
    pub async fn mark_all_as_read(&self) -> Result<(), ApiError> {
        let result = optimistic(
            "mark_all_as_read",
            || {
                self.state.send_if_modified(|s| {
                    let changed =
                        s.unread_count != 0 || s.notifications.iter().any(|n| !n.is_read);
                    for n in &mut s.notifications {
                        n.is_read = true;
                    }
                    s.unread_count = 0;
                    changed
                });
            },
            self.api.mark_all_read(),
            || async {
                self.force_unread_resync().await;
            },
        )
        .await;

        if let Err(e) = &result {
            self.alerts.show(Alert::error(
                "Could not mark notifications as read",
                e.to_string(),
            ));
        }
        result
    }
}

impl Invalidate for NotificationStore {
    fn invalidate(&self) {
        self.state.send_modify(|s| {
            s.stale = true;
            s.generation = s.generation.wrapping_add(1);
            s.unread_window.force(&UNREAD_COUNT_KEY);
        });
        debug!("Notification store invalidated");
    }
}
