//! Connection requests and their aggregate counters.
//!
//! Lists are kept per direction and throttled per direction; the stats
//! snapshot has its own, longer window. Mutations never patch the lists
//! locally: they call the backend and then force a resync, so the lists
//! only ever show server-confirmed requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{debug, trace, warn};

use crate::alert::{Alert, AlertSink};
use crate::api::{ApiError, ConnectionApi};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::metrics;
use crate::model::{
    ConnectionRequest, ConnectionStatus, RequestDirection, RequestStats, RespondAction,
};
use crate::optimistic::optimistic;
use crate::router::Invalidate;
use crate::throttle::{FetchOutcome, ThrottleWindow};

/// Throttle key of the stats lookup.
pub const STATS_KEY: &str = "request_stats";

const DEFAULT_REQUESTS_INTERVAL_MS: u64 = 2_000;
const DEFAULT_STATS_INTERVAL_MS: u64 = 60_000;

/// Snapshot of the request store.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestListState {
    /// Pending requests addressed to the member.
    pub incoming: Vec<ConnectionRequest>,
    /// Pending requests the member sent.
    pub outgoing: Vec<ConnectionRequest>,
    pub incoming_total: u32,
    pub outgoing_total: u32,
    pub stats: RequestStats,
    /// Set by a server push; cleared once both directions are refetched.
    pub stale: bool,
    pub last_error: Option<String>,
    request_window: ThrottleWindow<RequestDirection>,
    stats_window: ThrottleWindow<&'static str>,
    refreshed: [bool; 2],
}

impl RequestListState {
    fn new(requests_interval_ms: u64, stats_interval_ms: u64) -> Self {
        Self {
            incoming: Vec::new(),
            outgoing: Vec::new(),
            incoming_total: 0,
            outgoing_total: 0,
            stats: RequestStats::default(),
            stale: false,
            last_error: None,
            request_window: ThrottleWindow::new(requests_interval_ms),
            stats_window: ThrottleWindow::new(stats_interval_ms),
            refreshed: [true; 2],
        }
    }

    #[must_use]
    pub fn requests(&self, direction: RequestDirection) -> &[ConnectionRequest] {
        match direction {
            RequestDirection::Incoming => &self.incoming,
            RequestDirection::Outgoing => &self.outgoing,
        }
    }

    #[must_use]
    pub fn total(&self, direction: RequestDirection) -> u32 {
        match direction {
            RequestDirection::Incoming => self.incoming_total,
            RequestDirection::Outgoing => self.outgoing_total,
        }
    }

    /// When `direction` was last fetched (epoch ms), 0 if never or forced.
    #[must_use]
    pub fn last_fetch(&self, direction: RequestDirection) -> u64 {
        self.request_window.last_fetch(&direction)
    }

    #[must_use]
    pub fn last_stats_fetch(&self) -> u64 {
        self.stats_window.last_fetch(&STATS_KEY)
    }

    /// Apply a fetched list. `current` is false when the direction was
    /// forced while the fetch was in flight; the list is still applied but
    /// does not count toward clearing `stale`.
    fn set(
        &mut self,
        direction: RequestDirection,
        requests: Vec<ConnectionRequest>,
        total: u32,
        current: bool,
    ) {
        let (list, count, slot) = match direction {
            RequestDirection::Incoming => (&mut self.incoming, &mut self.incoming_total, 0),
            RequestDirection::Outgoing => (&mut self.outgoing, &mut self.outgoing_total, 1),
        };
        *list = requests;
        *count = total;
        if !current {
            return;
        }
        self.refreshed[slot] = true;
        if self.refreshed.iter().all(|r| *r) {
            self.stale = false;
        }
    }
}

/// Single-flight flag for request list fetches.
#[derive(Default)]
struct Busy {
    flag: AtomicBool,
    idle: Notify,
}

impl Busy {
    fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(self))
    }

    /// Resolve once no fetch holds the flag.
    async fn wait_idle(&self) {
        loop {
            let idle = self.idle.notified();
            if !self.flag.load(Ordering::Acquire) {
                return;
            }
            idle.await;
        }
    }
}

/// Clears the busy flag when the guarded fetch ends, however it ends.
struct BusyGuard<'a>(&'a Busy);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.flag.store(false, Ordering::Release);
        self.0.idle.notify_waiters();
    }
}

pub struct RequestStore {
    api: Arc<dyn ConnectionApi>,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
    state: watch::Sender<RequestListState>,
    busy: Busy,
}

impl RequestStore {
    #[must_use]
    pub fn new(api: Arc<dyn ConnectionApi>, clock: Arc<dyn Clock>, alerts: Arc<dyn AlertSink>) -> Self {
        let (state, _) = watch::channel(RequestListState::new(
            DEFAULT_REQUESTS_INTERVAL_MS,
            DEFAULT_STATS_INTERVAL_MS,
        ));
        Self {
            api,
            clock,
            alerts,
            state,
            busy: Busy::default(),
        }
    }

    /// Apply the throttle intervals from `config`.
    #[must_use]
    pub fn with_config(self, config: &SyncConfig) -> Self {
        let throttle = &config.throttle;
        self.state.send_modify(|s| {
            s.request_window = ThrottleWindow::new(throttle.requests_ms);
            s.stats_window = ThrottleWindow::new(throttle.stats_ms);
        });
        self
    }

    #[must_use]
    pub fn snapshot(&self) -> RequestListState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RequestListState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn stats(&self) -> RequestStats {
        self.state.borrow().stats
    }

    /// Fetch pending requests for one direction.
    ///
    /// Skipped while any request fetch is in flight, or when `direction` was
    /// fetched within the window.
    pub async fn fetch_requests(&self, direction: RequestDirection) -> FetchOutcome {
        let Some(_busy) = self.busy.try_acquire() else {
            trace!(direction = %direction, "Request fetch already in flight");
            return FetchOutcome::Busy;
        };

        let now = self.clock.now_ms();
        let proceed = self
            .state
            .send_if_modified(|s| s.request_window.try_acquire(&direction, now));
        if !proceed {
            trace!(direction = %direction, "Request fetch throttled");
            metrics::record_throttled(direction.as_str());
            return FetchOutcome::Throttled;
        }

        match self.api.list_requests(direction).await {
            Ok(page) => {
                let at = self.clock.now_ms();
                let pending: Vec<_> = page
                    .requests
                    .into_iter()
                    .filter(|r| !r.status.is_resolved())
                    .collect();
                debug!(direction = %direction, pending = pending.len(), total = page.total, "Requests fetched");
                self.state.send_modify(|s| {
                    let current = s.request_window.settle(&direction, now, at);
                    s.set(direction, pending, page.total, current);
                    s.last_error = None;
                });
                FetchOutcome::Fetched
            }
            Err(e) => {
                warn!(direction = %direction, error = %e, transient = e.is_transient(), "Request fetch failed");
                metrics::record_fetch_failure(direction.as_str(), &e);
                self.state.send_modify(|s| s.last_error = Some(e.to_string()));
                FetchOutcome::Failed
            }
        }
    }

    /// Reset the window for `direction` and fetch.
    pub async fn force_refresh_requests(&self, direction: RequestDirection) -> FetchOutcome {
        self.state.send_modify(|s| s.request_window.force(&direction));
        self.fetch_requests(direction).await
    }

    /// Force `direction` and fetch it once any fetch already in flight has
    /// landed. That fetch was issued before the caller's mutation, so its
    /// response cannot stand in for this one.
    async fn resync_requests(&self, direction: RequestDirection) -> FetchOutcome {
        loop {
            match self.force_refresh_requests(direction).await {
                FetchOutcome::Busy => self.busy.wait_idle().await,
                outcome => return outcome,
            }
        }
    }

    /// Fetch the aggregate counters, unless fetched within the window.
    pub async fn fetch_stats(&self) -> FetchOutcome {
        let now = self.clock.now_ms();
        let proceed = self
            .state
            .send_if_modified(|s| s.stats_window.try_acquire(&STATS_KEY, now));
        if !proceed {
            trace!("Stats fetch throttled");
            metrics::record_throttled(STATS_KEY);
            return FetchOutcome::Throttled;
        }

        match self.api.stats().await {
            Ok(stats) => {
                let at = self.clock.now_ms();
                self.state.send_modify(|s| {
                    s.stats = stats;
                    s.stats_window.settle(&STATS_KEY, now, at);
                    s.last_error = None;
                });
                debug!(
                    connections = stats.total_connections,
                    pending_incoming = stats.pending_incoming,
                    pending_outgoing = stats.pending_outgoing,
                    "Request stats synced"
                );
                FetchOutcome::Fetched
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Stats fetch failed");
                metrics::record_fetch_failure(STATS_KEY, &e);
                self.state.send_modify(|s| s.last_error = Some(e.to_string()));
                FetchOutcome::Failed
            }
        }
    }

    /// Reset the stats window and fetch.
    pub async fn force_refresh_stats(&self) -> FetchOutcome {
        self.state.send_modify(|s| s.stats_window.force(&STATS_KEY));
        self.fetch_stats().await
    }

    /// Send a connection request, then resync stats and outgoing requests.
    ///
    /// # Errors
    ///
    /// Returns the API error after the stats resync has run.
    pub async fn send_request(
        &self,
        receiver_id: &str,
        message: Option<&str>,
    ) -> Result<ConnectionRequest, ApiError> {
        let result = optimistic(
            "send_request",
            || {},
            self.api.send_request(receiver_id, message),
            || async {
                self.force_refresh_stats().await;
            },
        )
        .await;

        match result {
            Ok(request) => {
                debug!(request = %request.id, receiver = receiver_id, "Connection request sent");
                self.force_refresh_stats().await;
                self.resync_requests(RequestDirection::Outgoing).await;
                Ok(request)
            }
            Err(e) => {
                self.alerts
                    .show(Alert::error("Could not send connection request", e.to_string()));
                Err(e)
            }
        }
    }

    /// Accept, decline or cancel a request, then resync stats and the list
    /// the request lived in.
    ///
    /// # Errors
    ///
    /// Returns the API error after the stats resync has run. The request
    /// keeps its previous state.
    pub async fn respond_to_request(
        &self,
        request_id: &str,
        action: RespondAction,
    ) -> Result<ConnectionRequest, ApiError> {
        let result = optimistic(
            "respond_to_request",
            || {},
            self.api.respond(request_id, action),
            || async {
                self.force_refresh_stats().await;
            },
        )
        .await;

        match result {
            Ok(request) => {
                debug!(request = request_id, action = action.as_str(), "Connection request answered");
                self.force_refresh_stats().await;
                self.resync_requests(action.direction()).await;
                Ok(request)
            }
            Err(e) => {
                self.alerts.show(Alert::error(
                    format!("Could not {} connection request", action.as_str()),
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    /// Remove an established connection, then resync stats.
    ///
    /// # Errors
    ///
    /// Returns the API error after the stats resync has run.
    pub async fn remove_connection(&self, connection_id: &str) -> Result<(), ApiError> {
        let result = optimistic(
            "remove_connection",
            || {},
            self.api.remove_connection(connection_id),
            || async {
                self.force_refresh_stats().await;
            },
        )
        .await;

        match result {
            Ok(()) => {
                debug!(connection = connection_id, "Connection removed");
                self.force_refresh_stats().await;
                Ok(())
            }
            Err(e) => {
                self.alerts
                    .show(Alert::error("Could not remove connection", e.to_string()));
                Err(e)
            }
        }
    }

    /// Relationship with `user_id`. Any failure reads as not connected.
    pub async fn check_connection(&self, user_id: &str) -> ConnectionStatus {
        match self.api.connection_status(user_id).await {
            Ok(status) => status,
            Err(e) => {
                debug!(user = user_id, error = %e, "Connection status lookup failed");
                ConnectionStatus::NotConnected
            }
        }
    }
}

impl Invalidate for RequestStore {
    fn invalidate(&self) {
        self.state.send_modify(|s| {
            s.stale = true;
            s.refreshed = [false; 2];
            for direction in RequestDirection::ALL {
                s.request_window.force(&direction);
            }
            s.stats_window.force(&STATS_KEY);
        });
        debug!("Request store invalidated");
    }
}
