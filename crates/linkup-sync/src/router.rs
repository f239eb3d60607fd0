//! Typed event dispatch.
//!
//! A [`HandlerTable`] maps [`EventKind`]s to handlers. [`EventRouter::bind`]
//! attaches a table to a connection: one task per binding reads the decoded
//! event stream and runs the matching handlers in delivery order, each to
//! completion before the next event is looked at. Unbinding aborts that task,
//! which detaches the whole table at once.

use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::alert::{Alert, AlertSink};
use crate::connection::ConnectionHandle;
use crate::error::SyncError;
use crate::event::{EventKind, RealtimeEvent};
use crate::metrics;
use crate::model::{ConnectionRequest, Notification, NotificationType, RequestStatus};
use crate::roster::OnlineRoster;

/// An event handler. Runs on the binding's task and must not block.
pub type Handler = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

/// Something with cached state that a server push can make stale.
pub trait Invalidate: Send + Sync {
    /// Mark cached data stale so the next fetch goes to the network.
    fn invalidate(&self);
}

/// Handlers keyed by event kind.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<EventKind, Vec<Handler>>,
}

impl HandlerTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `kind`. Handlers for the same kind run in the order
    /// they were added. Handlers for [`EventKind::Unknown`] are never called.
    #[must_use]
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        self.handlers.entry(kind).or_default().push(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn handles(&self, kind: EventKind) -> bool {
        kind != EventKind::Unknown && self.handlers.contains_key(&kind)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler registered for the event's kind.
    ///
    /// Returns `false` if nothing handled it.
    pub fn dispatch(&self, event: &RealtimeEvent) -> bool {
        let kind = event.kind();
        let handlers = match self.handlers.get(&kind) {
            Some(handlers) if kind != EventKind::Unknown => handlers,
            _ => {
                if let RealtimeEvent::Unknown { event, .. } = event {
                    trace!(event = %event, "Ignoring unknown event");
                }
                metrics::record_event(kind.as_str(), false);
                return false;
            }
        };

        for handler in handlers {
            handler(event);
        }
        metrics::record_event(kind.as_str(), true);
        true
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("HandlerTable").field("kinds", &kinds).finish()
    }
}

/// Identifies one bound table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding-{}", self.0)
    }
}

/// Attaches handler tables to connections.
#[derive(Default)]
pub struct EventRouter {
    bindings: DashMap<BindingId, JoinHandle<()>>,
    next_id: AtomicU64,
}

impl EventRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start dispatching events from `handle` to `table`.
    ///
    /// Events delivered after this returns are seen by the table. The binding
    /// survives reconnects of the same connection and ends on its own when
    /// the connection is torn down.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Released`] if the handle's connection is gone.
    pub fn bind(&self, handle: &ConnectionHandle, table: HandlerTable) -> Result<BindingId, SyncError> {
        let mut events = handle.subscribe()?;
        let id = BindingId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        debug!(binding = %id, table = ?table, credential = %handle.credential(), "Binding handler table");

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        table.dispatch(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(binding = %id, skipped, "Handler table fell behind, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        debug!(binding = %id, "Connection released, binding ends");
                        break;
                    }
                }
            }
        });

        self.bindings.insert(id, task);
        Ok(id)
    }

    /// Detach a table. Returns `false` if the binding was unknown.
    pub fn unbind(&self, id: BindingId) -> bool {
        match self.bindings.remove(&id) {
            Some((_, task)) => {
                task.abort();
                debug!(binding = %id, "Handler table unbound");
                true
            }
            None => false,
        }
    }

    /// Detach every table.
    pub fn unbind_all(&self) {
        self.bindings.retain(|_, task| {
            task.abort();
            false
        });
    }

    /// Number of bindings whose task is still running.
    #[must_use]
    pub fn active(&self) -> usize {
        self.bindings.iter().filter(|b| !b.value().is_finished()).count()
    }
}

impl Drop for EventRouter {
    fn drop(&mut self) {
        self.unbind_all();
    }
}

/// The alert shown for an incoming notification.
#[must_use]
pub fn notification_alert(notification: &Notification) -> Alert {
    let entity = notification.entity_id.as_deref();
    match (&notification.kind, entity) {
        (NotificationType::MentorshipApplicationAccepted, Some(id)) => {
            Alert::success("Mentorship application accepted", &notification.message)
                .with_route(format!("/mentorship/applications/{id}"))
        }
        (NotificationType::MentorshipApplicationAccepted, None) => {
            Alert::success("Mentorship application accepted", &notification.message)
        }
        (NotificationType::MentorshipApplicationRejected, Some(id)) => {
            Alert::info("Mentorship application update", &notification.message)
                .with_route(format!("/mentorship/applications/{id}"))
        }
        (NotificationType::MentorshipApplicationRejected, None) => {
            Alert::info("Mentorship application update", &notification.message)
        }
        (NotificationType::ConnectionRequestReceived, _) => {
            Alert::info("New connection request", &notification.message).with_route("/network")
        }
        (NotificationType::ConnectionRequestAccepted, _) => {
            Alert::success("Connection request accepted", &notification.message)
                .with_route("/network")
        }
        _ => Alert::info("New notification", &notification.message),
    }
}

/// The alert shown for a pushed connection request change.
#[must_use]
pub fn request_alert(request: &ConnectionRequest) -> Option<Alert> {
    let sender = if request.sender.name.is_empty() {
        "A member"
    } else {
        request.sender.name.as_str()
    };
    let receiver = if request.receiver.name.is_empty() {
        "A member"
    } else {
        request.receiver.name.as_str()
    };

    let alert = match request.status {
        RequestStatus::Pending => Alert::info(
            "New connection request",
            format!("{sender} wants to connect"),
        ),
        RequestStatus::Accepted => Alert::success(
            "Connection request accepted",
            format!("{receiver} accepted your request"),
        ),
        RequestStatus::Declined | RequestStatus::Cancelled => return None,
    };
    Some(alert.with_route("/network"))
}

/// The standard table: alerts and store invalidation for pushes, roster
/// upkeep for presence events.
#[must_use]
pub fn default_table(
    alerts: Arc<dyn AlertSink>,
    notifications: Arc<dyn Invalidate>,
    requests: Arc<dyn Invalidate>,
    roster: Option<OnlineRoster>,
) -> HandlerTable {
    let notification_alerts = alerts.clone();
    let mut table = HandlerTable::new()
        .on(EventKind::NotificationNew, move |event| {
            if let RealtimeEvent::NotificationNew(notification) = event {
                notification_alerts.show(notification_alert(notification));
                notifications.invalidate();
            }
        })
        .on(EventKind::ConnectionRequest, move |event| {
            if let RealtimeEvent::ConnectionRequest(request) = event {
                if let Some(alert) = request_alert(request) {
                    alerts.show(alert);
                }
                requests.invalidate();
            }
        });

    if let Some(roster) = roster {
        let snapshot = roster.clone();
        let online = roster.clone();
        table = table
            .on(EventKind::OnlineUsers, move |event| {
                if let RealtimeEvent::OnlineUsers(ids) = event {
                    snapshot.replace(ids.iter().cloned());
                }
            })
            .on(EventKind::UserOnline, move |event| {
                if let RealtimeEvent::UserOnline(id) = event {
                    online.mark_online(id.clone());
                }
            })
            .on(EventKind::UserOffline, move |event| {
                if let RealtimeEvent::UserOffline(id) = event {
                    roster.mark_offline(id);
                }
            });
    }

    table
}
