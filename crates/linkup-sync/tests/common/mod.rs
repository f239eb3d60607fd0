//! Fake REST backends for the scenario tests.

#![allow(dead_code)]

use async_trait::async_trait;
use linkup_sync::{
    ApiError, ConnectionApi, ConnectionRequest, ConnectionStatus, MemberSummary, Notification,
    NotificationApi, NotificationPage, NotificationType, RequestDirection, RequestPage,
    RequestStats, RequestStatus, RespondAction,
};
use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::task::Poll;
use tokio::sync::Notify;

pub const START: u64 = 1_700_000_000_000;

/// Poll a future exactly once, returning its output if it completed.
pub async fn poll_once<F: Future + Unpin>(mut fut: F) -> Option<F::Output> {
    poll_fn(|cx| match Pin::new(&mut fut).poll(cx) {
        Poll::Ready(out) => Poll::Ready(Some(out)),
        Poll::Pending => Poll::Ready(None),
    })
    .await
}

/// Parks backend reads while held, after they have read server state.
#[derive(Default)]
pub struct Gate {
    held: AtomicBool,
    entered: AtomicU32,
    released: Notify,
}

impl Gate {
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.released.notify_waiters();
    }

    /// Calls that reached the gate so far.
    pub fn entered(&self) -> u32 {
        self.entered.load(Ordering::SeqCst)
    }

    async fn pass(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        loop {
            let released = self.released.notified();
            if !self.held.load(Ordering::SeqCst) {
                return;
            }
            released.await;
        }
    }
}

pub fn notification(id: &str, is_read: bool) -> Notification {
    Notification {
        id: id.to_string(),
        kind: NotificationType::ConnectionRequestReceived,
        message: format!("notification {id}"),
        entity_id: None,
        is_read,
        created_at: START,
    }
}

/// Notification backend holding a list and an authoritative unread count.
#[derive(Default)]
pub struct FakeNotificationApi {
    pub notifications: Mutex<Vec<Notification>>,
    pub unread: AtomicU32,
    pub fail_mutations: AtomicBool,
    pub unread_calls: AtomicU32,
    pub list_calls: AtomicU32,
    pub mark_read_calls: AtomicU32,
    pub mark_all_calls: AtomicU32,
    pub read_gate: Gate,
}

impl FakeNotificationApi {
    pub fn with_unread(ids: &[&str]) -> Self {
        let api = Self::default();
        *api.notifications.lock().unwrap() = ids.iter().map(|id| notification(id, false)).collect();
        api.unread.store(ids.len() as u32, Ordering::SeqCst);
        api
    }

    fn check_mutation(&self) -> Result<(), ApiError> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationApi for FakeNotificationApi {
    async fn unread_count(&self) -> Result<u32, ApiError> {
        self.unread_calls.fetch_add(1, Ordering::SeqCst);
        let unread = self.unread.load(Ordering::SeqCst);
        self.read_gate.pass().await;
        Ok(unread)
    }

    async fn list(&self, page: u32, limit: u32) -> Result<NotificationPage, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let all = self.notifications.lock().unwrap().clone();
        let start = ((page.max(1) - 1) * limit) as usize;
        let response = NotificationPage {
            notifications: all.iter().skip(start).take(limit as usize).cloned().collect(),
            total: all.len() as u32,
            unread_count: self.unread.load(Ordering::SeqCst),
        };
        self.read_gate.pass().await;
        Ok(response)
    }

    async fn mark_read(&self, id: &str) -> Result<(), ApiError> {
        tokio::task::yield_now().await;
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        self.check_mutation()?;
        let mut all = self.notifications.lock().unwrap();
        if let Some(n) = all.iter_mut().find(|n| n.id == id && !n.is_read) {
            n.is_read = true;
            self.unread.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.mark_all_calls.fetch_add(1, Ordering::SeqCst);
        self.check_mutation()?;
        for n in self.notifications.lock().unwrap().iter_mut() {
            n.is_read = true;
        }
        self.unread.store(0, Ordering::SeqCst);
        Ok(())
    }
}

/// Connection backend tracking pending requests and stats.
#[derive(Default)]
pub struct FakeConnectionApi {
    pub incoming: Mutex<Vec<ConnectionRequest>>,
    pub outgoing: Mutex<Vec<ConnectionRequest>>,
    pub connections: AtomicU32,
    pub fail_mutations: AtomicBool,
    pub fail_reads: AtomicBool,
    pub list_calls: Mutex<Vec<RequestDirection>>,
    pub stats_calls: AtomicU32,
    pub list_gate: Gate,
    pub stats_gate: Gate,
    next_id: AtomicU32,
}

impl FakeConnectionApi {
    pub fn add_incoming(&self, sender: &str) -> String {
        let id = format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.incoming.lock().unwrap().push(ConnectionRequest {
            id: id.clone(),
            sender: MemberSummary::new(sender),
            receiver: MemberSummary::new("me"),
            status: RequestStatus::Pending,
            message: None,
        });
        id
    }

    pub fn list_calls(&self, direction: RequestDirection) -> usize {
        self.list_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|d| **d == direction)
            .count()
    }

    fn check(&self, flag: &AtomicBool) -> Result<(), ApiError> {
        if flag.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionApi for FakeConnectionApi {
    async fn list_requests(&self, direction: RequestDirection) -> Result<RequestPage, ApiError> {
        self.list_calls.lock().unwrap().push(direction);
        self.check(&self.fail_reads)?;
        let requests = match direction {
            RequestDirection::Incoming => self.incoming.lock().unwrap().clone(),
            RequestDirection::Outgoing => self.outgoing.lock().unwrap().clone(),
        };
        let total = requests.len() as u32;
        self.list_gate.pass().await;
        Ok(RequestPage { requests, total })
    }

    async fn stats(&self) -> Result<RequestStats, ApiError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&self.fail_reads)?;
        let stats = RequestStats {
            total_connections: self.connections.load(Ordering::SeqCst),
            pending_incoming: self.incoming.lock().unwrap().len() as u32,
            pending_outgoing: self.outgoing.lock().unwrap().len() as u32,
        };
        self.stats_gate.pass().await;
        Ok(stats)
    }

    async fn send_request(
        &self,
        receiver_id: &str,
        message: Option<&str>,
    ) -> Result<ConnectionRequest, ApiError> {
        self.check(&self.fail_mutations)?;
        let mut outgoing = self.outgoing.lock().unwrap();
        if outgoing.iter().any(|r| r.receiver.id == receiver_id) {
            return Err(ApiError::Status {
                status: 409,
                message: "request already sent".into(),
            });
        }
        let request = ConnectionRequest {
            id: format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            sender: MemberSummary::new("me"),
            receiver: MemberSummary::new(receiver_id),
            status: RequestStatus::Pending,
            message: message.map(str::to_string),
        };
        outgoing.push(request.clone());
        Ok(request)
    }

    async fn respond(
        &self,
        request_id: &str,
        action: RespondAction,
    ) -> Result<ConnectionRequest, ApiError> {
        self.check(&self.fail_mutations)?;
        let list = match action.direction() {
            RequestDirection::Incoming => &self.incoming,
            RequestDirection::Outgoing => &self.outgoing,
        };
        let mut list = list.lock().unwrap();
        let index = list
            .iter()
            .position(|r| r.id == request_id)
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: "no such request".into(),
            })?;
        let mut request = list.remove(index);
        request.status = match action {
            RespondAction::Accept => {
                self.connections.fetch_add(1, Ordering::SeqCst);
                RequestStatus::Accepted
            }
            RespondAction::Decline => RequestStatus::Declined,
            RespondAction::Cancel => RequestStatus::Cancelled,
        };
        Ok(request)
    }

    async fn remove_connection(&self, _connection_id: &str) -> Result<(), ApiError> {
        self.check(&self.fail_mutations)?;
        self.connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .ok();
        Ok(())
    }

    async fn connection_status(&self, user_id: &str) -> Result<ConnectionStatus, ApiError> {
        self.check(&self.fail_reads)?;
        if let Some(r) = self
            .outgoing
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.receiver.id == user_id)
        {
            return Ok(ConnectionStatus::PendingOutgoing {
                request_id: r.id.clone(),
            });
        }
        Ok(ConnectionStatus::NotConnected)
    }
}
