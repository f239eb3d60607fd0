//! In-process transport.
//!
//! [`MemoryConnector`] hands out sessions backed by tokio channels. The
//! "server" side of every session is a [`MemorySession`], which can push
//! frames, drop the socket, or end the session with a server-initiated
//! disconnect. Sessions stay listed after they close so callers can inspect
//! what happened to them.

use async_trait::async_trait;
use linkup_protocol::{DisconnectReason, Frame};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

use crate::traits::{Connection, ConnectionId, Connector, Credential, TransportError};

#[derive(Default)]
struct MemoryState {
    sessions: Vec<MemorySession>,
    failures_remaining: usize,
    rejected: HashSet<String>,
}

/// Connector for in-process sessions.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connection attempts fail with a timeout.
    pub fn fail_next(&self, count: usize) {
        self.lock().failures_remaining = count;
    }

    /// Refuse every future handshake for `credential`.
    pub fn reject(&self, credential: &Credential) {
        self.lock().rejected.insert(credential.expose().to_string());
    }

    /// Number of connection attempts made, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Every session opened so far, oldest first.
    #[must_use]
    pub fn sessions(&self) -> Vec<MemorySession> {
        self.lock().sessions.clone()
    }

    /// Sessions whose client side is still open.
    #[must_use]
    pub fn open_sessions(&self) -> Vec<MemorySession> {
        self.lock()
            .sessions
            .iter()
            .filter(|s| s.is_open())
            .cloned()
            .collect()
    }

    /// The most recently opened session.
    #[must_use]
    pub fn latest(&self) -> Option<MemorySession> {
        self.lock().sessions.last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn Connection>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();

        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            debug!(credential = %credential, "Memory connect failing on request");
            return Err(TransportError::Timeout);
        }

        if state.rejected.contains(credential.expose()) {
            return Err(TransportError::Rejected {
                code: 401,
                message: "credential rejected".to_string(),
            });
        }

        let id = ConnectionId::new(format!("mem-{}", state.sessions.len() + 1));
        let (tx, rx) = mpsc::unbounded_channel();
        let session = MemorySession {
            id: id.clone(),
            credential: credential.clone(),
            to_client: Arc::new(Mutex::new(Some(tx))),
            sent: Arc::new(Mutex::new(Vec::new())),
            open: Arc::new(AtomicBool::new(true)),
        };
        let conn = MemoryConnection {
            id,
            rx,
            sent: session.sent.clone(),
            open: session.open.clone(),
        };

        debug!(socket = %session.id, credential = %credential, "Memory session opened");
        state.sessions.push(session);
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Server-side view of one in-process session.
#[derive(Clone)]
pub struct MemorySession {
    id: ConnectionId,
    credential: Credential,
    to_client: Arc<Mutex<Option<mpsc::UnboundedSender<Frame>>>>,
    sent: Arc<Mutex<Vec<Frame>>>,
    open: Arc<AtomicBool>,
}

impl MemorySession {
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Whether the client has neither closed the session nor lost the socket.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Deliver a frame to the client. Returns `false` once the socket is gone.
    pub fn push(&self, frame: Frame) -> bool {
        match lock(&self.to_client).as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    /// Deliver an event frame to the client.
    pub fn push_event(&self, event: &str, data: serde_json::Value) -> bool {
        self.push(Frame::event(event, data))
    }

    /// End the session from the server side with an explicit disconnect.
    pub fn server_disconnect(&self) {
        self.push(Frame::disconnect(DisconnectReason::ServerInitiated));
        self.drop_socket();
    }

    /// Lose the socket without any goodbye.
    pub fn drop_socket(&self) {
        lock(&self.to_client).take();
        self.open.store(false, Ordering::SeqCst);
    }

    /// Frames the client has sent on this session.
    #[must_use]
    pub fn sent_frames(&self) -> Vec<Frame> {
        lock(&self.sent).clone()
    }

    /// Names of the events the client has emitted on this session.
    #[must_use]
    pub fn sent_events(&self) -> Vec<String> {
        lock(&self.sent)
            .iter()
            .filter_map(|f| f.event_name().map(str::to_string))
            .collect()
    }
}

/// Client side of an in-process session.
pub struct MemoryConnection {
    id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Frame>,
    sent: Arc<Mutex<Vec<Frame>>>,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        // Frames queued before the socket dropped are still delivered.
        let frame = self.rx.recv().await;
        if frame.is_none() {
            self.open.store(false, Ordering::SeqCst);
        }
        Ok(frame)
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }
        lock(&self.sent).push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::SeqCst);
        self.rx.close();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let connector = MemoryConnector::new();
        let mut conn = connector.connect(&Credential::new("alice")).await.unwrap();
        let session = connector.latest().unwrap();

        assert_eq!(session.credential().expose(), "alice");
        assert_eq!(conn.id(), session.id());

        assert!(session.push_event("user:online", json!({ "userId": "u-1" })));
        let frame = conn.recv().await.unwrap().unwrap();
        assert_eq!(frame.event_name(), Some("user:online"));

        conn.send(Frame::event("online:get-users", json!(null)))
            .await
            .unwrap();
        assert_eq!(session.sent_events(), vec!["online:get-users".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_server_disconnect() {
        let connector = MemoryConnector::new();
        let mut conn = connector.connect(&Credential::new("alice")).await.unwrap();
        let session = connector.latest().unwrap();

        session.server_disconnect();

        assert_eq!(
            conn.recv().await.unwrap(),
            Some(Frame::disconnect(DisconnectReason::ServerInitiated))
        );
        assert_eq!(conn.recv().await.unwrap(), None);
        assert!(!conn.is_open());
        assert!(connector.open_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_memory_failures_and_rejection() {
        let connector = MemoryConnector::new();
        connector.fail_next(1);
        connector.reject(&Credential::new("mallory"));

        assert!(matches!(
            connector.connect(&Credential::new("alice")).await,
            Err(TransportError::Timeout)
        ));
        assert!(matches!(
            connector.connect(&Credential::new("mallory")).await,
            Err(TransportError::Rejected { code: 401, .. })
        ));
        assert!(connector.connect(&Credential::new("alice")).await.is_ok());
        assert_eq!(connector.attempts(), 3);
        assert_eq!(connector.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_client_close() {
        let connector = MemoryConnector::new();
        let mut conn = connector.connect(&Credential::new("alice")).await.unwrap();
        let session = connector.latest().unwrap();

        conn.close().await.unwrap();
        assert!(!session.is_open());
        assert!(conn.send(Frame::ping()).await.is_err());
    }
}
