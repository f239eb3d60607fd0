//! The shared realtime connection.
//!
//! [`ConnectionManager`] owns at most one live session, keyed by the
//! credential it was opened with. Consumers get a [`ConnectionHandle`], which
//! only holds a weak reference: they can emit, listen and watch state, but
//! the session's lifetime is decided by `acquire` / `teardown` alone.
//!
//! A background task per session runs the connect → pump → reconnect loop:
//!
//! ```text
//!  Connecting ──ok──▶ Connected ──socket dropped──▶ Reconnecting ──backoff──▶ connect
//!      │                  │                              ▲
//!      │                  └──server disconnect───────────┘ (no backoff, unless repeated)
//!      └──max_attempts consecutive failures──▶ Disconnected
//! ```

use linkup_protocol::{DisconnectReason, Frame};
use linkup_transport::{Connection, ConnectionId, Connector, Credential};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::SyncError;
use crate::event::{names, RealtimeEvent};
use crate::metrics;

/// How long `teardown` waits for the session task to close the socket
/// before aborting it.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Server disconnects in a row, each ending a session shorter than the
/// reconnect delay, that are answered without waiting.
const IMMEDIATE_RECONNECTS: u32 = 3;

/// Default inbound event buffer per connection.
const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Automatic reconnection settings.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Consecutive failed connection attempts before giving up.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

enum Command {
    Emit(Frame),
    /// Skip the rest of the current backoff.
    Retry,
    Close,
}

enum SessionEnd {
    /// Closed locally; do not reconnect.
    Closed,
    /// The server ended the session on purpose; reconnect right away.
    ServerDisconnect,
    /// The socket went away; reconnect after the backoff.
    Dropped,
}

struct Shared {
    credential: Credential,
    state: watch::Sender<ConnectionState>,
    socket_id: RwLock<Option<ConnectionId>>,
    events: broadcast::Sender<Arc<RealtimeEvent>>,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

impl Shared {
    fn new(credential: Credential, event_capacity: usize) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            credential,
            state,
            socket_id: RwLock::new(None),
            events,
            commands: Mutex::new(None),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(credential = %self.credential, from = %previous, to = %state, "Connection state changed");
            metrics::set_connection_state(state);
        }
    }

    fn set_socket_id(&self, id: Option<ConnectionId>) {
        *self.socket_id.write().unwrap_or_else(PoisonError::into_inner) = id;
    }

    fn commands(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Command>>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn command(&self, command: Command) -> bool {
        self.commands()
            .as_ref()
            .is_some_and(|tx| tx.send(command).is_ok())
    }

    fn deliver(&self, event: &str, data: Value) {
        let decoded = RealtimeEvent::decode(event, data);
        trace!(event, kind = decoded.kind().as_str(), "Inbound event");
        // No receivers just means nothing is bound right now.
        let _ = self.events.send(Arc::new(decoded));
    }
}

/// A consumer's reference to the shared connection.
///
/// Cloning is cheap. A handle outlives neither `teardown` nor a credential
/// change; after that every call reports [`SyncError::Released`].
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Weak<Shared>,
    credential: Credential,
}

impl ConnectionHandle {
    fn new(shared: &Arc<Shared>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            credential: shared.credential.clone(),
        }
    }

    fn upgrade(&self) -> Result<Arc<Shared>, SyncError> {
        self.shared.upgrade().ok_or(SyncError::Released)
    }

    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Whether the manager still owns the connection behind this handle.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.shared.strong_count() > 0
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.upgrade().map_or(ConnectionState::Disconnected, |s| {
            let state = *s.state.borrow();
            state
        })
    }

    /// Identifier of the current underlying socket, while connected.
    #[must_use]
    pub fn socket_id(&self) -> Option<String> {
        let shared = self.shared.upgrade()?;
        let id = shared
            .socket_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|id| id.to_string());
        id
    }

    /// Observe state transitions.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Released`] if the connection is gone.
    pub fn watch_state(&self) -> Result<watch::Receiver<ConnectionState>, SyncError> {
        Ok(self.upgrade()?.state.subscribe())
    }

    /// Wait until the session is connected.
    ///
    /// This does not time out on its own: if reconnection gives up, it keeps
    /// waiting until the next `acquire` brings the session back.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Released`] if the connection is torn down first.
    pub async fn wait_connected(&self) -> Result<(), SyncError> {
        let mut rx = self.watch_state()?;
        rx.wait_for(|state| state.is_connected())
            .await
            .map(|_| ())
            .map_err(|_| SyncError::Released)
    }

    /// Receive decoded inbound events. The stream survives reconnects.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Released`] if the connection is gone.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<Arc<RealtimeEvent>>, SyncError> {
        Ok(self.upgrade()?.events.subscribe())
    }

    /// Send an event to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] unless the session is up.
    pub fn emit(&self, event: &str, data: Value) -> Result<(), SyncError> {
        let shared = self.upgrade()?;
        if !shared.state.borrow().is_connected() {
            return Err(SyncError::NotConnected);
        }
        if shared.command(Command::Emit(Frame::event(event, data))) {
            trace!(event, "Emit queued");
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }

    /// Ask the server for the online roster; the answer arrives as an
    /// `online:users` event.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionHandle::emit`].
    pub fn request_online_users(&self) -> Result<(), SyncError> {
        self.emit(names::GET_ONLINE_USERS, Value::Null)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("credential", &self.credential)
            .field("state", &self.state())
            .field("socket_id", &self.socket_id())
            .finish()
    }
}

struct Live {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl Live {
    async fn shutdown(mut self) {
        let sender = self.shared.commands().take();
        if let Some(tx) = sender {
            let _ = tx.send(Command::Close);
        }

        if tokio::time::timeout(CLOSE_GRACE, &mut self.task).await.is_err() {
            warn!(credential = %self.shared.credential, "Connection task did not stop in time, aborting");
            self.task.abort();
        }

        self.shared.set_socket_id(None);
        self.shared.set_state(ConnectionState::Disconnected);
    }
}

/// Owner of the process-wide realtime connection.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    event_capacity: usize,
    slot: tokio::sync::Mutex<Option<Live>>,
    consumers: AtomicUsize,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            policy,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            slot: tokio::sync::Mutex::new(None),
            consumers: AtomicUsize::new(0),
        }
    }

    /// Size of the inbound event buffer for connections opened from now on.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Get the connection for `credential`, opening it if needed.
    ///
    /// A live connection for a different credential is closed first. A
    /// connection for the same credential that is down is reconnected in
    /// place, so existing handles and bindings keep working.
    pub async fn acquire(&self, credential: Credential) -> ConnectionHandle {
        let mut slot = self.slot.lock().await;
        self.consumers.fetch_add(1, Ordering::SeqCst);

        if let Some(live) = slot.as_mut() {
            if live.shared.credential == credential {
                if live.task.is_finished() {
                    info!(credential = %credential, "Restarting realtime connection");
                    live.task = self.spawn(live.shared.clone());
                } else if !live.shared.state.borrow().is_connected() {
                    live.shared.command(Command::Retry);
                }
                return ConnectionHandle::new(&live.shared);
            }

            info!(
                previous = %live.shared.credential,
                credential = %credential,
                "Credential changed, replacing realtime connection"
            );
        }

        if let Some(previous) = slot.take() {
            previous.shutdown().await;
        }

        let shared = Arc::new(Shared::new(credential, self.event_capacity));
        let handle = ConnectionHandle::new(&shared);
        let task = self.spawn(shared.clone());
        *slot = Some(Live { shared, task });
        handle
    }

    /// A consumer stopped using the connection.
    ///
    /// The connection stays open even when the count reaches zero. Returns
    /// the remaining consumer count.
    pub fn release(&self) -> usize {
        let previous = self
            .consumers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        let remaining = previous.saturating_sub(1);
        if remaining == 0 {
            debug!("Last realtime consumer released; connection stays up");
        }
        remaining
    }

    #[must_use]
    pub fn consumers(&self) -> usize {
        self.consumers.load(Ordering::SeqCst)
    }

    /// Look up the current connection without opening one.
    pub async fn current(&self) -> Option<ConnectionHandle> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|live| ConnectionHandle::new(&live.shared))
    }

    /// Close the connection opened for `credential` and forget it.
    ///
    /// Returns `false` if no connection is owned by that credential.
    pub async fn teardown(&self, credential: &Credential) -> bool {
        let mut slot = self.slot.lock().await;

        match slot.as_ref() {
            Some(live) if live.shared.credential == *credential => {}
            Some(live) => {
                warn!(
                    credential = %credential,
                    owner = %live.shared.credential,
                    "Teardown requested by a credential that does not own the connection"
                );
                return false;
            }
            None => return false,
        }

        if let Some(live) = slot.take() {
            live.shutdown().await;
        }
        self.consumers.store(0, Ordering::SeqCst);
        info!(credential = %credential, "Realtime connection torn down");
        true
    }

    fn spawn(&self, shared: Arc<Shared>) -> JoinHandle<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        *shared.commands() = Some(tx);
        tokio::spawn(run_session(
            shared,
            self.connector.clone(),
            self.policy.clone(),
            rx,
        ))
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(live) = self.slot.get_mut().take() {
            live.task.abort();
        }
    }
}

async fn run_session(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut failures = 0u32;
    let mut kicks = 0u32;
    let mut reconnecting = false;

    loop {
        shared.set_state(if reconnecting {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        });
        metrics::record_connect_attempt();

        match connector.connect(&shared.credential).await {
            Ok(mut conn) => {
                failures = 0;
                info!(
                    credential = %shared.credential,
                    socket = %conn.id(),
                    transport = connector.name(),
                    "Realtime connection established"
                );
                shared.set_socket_id(Some(conn.id().clone()));
                shared.set_state(ConnectionState::Connected);
                let connected_at = tokio::time::Instant::now();

                let end = pump(&shared, conn.as_mut(), &mut commands).await;
                shared.set_socket_id(None);
                reconnecting = true;

                match end {
                    SessionEnd::Closed => {
                        if let Err(e) = conn.close().await {
                            debug!(error = %e, "Error while closing realtime connection");
                        }
                        break;
                    }
                    SessionEnd::ServerDisconnect => {
                        if connected_at.elapsed() >= policy.delay {
                            kicks = 0;
                        }
                        kicks += 1;
                        metrics::record_reconnect(kicks <= IMMEDIATE_RECONNECTS);
                        if kicks <= IMMEDIATE_RECONNECTS {
                            info!(credential = %shared.credential, "Server ended the session, reconnecting now");
                            continue;
                        }
                        warn!(
                            credential = %shared.credential,
                            disconnects = kicks,
                            "Server keeps ending the session, backing off"
                        );
                    }
                    SessionEnd::Dropped => {
                        kicks = 0;
                        warn!(credential = %shared.credential, "Realtime connection lost");
                        metrics::record_reconnect(false);
                    }
                }
            }
            Err(e) => {
                failures += 1;
                warn!(
                    credential = %shared.credential,
                    attempt = failures,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Realtime connection attempt failed"
                );
                if failures >= policy.max_attempts {
                    warn!(credential = %shared.credential, "Giving up on realtime connection");
                    break;
                }
                reconnecting = true;
            }
        }

        shared.set_state(ConnectionState::Reconnecting);
        if !backoff(policy.delay, &mut commands).await {
            break;
        }
    }

    shared.set_state(ConnectionState::Disconnected);
}

/// Wait out the reconnect delay. Returns `false` if the session was closed
/// meanwhile.
async fn backoff(delay: Duration, commands: &mut mpsc::UnboundedReceiver<Command>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            command = commands.recv() => match command {
                Some(Command::Retry) => return true,
                Some(Command::Emit(frame)) => {
                    debug!(event = ?frame.event_name(), "Dropping emit while disconnected");
                }
                Some(Command::Close) | None => return false,
            },
        }
    }
}

async fn pump(
    shared: &Shared,
    conn: &mut dyn Connection,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> SessionEnd {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Emit(frame)) => {
                    if let Err(e) = conn.send(frame).await {
                        warn!(socket = %conn.id(), error = %e, "Emit failed");
                        return SessionEnd::Dropped;
                    }
                }
                Some(Command::Retry) => {}
                Some(Command::Close) | None => return SessionEnd::Closed,
            },
            frame = conn.recv() => match frame {
                Ok(Some(Frame::Event { event, data, .. })) => shared.deliver(&event, data),
                Ok(Some(Frame::Ping { timestamp })) => {
                    if conn.send(Frame::pong(timestamp)).await.is_err() {
                        return SessionEnd::Dropped;
                    }
                }
                Ok(Some(Frame::Disconnect { reason: DisconnectReason::ServerInitiated })) => {
                    return SessionEnd::ServerDisconnect;
                }
                Ok(Some(Frame::Disconnect { reason })) => {
                    debug!(socket = %conn.id(), ?reason, "Session ended by peer");
                    return SessionEnd::Dropped;
                }
                Ok(Some(Frame::Error { code, message, .. })) => {
                    warn!(socket = %conn.id(), code, %message, "Server reported an error");
                }
                Ok(Some(other)) => {
                    trace!(frame_type = ?other.frame_type(), "Ignoring frame");
                }
                Ok(None) => return SessionEnd::Dropped,
                Err(e) => {
                    warn!(socket = %conn.id(), error = %e, "Realtime receive failed");
                    return SessionEnd::Dropped;
                }
            },
        }
    }
}
