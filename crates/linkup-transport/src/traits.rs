//! Transport abstraction traits.
//!
//! A [`Connector`] knows how to reach the event bus; a [`Connection`] is one
//! authenticated session on it.

use async_trait::async_trait;
use linkup_protocol::Frame;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier of one underlying socket.
///
/// Servers usually assign it in the welcome frame; locally generated ids are
/// only a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a local connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let seq = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("sock_{:x}_{}", millis, seq))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Bearer credential for a realtime session.
///
/// `Debug` and `Display` only show a short fingerprint so credentials can be
/// put in log fields.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the handshake.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Last four characters of the token.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let tail: Vec<char> = self.0.chars().rev().take(4).collect();
        format!("…{}", tail.into_iter().rev().collect::<String>())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.fingerprint())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

impl From<&str> for Credential {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Credential {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection or handshake timed out.
    #[error("Connection timed out")]
    Timeout,

    /// The server refused the credential.
    #[error("Handshake rejected ({code}): {message}")]
    Rejected { code: u16, message: String },

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] linkup_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Something that can open authenticated sessions on the event bus.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session for `credential`.
    ///
    /// Resolves once the session is ready to carry events, i.e. after any
    /// handshake the transport needs.
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn Connection>, TransportError>;

    /// Get the transport name (e.g., "websocket", "memory").
    fn name(&self) -> &'static str;
}

/// An open session.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the socket identifier.
    fn id(&self) -> &ConnectionId;

    /// Receive the next frame.
    ///
    /// Returns `None` if the connection is closed cleanly.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;

    /// Send a frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("sock_"));
    }

    #[test]
    fn test_credential_redaction() {
        let credential = Credential::new("eyJhbGciOiJIUzI1NiJ9.secret.sig1234");
        assert_eq!(credential.fingerprint(), "…1234");
        assert_eq!(format!("{:?}", credential), "Credential(…1234)");
        assert!(!credential.to_string().contains("secret"));
        assert_eq!(credential.expose(), "eyJhbGciOiJIUzI1NiJ9.secret.sig1234");
    }

    #[test]
    fn test_short_credential_fingerprint() {
        assert_eq!(Credential::new("ab").fingerprint(), "…ab");
    }
}
