//! Frame types for the Linkup realtime transport.
//!
//! Every message on the wire is one [`Frame`]. Application traffic travels as
//! [`Frame::Event`]; the remaining variants manage the session itself.

use serde::{Deserialize, Serialize};

/// Envelope version sent in the handshake.
pub const PROTOCOL_VERSION: u8 = 1;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Handshake = 0x01,
    Welcome = 0x02,
    Event = 0x03,
    Ack = 0x04,
    Error = 0x05,
    Ping = 0x06,
    Pong = 0x07,
    Disconnect = 0x08,
}

/// Why a session ended.
///
/// Only [`DisconnectReason::ServerInitiated`] asks the client to come back
/// immediately; the others go through the normal reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum DisconnectReason {
    /// The server closed the session on purpose (deploy, rebalancing, kick).
    ServerInitiated = 0,
    /// The client closed the session.
    ClientInitiated = 1,
    /// The underlying socket went away.
    TransportClose = 2,
    /// No keepalive traffic within the heartbeat window.
    PingTimeout = 3,
}

impl From<DisconnectReason> for u8 {
    fn from(reason: DisconnectReason) -> u8 {
        reason as u8
    }
}

impl TryFrom<u8> for DisconnectReason {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DisconnectReason::ServerInitiated),
            1 => Ok(DisconnectReason::ClientInitiated),
            2 => Ok(DisconnectReason::TransportClose),
            3 => Ok(DisconnectReason::PingTimeout),
            _ => Err("Invalid disconnect reason"),
        }
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// First frame sent by the client, carrying its bearer credential.
    #[serde(rename = "handshake")]
    Handshake {
        /// Envelope version.
        version: u8,
        /// Bearer credential for the session.
        token: String,
    },

    /// Server reply to a successful handshake.
    #[serde(rename = "welcome")]
    Welcome {
        /// Identifier the server assigned to this socket.
        socket_id: String,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// A named application event.
    #[serde(rename = "event")]
    Event {
        /// Event name, e.g. `notification:new`.
        event: String,
        /// JSON payload.
        data: serde_json::Value,
        /// Request ID when the sender wants an acknowledgment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack: Option<u64>,
    },

    /// Acknowledgment of an event.
    #[serde(rename = "ack")]
    Ack {
        /// ID of the acknowledged event.
        id: u64,
        /// Optional reply payload.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },

    /// Error reply.
    #[serde(rename = "error")]
    Error {
        /// ID of the failed request (0 if not applicable).
        id: u64,
        /// Error code.
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Session is ending.
    #[serde(rename = "disconnect")]
    Disconnect {
        /// Who ended it and why.
        reason: DisconnectReason,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Handshake { .. } => FrameType::Handshake,
            Frame::Welcome { .. } => FrameType::Welcome,
            Frame::Event { .. } => FrameType::Event,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Error { .. } => FrameType::Error,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Disconnect { .. } => FrameType::Disconnect,
        }
    }

    /// Create a Handshake frame for the current protocol version.
    #[must_use]
    pub fn handshake(token: impl Into<String>) -> Self {
        Frame::Handshake {
            version: PROTOCOL_VERSION,
            token: token.into(),
        }
    }

    /// Create a Welcome frame.
    #[must_use]
    pub fn welcome(socket_id: impl Into<String>, heartbeat: u32) -> Self {
        Frame::Welcome {
            socket_id: socket_id.into(),
            heartbeat,
        }
    }

    /// Create an Event frame without acknowledgment.
    #[must_use]
    pub fn event(event: impl Into<String>, data: serde_json::Value) -> Self {
        Frame::Event {
            event: event.into(),
            data,
            ack: None,
        }
    }

    /// Create an Event frame that asks for an acknowledgment.
    #[must_use]
    pub fn event_with_ack(id: u64, event: impl Into<String>, data: serde_json::Value) -> Self {
        Frame::Event {
            event: event.into(),
            data,
            ack: Some(id),
        }
    }

    /// Create an Ack frame.
    #[must_use]
    pub fn ack(id: u64) -> Self {
        Frame::Ack { id, data: None }
    }

    /// Create an Error frame.
    #[must_use]
    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            id,
            code,
            message: message.into(),
        }
    }

    /// Create a Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a Disconnect frame.
    #[must_use]
    pub fn disconnect(reason: DisconnectReason) -> Self {
        Frame::Disconnect { reason }
    }

    /// The event name, for `Event` frames.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        match self {
            Frame::Event { event, .. } => Some(event),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_type() {
        assert_eq!(Frame::handshake("t").frame_type(), FrameType::Handshake);
        assert_eq!(
            Frame::event("notification:new", json!({})).frame_type(),
            FrameType::Event
        );
        assert_eq!(
            Frame::disconnect(DisconnectReason::ServerInitiated).frame_type(),
            FrameType::Disconnect
        );
    }

    #[test]
    fn test_disconnect_reason_conversion() {
        assert_eq!(
            DisconnectReason::try_from(0),
            Ok(DisconnectReason::ServerInitiated)
        );
        assert_eq!(DisconnectReason::try_from(3), Ok(DisconnectReason::PingTimeout));
        assert!(DisconnectReason::try_from(9).is_err());
    }

    #[test]
    fn test_handshake_uses_current_version() {
        match Frame::handshake("abc") {
            Frame::Handshake { version, token } => {
                assert_eq!(version, PROTOCOL_VERSION);
                assert_eq!(token, "abc");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_event_name() {
        let frame = Frame::event("online:get-users", json!(null));
        assert_eq!(frame.event_name(), Some("online:get-users"));
        assert_eq!(Frame::ping().event_name(), None);
    }

    #[test]
    fn test_event_json_shape() {
        let frame = Frame::event("user:online", json!({ "userId": "u-1" }));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["event"], "user:online");
        assert!(value.get("ack").is_none());
    }
}
