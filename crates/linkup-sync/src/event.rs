//! Typed realtime events.
//!
//! Inbound `event` frames are decoded exactly once, into [`RealtimeEvent`].
//! Names the client does not know, and known names whose payload does not
//! parse, become [`RealtimeEvent::Unknown`] and are ignored by the router.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::model::{ConnectionRequest, Notification};

/// Event names on the wire.
pub mod names {
    pub const NOTIFICATION_NEW: &str = "notification:new";
    pub const ONLINE_USERS: &str = "online:users";
    pub const USER_ONLINE: &str = "user:online";
    pub const USER_OFFLINE: &str = "user:offline";
    pub const CONNECTION_REQUEST: &str = "connection:request";

    /// Outbound: ask the server for the current online roster.
    pub const GET_ONLINE_USERS: &str = "online:get-users";
}

/// Routing key for handler tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NotificationNew,
    OnlineUsers,
    UserOnline,
    UserOffline,
    ConnectionRequest,
    Unknown,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotificationNew => names::NOTIFICATION_NEW,
            Self::OnlineUsers => names::ONLINE_USERS,
            Self::UserOnline => names::USER_ONLINE,
            Self::UserOffline => names::USER_OFFLINE,
            Self::ConnectionRequest => names::CONNECTION_REQUEST,
            Self::Unknown => "unknown",
        }
    }
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// A new notification for the signed-in member.
    NotificationNew(Notification),
    /// Full roster of online member ids.
    OnlineUsers(Vec<String>),
    /// A member came online.
    UserOnline(String),
    /// A member went offline.
    UserOffline(String),
    /// A connection request involving the member was created or changed.
    ConnectionRequest(ConnectionRequest),
    /// Anything else. Kept for logging; never routed.
    Unknown { event: String, data: Value },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RosterPayload {
    Ids(Vec<String>),
    Wrapped {
        #[serde(rename = "userIds")]
        user_ids: Vec<String>,
    },
}

#[derive(Deserialize)]
struct MemberPayload {
    #[serde(rename = "userId")]
    user_id: String,
}

impl RealtimeEvent {
    /// Decode an event frame's name and payload.
    #[must_use]
    pub fn decode(event: &str, data: Value) -> Self {
        let decoded = match event {
            names::NOTIFICATION_NEW => serde_json::from_value(data.clone()).map(Self::NotificationNew),
            names::ONLINE_USERS => serde_json::from_value(data.clone()).map(|p| {
                Self::OnlineUsers(match p {
                    RosterPayload::Ids(ids) => ids,
                    RosterPayload::Wrapped { user_ids } => user_ids,
                })
            }),
            names::USER_ONLINE => serde_json::from_value::<MemberPayload>(data.clone())
                .map(|p| Self::UserOnline(p.user_id)),
            names::USER_OFFLINE => serde_json::from_value::<MemberPayload>(data.clone())
                .map(|p| Self::UserOffline(p.user_id)),
            names::CONNECTION_REQUEST => {
                serde_json::from_value(data.clone()).map(Self::ConnectionRequest)
            }
            _ => {
                return Self::Unknown {
                    event: event.to_string(),
                    data,
                }
            }
        };

        decoded.unwrap_or_else(|e| {
            warn!(event, error = %e, "Malformed payload for known event");
            Self::Unknown {
                event: event.to_string(),
                data,
            }
        })
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NotificationNew(_) => EventKind::NotificationNew,
            Self::OnlineUsers(_) => EventKind::OnlineUsers,
            Self::UserOnline(_) => EventKind::UserOnline,
            Self::UserOffline(_) => EventKind::UserOffline,
            Self::ConnectionRequest(_) => EventKind::ConnectionRequest,
            Self::Unknown { .. } => EventKind::Unknown,
        }
    }
}
