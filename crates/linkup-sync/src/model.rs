//! Domain records shared by the stores, the router and the REST contract.
//!
//! Field names follow the backend's camelCase JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Notification discriminator.
///
/// Known kinds get their own variant; anything else round-trips through
/// [`NotificationType::Other`] so new server kinds still render.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    MentorshipApplicationAccepted,
    MentorshipApplicationRejected,
    ConnectionRequestReceived,
    ConnectionRequestAccepted,
    Generic,
    Other(String),
}

impl NotificationType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::MentorshipApplicationAccepted => "MENTORSHIP_APPLICATION_ACCEPTED",
            Self::MentorshipApplicationRejected => "MENTORSHIP_APPLICATION_REJECTED",
            Self::ConnectionRequestReceived => "CONNECTION_REQUEST_RECEIVED",
            Self::ConnectionRequestAccepted => "CONNECTION_REQUEST_ACCEPTED",
            Self::Generic => "GENERIC",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for NotificationType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "MENTORSHIP_APPLICATION_ACCEPTED" => Self::MentorshipApplicationAccepted,
            "MENTORSHIP_APPLICATION_REJECTED" => Self::MentorshipApplicationRejected,
            "CONNECTION_REQUEST_RECEIVED" => Self::ConnectionRequestReceived,
            "CONNECTION_REQUEST_ACCEPTED" => Self::ConnectionRequestAccepted,
            "GENERIC" => Self::Generic,
            _ => Self::Other(raw),
        }
    }
}

impl From<NotificationType> for String {
    fn from(kind: NotificationType) -> String {
        match kind {
            NotificationType::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification addressed to the signed-in member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    /// Id of the record the notification is about (application, request, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

/// Minimal member reference embedded in connection requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl MemberSummary {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            headline: None,
            avatar_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl RequestStatus {
    /// Whether the request has left the active lists for good.
    #[must_use]
    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A connection request between two members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub id: String,
    pub sender: MemberSummary,
    pub receiver: MemberSummary,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Which side of a request the signed-in member is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestDirection {
    Incoming,
    Outgoing,
}

impl RequestDirection {
    pub const ALL: [RequestDirection; 2] = [RequestDirection::Incoming, RequestDirection::Outgoing];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for RequestDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RespondAction {
    /// Receiver accepts.
    Accept,
    /// Receiver declines.
    Decline,
    /// Sender withdraws.
    Cancel,
}

impl RespondAction {
    /// The list the affected request lives in, from the responder's side.
    #[must_use]
    pub fn direction(self) -> RequestDirection {
        match self {
            Self::Accept | Self::Decline => RequestDirection::Incoming,
            Self::Cancel => RequestDirection::Outgoing,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Cancel => "cancel",
        }
    }
}

/// Aggregate counters shown next to the connections UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    pub total_connections: u32,
    pub pending_incoming: u32,
    pub pending_outgoing: u32,
}

/// Relationship between the signed-in member and another member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    PendingOutgoing { request_id: String },
    PendingIncoming { request_id: String },
    NotConnected,
}

impl ConnectionStatus {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}
