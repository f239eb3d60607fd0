//! REST collaborator contracts.
//!
//! The HTTP client lives elsewhere; the stores only see these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    ConnectionRequest, ConnectionStatus, Notification, RequestDirection, RequestStats,
    RespondAction,
};

/// Errors surfaced by a REST collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The session credential was refused.
    #[error("unauthorized")]
    Unauthorized,

    /// The response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Returns `true` for errors worth retrying on the next trigger.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Unauthorized | Self::Decode(_) => false,
        }
    }
}

/// One page of the notification list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: u32,
    pub unread_count: u32,
}

/// Requests for one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPage {
    pub requests: Vec<ConnectionRequest>,
    pub total: u32,
}

/// Notification endpoints.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Unread-count lookup.
    async fn unread_count(&self) -> Result<u32, ApiError>;

    /// Paginated list, newest first. `page` starts at 1.
    async fn list(&self, page: u32, limit: u32) -> Result<NotificationPage, ApiError>;

    /// Mark one notification read.
    async fn mark_read(&self, id: &str) -> Result<(), ApiError>;

    /// Mark every notification read.
    async fn mark_all_read(&self) -> Result<(), ApiError>;
}

/// Connection request endpoints.
#[async_trait]
pub trait ConnectionApi: Send + Sync {
    /// Pending requests in one direction.
    async fn list_requests(&self, direction: RequestDirection) -> Result<RequestPage, ApiError>;

    /// Aggregate counters.
    async fn stats(&self) -> Result<RequestStats, ApiError>;

    /// Send a request to `receiver_id`.
    async fn send_request(
        &self,
        receiver_id: &str,
        message: Option<&str>,
    ) -> Result<ConnectionRequest, ApiError>;

    /// Accept, decline or cancel a request.
    async fn respond(
        &self,
        request_id: &str,
        action: RespondAction,
    ) -> Result<ConnectionRequest, ApiError>;

    /// Remove an established connection.
    async fn remove_connection(&self, connection_id: &str) -> Result<(), ApiError>;

    /// Relationship with `user_id`.
    async fn connection_status(&self, user_id: &str) -> Result<ConnectionStatus, ApiError>;
}
