//! # linkup-sync
//!
//! Realtime synchronization layer for the Linkup member network.
//!
//! - **ConnectionManager** - The one shared realtime connection per credential
//! - **EventRouter** - Typed dispatch of server-pushed events to handler tables
//! - **NotificationStore** - Notification list and unread counter
//! - **RequestStore** - Connection requests and their stats
//! - **Throttle** - Per-key fetch windows shared by both stores
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐  events  ┌─────────────┐  invalidate  ┌───────────────────┐
//! │ ConnectionManager │─────────▶│ EventRouter │─────────────▶│ Notification /    │
//! └───────────────────┘          └─────────────┘              │ Request stores    │
//!           ▲                           │ alerts              └───────────────────┘
//!           │ emit                      ▼                         │ REST    ▲ snapshots
//!      ConnectionHandle            AlertSink                      ▼         │
//!                                                            NotificationApi / ConnectionApi
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use linkup_sync::{default_table, ConnectionManager, EventRouter, ReconnectPolicy};
//! use linkup_transport::{Credential, WebSocketConnector};
//!
//! let manager = ConnectionManager::new(Arc::new(WebSocketConnector::with_url(url)), ReconnectPolicy::default());
//! let handle = manager.acquire(Credential::new(token)).await;
//! let router = EventRouter::new();
//! router.bind(&handle, default_table(alerts, notifications, requests, Some(roster)))?;
//! ```

pub mod alert;
pub mod api;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod metrics;
pub mod model;
pub mod notifications;
pub mod optimistic;
pub mod requests;
pub mod roster;
pub mod router;
pub mod throttle;

pub use alert::{Alert, AlertLevel, AlertSink, NullAlerts, RecordingAlerts, TracingAlerts};
pub use api::{ApiError, ConnectionApi, NotificationApi, NotificationPage, RequestPage};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SyncConfig};
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionState, ReconnectPolicy};
pub use error::SyncError;
pub use event::{EventKind, RealtimeEvent};
pub use model::{
    ConnectionRequest, ConnectionStatus, MemberSummary, Notification, NotificationType,
    RequestDirection, RequestStats, RequestStatus, RespondAction,
};
pub use notifications::{NotificationListState, NotificationStore};
pub use requests::{RequestListState, RequestStore};
pub use roster::OnlineRoster;
pub use router::{default_table, BindingId, EventRouter, HandlerTable, Invalidate};
pub use throttle::{FetchOutcome, ThrottleWindow};
