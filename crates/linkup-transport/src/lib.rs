//! # linkup-transport
//!
//! Client-side transport abstraction for Linkup realtime sync.
//!
//! - **WebSocket** - Connects to the event bus over `ws://` / `wss://`
//! - **Memory** - In-process loopback, driven from the "server" side by tests
//!   and embedders
//!
//! ## Transport Abstraction
//!
//! A [`Connector`] opens one [`Connection`] for a [`Credential`]. The sync
//! layer never talks to a socket directly, so it works the same over either.
//!
//! ```rust,ignore
//! use linkup_transport::{Connector, Credential};
//!
//! async fn run(connector: &dyn Connector) {
//!     let mut conn = connector.connect(&Credential::new("token")).await.unwrap();
//!     while let Ok(Some(frame)) = conn.recv().await {
//!         // Process frame
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryConnector, MemorySession};
pub use traits::{Connection, ConnectionId, Connector, Credential, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnector};
