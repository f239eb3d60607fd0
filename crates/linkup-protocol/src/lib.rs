//! # linkup-protocol
//!
//! Frame envelope spoken over the Linkup realtime event transport.
//!
//! The sync layer treats the transport as an existing pub/sub event bus. This
//! crate pins down the envelope it exchanges with that bus so the transport
//! crate has something concrete to read and write.
//!
//! ## Frame Types
//!
//! - `Handshake` / `Welcome` - Credential exchange and socket assignment
//! - `Event` - Named event with a JSON payload, in either direction
//! - `Ack` / `Error` - Replies to events that asked for acknowledgment
//! - `Ping` / `Pong` - Keepalive
//! - `Disconnect` - Either side closing, with a reason
//!
//! ## Example
//!
//! ```rust
//! use linkup_protocol::{codec, Frame};
//! use serde_json::json;
//!
//! let frame = Frame::event("notification:new", json!({ "id": "n-1" }));
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{DisconnectReason, Frame, FrameType, PROTOCOL_VERSION};
