//! Errors for operations on the shared connection.

use linkup_transport::TransportError;
use thiserror::Error;

use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The handle exists but its session is not currently up.
    #[error("realtime connection is not connected")]
    NotConnected,

    /// The connection behind the handle was torn down or replaced.
    #[error("realtime connection was released")]
    Released,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Api(#[from] ApiError),
}
