//! Optimistic mutation helper.
//!
//! Apply the local patch, run the remote call, and on failure run a
//! reconciliation (a forced resync) instead of undoing the patch. The server
//! value that the resync brings back wins over whatever the patch wrote.

use std::future::Future;
use tracing::warn;

use crate::api::ApiError;
use crate::metrics;

/// Run an optimistic mutation.
///
/// `remote` must be lazy (an `async` block or an un-polled call); it is not
/// polled until `patch` has been applied.
///
/// # Errors
///
/// Returns the remote error after `reconcile` has completed.
pub async fn optimistic<T, Remote, Reconcile, ReconcileFut>(
    operation: &'static str,
    patch: impl FnOnce(),
    remote: Remote,
    reconcile: Reconcile,
) -> Result<T, ApiError>
where
    Remote: Future<Output = Result<T, ApiError>>,
    Reconcile: FnOnce() -> ReconcileFut,
    ReconcileFut: Future<Output = ()>,
{
    patch();

    match remote.await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(operation, error = %e, "Mutation failed, reconciling with server");
            metrics::record_reconcile(operation);
            reconcile().await;
            Err(e)
        }
    }
}
