//! Readiness predicates polled while a server comes up.
//!
//! Each check performs exactly one unit of work and reports "not yet" as
//! `None`/`false`; retrying is left to [`crate::poll::RetryPoller`].

use tracing::{debug, info};

use crate::backend::{ComputeApi, ServerSnapshot};
use crate::transport::{Transport, TransportError, TransportErrorKind};

/// Build and reachability checks for a single server.
pub struct ReadinessProbe<'a, C, T> {
    compute: &'a C,
    transport: &'a T,
}

impl<'a, C, T> ReadinessProbe<'a, C, T>
where
    C: ComputeApi,
    T: Transport,
{
    /// Creates a probe over the given collaborators.
    #[must_use]
    pub const fn new(compute: &'a C, transport: &'a T) -> Self {
        Self { compute, transport }
    }

    /// Queries the provider once and returns the server snapshot when the
    /// build has finished.
    ///
    /// # Errors
    ///
    /// Propagates provider errors from the status query.
    pub async fn build_complete(&self, id: &str) -> Result<Option<ServerSnapshot>, C::Error> {
        let snapshot = self.compute.fetch_server(id).await?;
        Ok(snapshot.filter(|server| {
            debug!(server = %server.id, status = ?server.status, "build status");
            server.status.is_built()
        }))
    }

    /// Attempts one SSH session to `host`.
    ///
    /// Returns `Ok(true)` once a session opens and `Ok(false)` for any
    /// failure that may clear up on a later attempt, including a local
    /// `ssh` client that could not be started.
    ///
    /// # Errors
    ///
    /// Authentication failures are returned immediately so a broken
    /// credential aborts the wait.
    pub async fn reachable(&self, host: &str) -> Result<bool, TransportError> {
        debug!(host, "checking if SSH is ready or permanently broken");
        match self.transport.connect(host).await {
            Ok(()) => {
                info!(host, "SSH is ready");
                Ok(true)
            }
            Err(err) if err.kind() == TransportErrorKind::Authentication => Err(err),
            Err(err) => {
                debug!(host, error = %err, "SSH not up");
                Ok(false)
            }
        }
    }
}
