//! Error types for the provisioning pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::terminate::TerminateError;

/// Raised by the downstream stage invoked between build and reachability.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{0}")]
pub struct StageError(pub String);

/// Errors surfaced by [`crate::pipeline::ProvisionPipeline`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// The provider rejected the create call; `response` is reported verbatim.
    #[error("server creation failed: {response}")]
    ProviderRequest {
        /// Raw provider response.
        response: String,
    },
    /// The build did not finish within the configured timeout.
    #[error("server did not finish building within {}s", timeout.as_secs())]
    BuildTimeout {
        /// Configured build timeout.
        timeout: Duration,
    },
    /// SSH rejected the configured credentials.
    #[error(
        "SSH authentication failed for {user}@{host}; check BOXLIFT_SSH_SSH_USER and \
         BOXLIFT_SSH_SSH_IDENTITY_FILE"
    )]
    AuthenticationFailed {
        /// Remote user.
        user: String,
        /// Host that rejected the session.
        host: String,
    },
    /// SSH did not come up within the configured reachability bound.
    #[error("server was not reachable over SSH within {}s", timeout.as_secs())]
    ReachabilityTimeout {
        /// Configured reachability bound.
        timeout: Duration,
    },
    /// Querying the server's build status failed.
    #[error("server status check failed: {message}")]
    Status {
        /// Provider or validation error message.
        message: String,
    },
    /// The server was deleted behind the run's back while waiting for SSH.
    #[error("server {id} disappeared while waiting for SSH")]
    Vanished {
        /// Identifier of the missing server.
        id: String,
    },
    /// Listing zones or server types failed.
    #[error("identifier resolution failed: {message}")]
    Resolution {
        /// Provider error message.
        message: String,
    },
    /// The SSH probe failed in a way retrying cannot fix.
    #[error("SSH probe failed: {message}")]
    Probe {
        /// Transport error message.
        message: String,
    },
    /// The downstream stage failed.
    #[error("handoff stage failed: {0}")]
    Handoff(#[from] StageError),
    /// Destroying the server failed.
    #[error(transparent)]
    Termination(#[from] TerminateError),
}

impl ProvisionError {
    /// Returns `true` for errors the pipeline already handled itself.
    ///
    /// The recovery hook leaves these alone; any other error may have left a
    /// server behind.
    #[must_use]
    pub const fn is_domain_error(&self) -> bool {
        matches!(
            self,
            Self::ProviderRequest { .. }
                | Self::BuildTimeout { .. }
                | Self::AuthenticationFailed { .. }
                | Self::ReachabilityTimeout { .. }
        )
    }
}
