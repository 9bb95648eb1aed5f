//! Compute API abstraction for provisioning a single server.
//!
//! The provisioning pipeline only talks to the provider through
//! [`ComputeApi`], so tests can substitute scripted doubles and the Brightbox
//! client stays an implementation detail.

use std::future::Future;
use std::pin::Pin;

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Entry in a provider collection such as zones or server types.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NamedResource {
    /// Canonical provider identifier (for example `zon-abc12`).
    pub id: String,
    /// Human-readable handle (for example `gb1-a`).
    pub handle: String,
}

impl NamedResource {
    /// Creates a collection entry.
    #[must_use]
    pub fn new(id: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
        }
    }
}

/// Parameters sent to the provider's create call once identifiers have been
/// resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerRequest {
    /// Image identifier to boot from.
    pub image_id: String,
    /// Server name shown in the provider console.
    pub name: String,
    /// Resolved server type identifier, when one was requested.
    pub server_type_id: Option<String>,
    /// Resolved zone identifier, when one was requested.
    pub zone_id: Option<String>,
    /// Server group identifiers. An empty list means the field is omitted.
    pub server_groups: Vec<String>,
    /// Opaque user-data blob passed to the instance on first boot.
    pub user_data: Option<Vec<u8>>,
}

/// Provider-reported lifecycle status of a server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerStatus {
    /// Infrastructure is still being allocated.
    Creating,
    /// Build finished; the server is running.
    Active,
    /// Server exists but is powered off.
    Inactive,
    /// Deletion has been requested.
    Deleting,
    /// Server no longer exists.
    Deleted,
    /// Provider gave up building the server.
    Failed,
    /// Status string this crate does not recognise.
    Unknown,
}

impl ServerStatus {
    /// Maps a provider status string onto [`ServerStatus`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "creating" => Self::Creating,
            "active" => Self::Active,
            "inactive" => Self::Inactive,
            "deleting" => Self::Deleting,
            "deleted" => Self::Deleted,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Returns `true` once the provider reports the build has finished.
    #[must_use]
    pub const fn is_built(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` when the server is gone or on its way out.
    #[must_use]
    pub const fn is_gone(self) -> bool {
        matches!(self, Self::Deleting | Self::Deleted)
    }
}

/// Point-in-time view of a server as reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerSnapshot {
    /// Provider identifier (for example `srv-abc12`).
    pub id: String,
    /// Current lifecycle status.
    pub status: ServerStatus,
    /// Hostname or address used to reach the server over SSH.
    pub public_host: Option<String>,
}

/// Minimal interface implemented by compute providers.
pub trait ComputeApi {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Issues the create call and returns the freshly allocated server.
    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> BackendFuture<'a, ServerSnapshot, Self::Error>;

    /// Fetches the current state of a server, or `None` when it is unknown
    /// to the provider.
    fn fetch_server<'a>(
        &'a self,
        id: &'a str,
    ) -> BackendFuture<'a, Option<ServerSnapshot>, Self::Error>;

    /// Lists the zones available to the account.
    fn list_zones(&self) -> BackendFuture<'_, Vec<NamedResource>, Self::Error>;

    /// Lists the server types (flavours) available to the account.
    fn list_server_types(&self) -> BackendFuture<'_, Vec<NamedResource>, Self::Error>;

    /// Requests deletion of a server.
    fn destroy_server<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error>;
}
