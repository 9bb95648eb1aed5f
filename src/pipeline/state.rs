//! Request and per-run state for the provisioning pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::poll::Interrupt;

/// Default build timeout applied when none is configured.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(120);

/// Everything needed to create one server. Immutable once a run starts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionRequest {
    /// Image identifier to boot from.
    pub image_id: String,
    /// Desired server name.
    pub name: String,
    /// Zone handle or canonical identifier.
    pub zone: Option<String>,
    /// Server type handle or canonical identifier.
    pub server_type: Option<String>,
    /// Server group identifiers; may be empty.
    pub server_groups: Vec<String>,
    /// Opaque user-data blob; may be compressed or otherwise binary.
    pub user_data: Option<Vec<u8>>,
    /// Region label shown in the launch summary.
    pub region: Option<String>,
    /// How long the provider may take to finish the build.
    pub build_timeout: Duration,
}

/// Raised when a [`ProvisionRequest`] is missing a required value.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// A required string field is empty.
    #[error("missing or empty field: {0}")]
    Missing(&'static str),
    /// The build timeout is zero.
    #[error("build timeout must be greater than zero")]
    ZeroTimeout,
}

impl ProvisionRequest {
    /// Starts a builder for a [`ProvisionRequest`].
    #[must_use]
    pub fn builder() -> ProvisionRequestBuilder {
        ProvisionRequestBuilder::default()
    }
}

/// Builder for [`ProvisionRequest`] that trims and validates on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProvisionRequestBuilder {
    image_id: String,
    name: String,
    zone: Option<String>,
    server_type: Option<String>,
    server_groups: Vec<String>,
    user_data: Option<Vec<u8>>,
    region: Option<String>,
    build_timeout: Option<Duration>,
}

impl ProvisionRequestBuilder {
    /// Sets the image identifier.
    #[must_use]
    pub fn image_id(mut self, value: impl Into<String>) -> Self {
        self.image_id = value.into();
        self
    }

    /// Sets the server name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the zone handle or identifier.
    #[must_use]
    pub fn zone(mut self, value: Option<String>) -> Self {
        self.zone = value;
        self
    }

    /// Sets the server type handle or identifier.
    #[must_use]
    pub fn server_type(mut self, value: Option<String>) -> Self {
        self.server_type = value;
        self
    }

    /// Sets the server groups.
    #[must_use]
    pub fn server_groups(mut self, value: Vec<String>) -> Self {
        self.server_groups = value;
        self
    }

    /// Sets the user-data blob.
    #[must_use]
    pub fn user_data(mut self, value: Option<Vec<u8>>) -> Self {
        self.user_data = value;
        self
    }

    /// Sets the region label.
    #[must_use]
    pub fn region(mut self, value: Option<String>) -> Self {
        self.region = value;
        self
    }

    /// Sets the build timeout.
    #[must_use]
    pub const fn build_timeout(mut self, value: Duration) -> Self {
        self.build_timeout = Some(value);
        self
    }

    /// Builds the request. Blank optional values are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError`] when the image or name is empty or the build
    /// timeout is zero.
    pub fn build(self) -> Result<ProvisionRequest, RequestError> {
        let request = ProvisionRequest {
            image_id: self.image_id.trim().to_owned(),
            name: self.name.trim().to_owned(),
            zone: non_blank(self.zone),
            server_type: non_blank(self.server_type),
            server_groups: self
                .server_groups
                .into_iter()
                .map(|group| group.trim().to_owned())
                .filter(|group| !group.is_empty())
                .collect(),
            user_data: self.user_data,
            region: non_blank(self.region),
            build_timeout: self.build_timeout.unwrap_or(DEFAULT_BUILD_TIMEOUT),
        };
        if request.image_id.is_empty() {
            return Err(RequestError::Missing("image_id"));
        }
        if request.name.is_empty() {
            return Err(RequestError::Missing("name"));
        }
        if request.build_timeout.is_zero() {
            return Err(RequestError::ZeroTimeout);
        }
        Ok(request)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

/// Position of a run in the provisioning state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Nothing has happened yet.
    Init,
    /// Zone and server type are being resolved.
    Resolving,
    /// The create call is in flight.
    Creating,
    /// Waiting for the provider to finish the build.
    AwaitingBuild,
    /// The downstream stage is running.
    Handoff,
    /// Waiting for SSH to accept sessions.
    AwaitingReachable,
    /// The server is usable.
    Ready,
    /// The run was interrupted and cleaned up.
    Aborted,
    /// The run failed.
    Failed,
}

/// Mutable record of one provisioning run.
///
/// The instance identifier is set as soon as the create call returns and is
/// only cleared by a successful termination, so it always names the server
/// that may need cleaning up.
#[derive(Clone, Debug)]
pub struct ProvisionState {
    instance_id: Option<String>,
    public_host: Option<String>,
    interrupt: Interrupt,
    stage: Stage,
    build_time: Option<Duration>,
    ssh_time: Option<Duration>,
    terminated: bool,
}

impl ProvisionState {
    /// Creates state for a fresh run observing `interrupt`.
    #[must_use]
    pub const fn new(interrupt: Interrupt) -> Self {
        Self {
            instance_id: None,
            public_host: None,
            interrupt,
            stage: Stage::Init,
            build_time: None,
            ssh_time: None,
            terminated: false,
        }
    }

    /// Creates state for an existing server, for example to destroy it.
    #[must_use]
    pub fn for_instance(id: impl Into<String>, interrupt: Interrupt) -> Self {
        Self {
            instance_id: Some(id.into()),
            ..Self::new(interrupt)
        }
    }

    /// Server created by this run, if any.
    #[must_use]
    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    /// Public address last reported for the server: the build-time address
    /// until SSH answers, then the address that accepted the session.
    #[must_use]
    pub fn public_host(&self) -> Option<&str> {
        self.public_host.as_deref()
    }

    /// Interruption flag observed by the run.
    #[must_use]
    pub const fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_set()
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Time the provider took to build the server.
    #[must_use]
    pub const fn build_time(&self) -> Option<Duration> {
        self.build_time
    }

    /// Time spent waiting for SSH after the build.
    #[must_use]
    pub const fn ssh_time(&self) -> Option<Duration> {
        self.ssh_time
    }

    /// Returns `true` once the server has been destroyed by this run.
    #[must_use]
    pub const fn terminated(&self) -> bool {
        self.terminated
    }

    pub(crate) const fn enter(&mut self, stage: Stage) {
        self.stage = stage;
    }

    pub(crate) fn assign_instance(&mut self, id: String) {
        self.instance_id = Some(id);
    }

    pub(crate) fn record_build(&mut self, elapsed: Duration, public_host: Option<String>) {
        self.build_time = Some(elapsed);
        self.public_host = public_host;
    }

    pub(crate) fn record_ssh(&mut self, elapsed: Duration, host: String) {
        self.ssh_time = Some(elapsed);
        self.public_host = Some(host);
    }

    pub(crate) fn mark_terminated(&mut self) {
        self.instance_id = None;
        self.terminated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_trims_and_drops_blank_values() {
        let request = ProvisionRequest::builder()
            .image_id(" img-aaaaa ")
            .name("web")
            .zone(Some(String::from("  ")))
            .server_type(Some(String::from(" nano ")))
            .server_groups(vec![String::from("grp-aaaaa"), String::new()])
            .build()
            .unwrap_or_else(|err| panic!("request should build: {err}"));

        assert_eq!(request.image_id, "img-aaaaa");
        assert_eq!(request.zone, None);
        assert_eq!(request.server_type.as_deref(), Some("nano"));
        assert_eq!(request.server_groups, vec![String::from("grp-aaaaa")]);
        assert_eq!(request.build_timeout, DEFAULT_BUILD_TIMEOUT);
    }

    #[test]
    fn builder_rejects_missing_image() {
        let err = ProvisionRequest::builder()
            .name("web")
            .build()
            .expect_err("image is required");
        assert_eq!(err, RequestError::Missing("image_id"));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = ProvisionRequest::builder()
            .image_id("img-aaaaa")
            .name("web")
            .build_timeout(Duration::ZERO)
            .build()
            .expect_err("zero timeout");
        assert_eq!(err, RequestError::ZeroTimeout);
    }

    #[test]
    fn termination_clears_the_instance_id() {
        let mut state = ProvisionState::for_instance("srv-aaaaa", Interrupt::new());
        assert_eq!(state.instance_id(), Some("srv-aaaaa"));
        state.mark_terminated();
        assert_eq!(state.instance_id(), None);
        assert!(state.terminated());
    }
}
