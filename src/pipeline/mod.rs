//! Provisioning state machine.
//!
//! [`ProvisionPipeline`] resolves identifiers, creates the server, waits for
//! the provider to finish building it, hands off to a downstream stage once
//! and then waits for SSH. The server identifier is recorded in
//! [`ProvisionState`] as soon as the create call returns, so every later
//! failure or interruption can still destroy what was created.

mod error;
mod state;

use std::fmt::Display;
use std::future;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

pub use error::{ProvisionError, StageError};
pub use state::{
    DEFAULT_BUILD_TIMEOUT, ProvisionRequest, ProvisionRequestBuilder, ProvisionState,
    RequestError, Stage,
};

use crate::backend::{BackendFuture, ComputeApi, ServerRequest, ServerStatus};
use crate::poll::{PollOutcome, RetryPoller, TryBudget};
use crate::probe::ReadinessProbe;
use crate::resolve::{SERVER_TYPE_ID, ZONE_ID, normalise_id};
use crate::terminate::{ActionRunner, TerminationHandler};
use crate::transport::{Transport, TransportError};
use crate::ui::SharedUi;

const BUILD_POLL_INTERVAL: Duration = Duration::from_secs(2);
const SSH_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Downstream stage invoked once between build completion and the SSH wait.
pub trait NextStage {
    /// Runs the stage against the current run state.
    fn call<'a>(&'a self, state: &'a ProvisionState) -> BackendFuture<'a, (), StageError>;
}

impl<F> NextStage for F
where
    F: Fn(&ProvisionState) -> Result<(), StageError> + Sync,
{
    fn call<'a>(&'a self, state: &'a ProvisionState) -> BackendFuture<'a, (), StageError> {
        Box::pin(future::ready(self(state)))
    }
}

/// Downstream stage that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopStage;

impl NextStage for NoopStage {
    fn call<'a>(&'a self, _state: &'a ProvisionState) -> BackendFuture<'a, (), StageError> {
        Box::pin(future::ready(Ok(())))
    }
}

/// How a run that did not fail came to an end.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProvisionOutcome {
    /// The server is built and accepts SSH sessions.
    Ready,
    /// The run was interrupted and the server destroyed.
    Aborted,
}

/// Whether a run may have left a server behind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    /// No server exists for this run.
    NotCreated,
    /// The provider still knows the server.
    Created(ServerStatus),
    /// The provider could not be asked; a server may exist.
    Unknown,
}

/// Polling intervals and bounds used by [`ProvisionPipeline`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PipelineSettings {
    /// Delay between build status queries.
    pub build_poll_interval: Duration,
    /// Delay between SSH attempts.
    pub ssh_poll_interval: Duration,
    /// Upper bound on the SSH wait; `None` waits until interrupted.
    pub reachability_timeout: Option<Duration>,
}

const DEFAULT_SETTINGS: PipelineSettings = PipelineSettings {
    build_poll_interval: BUILD_POLL_INTERVAL,
    ssh_poll_interval: SSH_POLL_INTERVAL,
    reachability_timeout: None,
};

impl Default for PipelineSettings {
    fn default() -> Self {
        DEFAULT_SETTINGS
    }
}

/// Drives a single server from request to SSH readiness.
pub struct ProvisionPipeline<C, T, R, N> {
    compute: C,
    transport: T,
    terminator: TerminationHandler<R>,
    next: N,
    ui: SharedUi,
    settings: PipelineSettings,
}

impl<C, T, R, N> ProvisionPipeline<C, T, R, N>
where
    C: ComputeApi + Sync,
    T: Transport + Sync,
    R: ActionRunner,
    N: NextStage,
{
    /// Creates a pipeline with the default polling settings.
    #[must_use]
    pub const fn new(
        compute: C,
        transport: T,
        terminator: TerminationHandler<R>,
        next: N,
        ui: SharedUi,
    ) -> Self {
        Self {
            compute,
            transport,
            terminator,
            next,
            ui,
            settings: DEFAULT_SETTINGS,
        }
    }

    /// Overrides the polling settings.
    ///
    /// This is primarily used by tests to keep polling scenarios fast.
    #[must_use]
    pub const fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Runs the pipeline to completion.
    ///
    /// Returns [`ProvisionOutcome::Aborted`] when the interruption flag in
    /// `state` was observed; the server has been destroyed in that case.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] when any stage fails. The run's stage is
    /// left at [`Stage::Failed`] and `state` still names any server that
    /// was not cleaned up, so callers can pass it to
    /// [`ProvisionPipeline::recover`].
    pub async fn run(
        &self,
        request: &ProvisionRequest,
        state: &mut ProvisionState,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let result = self.drive(request, state).await;
        if let Err(err) = &result {
            debug!(error = %err, stage = ?state.stage(), "provisioning failed");
            state.enter(Stage::Failed);
        }
        result
    }

    /// Cleans up after an error that escaped [`ProvisionPipeline::run`].
    ///
    /// Domain errors are left alone. For anything else the server is
    /// destroyed unless the provider confirms it was never created.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Termination`] when the destroy call fails.
    pub async fn recover(
        &self,
        error: &ProvisionError,
        state: &mut ProvisionState,
    ) -> Result<(), ProvisionError> {
        if error.is_domain_error() {
            debug!(error = %error, "domain error already handled");
            return Ok(());
        }
        if self.lifecycle(state).await == LifecycleState::NotCreated {
            return Ok(());
        }
        self.terminator.terminate(state).await?;
        Ok(())
    }

    /// Asks the provider whether the server recorded in `state` still exists.
    pub async fn lifecycle(&self, state: &ProvisionState) -> LifecycleState {
        let Some(id) = state.instance_id() else {
            return LifecycleState::NotCreated;
        };
        match self.compute.fetch_server(id).await {
            Ok(Some(server)) if !server.status.is_gone() => LifecycleState::Created(server.status),
            Ok(_) => LifecycleState::NotCreated,
            Err(err) => {
                warn!(server = id, error = %err, "could not query server state");
                LifecycleState::Unknown
            }
        }
    }

    async fn drive(
        &self,
        request: &ProvisionRequest,
        state: &mut ProvisionState,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        state.enter(Stage::Resolving);
        let server_request = self.resolve(request).await?;
        if state.is_interrupted() {
            return self.abort(state).await;
        }

        self.announce(request, &server_request);
        state.enter(Stage::Creating);
        let server = self
            .compute
            .create_server(&server_request)
            .await
            .map_err(|err| ProvisionError::ProviderRequest {
                response: err.to_string(),
            })?;
        state.assign_instance(server.id.clone());
        info!(server = %server.id, "server created");
        self.ui
            .info(&format!("Server {} created; waiting for build", server.id));

        if self.await_build(request, &server.id, state).await?.is_none() {
            return self.abort(state).await;
        }

        if state.is_interrupted() {
            return self.abort(state).await;
        }
        state.enter(Stage::Handoff);
        self.next.call(state).await?;

        if self.await_reachable(state).await?.is_none() || state.is_interrupted() {
            return self.abort(state).await;
        }

        state.enter(Stage::Ready);
        debug!(
            server = %server.id,
            build_time = ?state.build_time(),
            ssh_time = ?state.ssh_time(),
            "provisioning timings"
        );
        self.ui.info(&format!("Server {} is ready", server.id));
        Ok(ProvisionOutcome::Ready)
    }

    async fn resolve(&self, request: &ProvisionRequest) -> Result<ServerRequest, ProvisionError> {
        let zone_id = normalise_id(
            || self.compute.list_zones(),
            request.zone.as_deref(),
            ZONE_ID,
        )
        .await
        .map_err(resolution_failed)?;
        let server_type_id = normalise_id(
            || self.compute.list_server_types(),
            request.server_type.as_deref(),
            SERVER_TYPE_ID,
        )
        .await
        .map_err(resolution_failed)?;

        Ok(ServerRequest {
            image_id: request.image_id.clone(),
            name: request.name.clone(),
            server_type_id,
            zone_id,
            server_groups: request.server_groups.clone(),
            user_data: request.user_data.clone(),
        })
    }

    fn announce(&self, request: &ProvisionRequest, resolved: &ServerRequest) {
        self.ui.info("Launching a server with the following settings...");
        if request.user_data.is_some() {
            self.ui.info(" -- User Data: supplied");
        }
        if let Some(server_type) = &request.server_type {
            self.ui.info(&format!(" -- Type: {server_type}"));
        }
        self.ui.info(&format!(" -- Image: {}", request.image_id));
        if let Some(region) = &request.region {
            self.ui.info(&format!(" -- Region: {region}"));
        }
        self.ui.info(&format!(" -- Name: {}", request.name));
        if let Some(zone) = &request.zone {
            self.ui.info(&format!(" -- Zone: {zone}"));
        }
        if !request.server_groups.is_empty() {
            self.ui
                .info(&format!(" -- Server Groups: {}", request.server_groups.join(",")));
        }
        debug!(
            zone_id = ?resolved.zone_id,
            server_type_id = ?resolved.server_type_id,
            "resolved identifiers"
        );
    }

    /// Waits for the build; `None` means the wait was interrupted.
    async fn await_build(
        &self,
        request: &ProvisionRequest,
        id: &str,
        state: &mut ProvisionState,
    ) -> Result<Option<()>, ProvisionError> {
        state.enter(Stage::AwaitingBuild);
        let interval = self.settings.build_poll_interval;
        let budget = TryBudget::from_timeout(request.build_timeout, interval);
        let readiness = ReadinessProbe::new(&self.compute, &self.transport);
        let probe = &readiness;
        let interrupt = state.interrupt().clone();
        let started = Instant::now();

        let outcome = RetryPoller::new(interval)
            .poll_until(move || probe.build_complete(id), budget, &interrupt)
            .await
            .map_err(|err| ProvisionError::Status {
                message: err.to_string(),
            })?;

        match outcome {
            PollOutcome::Succeeded(server) => {
                let elapsed = started.elapsed();
                info!(server = id, build_time = ?elapsed, "build complete");
                self.ui.info(&format!(
                    "Server {id} built in {:.1}s",
                    elapsed.as_secs_f32()
                ));
                state.record_build(elapsed, server.public_host);
                Ok(Some(()))
            }
            PollOutcome::Cancelled => Ok(None),
            PollOutcome::TimedOut => {
                self.ui.warn(&format!(
                    "Server {id} did not build within {}s; destroying it",
                    request.build_timeout.as_secs()
                ));
                self.terminate_noting_failure(state).await;
                Err(ProvisionError::BuildTimeout {
                    timeout: request.build_timeout,
                })
            }
        }
    }

    /// Waits for SSH; `None` means the wait was interrupted.
    ///
    /// The server is re-read on every try, so an address mapped by the
    /// handoff stage is probed instead of the one seen at build time.
    async fn await_reachable(
        &self,
        state: &mut ProvisionState,
    ) -> Result<Option<()>, ProvisionError> {
        state.enter(Stage::AwaitingReachable);
        let id = state.instance_id().map(str::to_owned).unwrap_or_default();
        self.ui.info(&format!("Waiting for SSH on server {id}..."));

        let interval = self.settings.ssh_poll_interval;
        let budget = self
            .settings
            .reachability_timeout
            .map_or(TryBudget::Unlimited, |timeout| {
                TryBudget::from_timeout(timeout, interval)
            });
        let readiness = ReadinessProbe::new(&self.compute, &self.transport);
        let probe = &readiness;
        let target = id.as_str();
        let interrupt = state.interrupt().clone();
        let started = Instant::now();

        let outcome = RetryPoller::new(interval)
            .poll_until(move || self.ssh_attempt(probe, target), budget, &interrupt)
            .await?;

        match outcome {
            PollOutcome::Succeeded(host) => {
                let elapsed = started.elapsed();
                info!(server = %id, host = %host, ssh_time = ?elapsed, "SSH ready");
                state.record_ssh(elapsed, host);
                Ok(Some(()))
            }
            PollOutcome::Cancelled => Ok(None),
            PollOutcome::TimedOut => {
                let timeout = self.settings.reachability_timeout.unwrap_or_default();
                self.ui.warn(&format!(
                    "SSH on server {id} did not come up within {}s; destroying it",
                    timeout.as_secs()
                ));
                self.terminate_noting_failure(state).await;
                Err(ProvisionError::ReachabilityTimeout { timeout })
            }
        }
    }

    /// One reachability try. Yields the host that accepted the session.
    async fn ssh_attempt(
        &self,
        probe: &ReadinessProbe<'_, C, T>,
        id: &str,
    ) -> Result<Option<String>, ProvisionError> {
        let snapshot = match self.compute.fetch_server(id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(server = id, error = %err, "could not re-read server address");
                return Ok(None);
            }
        };
        let Some(server) = snapshot.filter(|server| !server.status.is_gone()) else {
            return Err(ProvisionError::Vanished { id: id.to_owned() });
        };
        let Some(host) = server.public_host else {
            debug!(server = id, "no public address yet");
            return Ok(None);
        };
        let ready = probe.reachable(&host).await.map_err(reachability_failed)?;
        Ok(ready.then_some(host))
    }

    async fn abort(&self, state: &mut ProvisionState) -> Result<ProvisionOutcome, ProvisionError> {
        state.enter(Stage::Aborted);
        self.ui.warn("Interrupted; cleaning up");
        self.terminator.terminate(state).await?;
        Ok(ProvisionOutcome::Aborted)
    }

    async fn terminate_noting_failure(&self, state: &mut ProvisionState) {
        if let Err(err) = self.terminator.terminate(state).await {
            warn!(error = %err, "cleanup after timeout failed");
            self.ui.warn(&format!("cleanup failed: {err}"));
        }
    }
}

fn resolution_failed(err: impl Display) -> ProvisionError {
    ProvisionError::Resolution {
        message: err.to_string(),
    }
}

fn reachability_failed(err: TransportError) -> ProvisionError {
    match err {
        TransportError::AuthenticationFailed { user, host, .. } => {
            ProvisionError::AuthenticationFailed { user, host }
        }
        other => ProvisionError::Probe {
            message: other.to_string(),
        },
    }
}
