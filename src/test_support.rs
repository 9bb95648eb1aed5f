//! Test support utilities shared across unit and integration tests.
//!
//! The doubles here are cheap to clone; clones share their script and
//! recorded calls, so a test can keep one handle for assertions while the
//! code under test owns another.

use std::collections::{BTreeMap, VecDeque};
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::backend::{
    BackendFuture, ComputeApi, NamedResource, ServerRequest, ServerSnapshot, ServerStatus,
};
use crate::pipeline::{NextStage, ProvisionState, StageError};
use crate::poll::Interrupt;
use crate::transport::{CommandOutput, CommandRunner, Transport, TransportError};
use crate::ui::Ui;

/// Host reported for scripted servers unless told otherwise.
pub const SCRIPTED_HOST: &str = "203.0.113.10";

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len().saturating_add(1));
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        locked(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        locked(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError> {
        locked(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        locked(&self.responses)
            .pop_front()
            .ok_or_else(|| TransportError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Error returned by [`ScriptedCompute`] when a call is scripted to fail.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{0}")]
pub struct ScriptedError(pub String);

#[derive(Debug)]
struct ScriptedServer {
    status: ServerStatus,
    building_polls: u32,
}

#[derive(Debug, Default)]
struct ComputeScript {
    servers: BTreeMap<String, ScriptedServer>,
    next_id: u32,
    building_polls: u32,
    no_public_host: bool,
    mapped_host: Option<String>,
    zones: Vec<NamedResource>,
    server_types: Vec<NamedResource>,
    create_failure: Option<String>,
    fetch_failure: Option<String>,
    destroy_failure: bool,
    interrupt_on_fetch: Option<Interrupt>,
    created: Vec<ServerRequest>,
    destroyed: Vec<String>,
    status_queries: usize,
    zone_fetches: usize,
    server_type_fetches: usize,
}

impl ComputeScript {
    fn snapshot(&self, id: &str, status: ServerStatus) -> ServerSnapshot {
        ServerSnapshot {
            id: id.to_owned(),
            status,
            public_host: self
                .mapped_host
                .clone()
                .or_else(|| (!self.no_public_host).then(|| String::from(SCRIPTED_HOST))),
        }
    }

    fn insert(&mut self, id: &str) {
        self.servers.insert(
            id.to_owned(),
            ScriptedServer {
                status: ServerStatus::Creating,
                building_polls: self.building_polls,
            },
        );
    }
}

/// In-memory [`ComputeApi`] whose servers finish building after a scripted
/// number of status queries.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCompute {
    script: Arc<Mutex<ComputeScript>>,
}

impl ScriptedCompute {
    /// Creates a backend whose servers are built on the first status query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps servers in the `creating` state for `polls` status queries.
    #[must_use]
    pub fn building_for(self, polls: u32) -> Self {
        locked(&self.script).building_polls = polls;
        self
    }

    /// Reports built servers without a public address.
    #[must_use]
    pub fn without_public_host(self) -> Self {
        locked(&self.script).no_public_host = true;
        self
    }

    /// Sets the zones returned by `list_zones`.
    #[must_use]
    pub fn with_zones(self, zones: Vec<NamedResource>) -> Self {
        locked(&self.script).zones = zones;
        self
    }

    /// Sets the server types returned by `list_server_types`.
    #[must_use]
    pub fn with_server_types(self, server_types: Vec<NamedResource>) -> Self {
        locked(&self.script).server_types = server_types;
        self
    }

    /// Sets `interrupt` the first time a server's status is queried.
    #[must_use]
    pub fn interrupting_on_fetch(self, interrupt: Interrupt) -> Self {
        locked(&self.script).interrupt_on_fetch = Some(interrupt);
        self
    }

    /// Reports `host` as the public address of every server from now on,
    /// as if a cloud IP had just been mapped.
    pub fn map_public_host(&self, host: impl Into<String>) {
        locked(&self.script).mapped_host = Some(host.into());
    }

    /// Drops a server from the provider as if it were deleted elsewhere.
    pub fn forget_server(&self, id: &str) {
        locked(&self.script).servers.remove(id);
    }

    /// Registers an existing server and returns its identifier.
    pub fn preload_server(&self, id: &str) -> String {
        locked(&self.script).insert(id);
        id.to_owned()
    }

    /// Makes the next create call fail with `response`.
    pub fn fail_create(&self, response: impl Into<String>) {
        locked(&self.script).create_failure = Some(response.into());
    }

    /// Makes every status query fail with `message`.
    pub fn fail_fetch(&self, message: impl Into<String>) {
        locked(&self.script).fetch_failure = Some(message.into());
    }

    /// Makes every delete call fail.
    pub fn fail_destroy(&self) {
        locked(&self.script).destroy_failure = true;
    }

    /// Requests passed to successful create calls.
    #[must_use]
    pub fn created(&self) -> Vec<ServerRequest> {
        locked(&self.script).created.clone()
    }

    /// Identifiers passed to successful delete calls.
    #[must_use]
    pub fn destroyed(&self) -> Vec<String> {
        locked(&self.script).destroyed.clone()
    }

    /// Number of status queries made so far.
    #[must_use]
    pub fn status_queries(&self) -> usize {
        locked(&self.script).status_queries
    }

    /// Number of times the zone collection was fetched.
    #[must_use]
    pub fn zone_fetches(&self) -> usize {
        locked(&self.script).zone_fetches
    }

    /// Number of times the server type collection was fetched.
    #[must_use]
    pub fn server_type_fetches(&self) -> usize {
        locked(&self.script).server_type_fetches
    }

    fn create(&self, request: &ServerRequest) -> Result<ServerSnapshot, ScriptedError> {
        let mut script = locked(&self.script);
        if let Some(response) = script.create_failure.take() {
            return Err(ScriptedError(response));
        }
        script.next_id = script.next_id.saturating_add(1);
        let id = format!("srv-{:05}", script.next_id);
        script.insert(&id);
        script.created.push(request.clone());
        Ok(script.snapshot(&id, ServerStatus::Creating))
    }

    fn fetch(&self, id: &str) -> Result<Option<ServerSnapshot>, ScriptedError> {
        let mut script = locked(&self.script);
        script.status_queries = script.status_queries.saturating_add(1);
        if let Some(interrupt) = script.interrupt_on_fetch.take() {
            interrupt.trigger();
        }
        if let Some(message) = &script.fetch_failure {
            return Err(ScriptedError(message.clone()));
        }
        let Some(server) = script.servers.get_mut(id) else {
            return Ok(None);
        };
        if server.status == ServerStatus::Creating {
            if server.building_polls == 0 {
                server.status = ServerStatus::Active;
            } else {
                server.building_polls = server.building_polls.saturating_sub(1);
            }
        }
        let status = server.status;
        Ok(Some(script.snapshot(id, status)))
    }

    fn destroy(&self, id: &str) -> Result<(), ScriptedError> {
        let mut script = locked(&self.script);
        if script.destroy_failure {
            return Err(ScriptedError(format!("delete of {id} rejected")));
        }
        if let Some(server) = script.servers.get_mut(id) {
            server.status = ServerStatus::Deleted;
        }
        script.destroyed.push(id.to_owned());
        Ok(())
    }
}

impl ComputeApi for ScriptedCompute {
    type Error = ScriptedError;

    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> BackendFuture<'a, ServerSnapshot, Self::Error> {
        Box::pin(async move { self.create(request) })
    }

    fn fetch_server<'a>(
        &'a self,
        id: &'a str,
    ) -> BackendFuture<'a, Option<ServerSnapshot>, Self::Error> {
        Box::pin(async move { self.fetch(id) })
    }

    fn list_zones(&self) -> BackendFuture<'_, Vec<NamedResource>, Self::Error> {
        Box::pin(async move {
            let mut script = locked(&self.script);
            script.zone_fetches = script.zone_fetches.saturating_add(1);
            Ok(script.zones.clone())
        })
    }

    fn list_server_types(&self) -> BackendFuture<'_, Vec<NamedResource>, Self::Error> {
        Box::pin(async move {
            let mut script = locked(&self.script);
            script.server_type_fetches = script.server_type_fetches.saturating_add(1);
            Ok(script.server_types.clone())
        })
    }

    fn destroy_server<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move { self.destroy(id) })
    }
}

#[derive(Debug, Default)]
struct TransportScript {
    results: VecDeque<Result<(), TransportError>>,
    attempts: usize,
    hosts: Vec<String>,
    interrupt_on_connect: Option<Interrupt>,
}

/// [`Transport`] double that replays queued results and then succeeds.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<TransportScript>>,
}

impl ScriptedTransport {
    /// Creates a transport that accepts every session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next connection attempt.
    pub fn push_result(&self, result: Result<(), TransportError>) {
        locked(&self.script).results.push_back(result);
    }

    /// Queues `count` connection-refused failures.
    pub fn push_unreachable(&self, count: usize) {
        for _ in 0..count {
            self.push_result(Err(TransportError::Unavailable {
                host: String::from(SCRIPTED_HOST),
                status_text: String::from("255"),
                stderr: String::from("Connection refused"),
            }));
        }
    }

    /// Queues a rejected credential.
    pub fn push_auth_failure(&self) {
        self.push_result(Err(TransportError::AuthenticationFailed {
            user: String::from("ubuntu"),
            host: String::from(SCRIPTED_HOST),
            stderr: String::from("Permission denied (publickey)."),
        }));
    }

    /// Sets `interrupt` during the first connection attempt.
    pub fn interrupt_on_connect(&self, interrupt: Interrupt) {
        locked(&self.script).interrupt_on_connect = Some(interrupt);
    }

    /// Number of connection attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        locked(&self.script).attempts
    }

    /// Hosts passed to each connection attempt, in order.
    #[must_use]
    pub fn hosts(&self) -> Vec<String> {
        locked(&self.script).hosts.clone()
    }
}

impl Transport for ScriptedTransport {
    fn connect<'a>(&'a self, host: &'a str) -> BackendFuture<'a, (), TransportError> {
        Box::pin(async move {
            let mut script = locked(&self.script);
            script.attempts = script.attempts.saturating_add(1);
            script.hosts.push(host.to_owned());
            if let Some(interrupt) = script.interrupt_on_connect.take() {
                interrupt.trigger();
            }
            script.results.pop_front().unwrap_or(Ok(()))
        })
    }
}

/// [`Ui`] that records every message for later assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingUi {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingUi {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received so far; warnings are prefixed with `warning: `.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        locked(&self.messages).clone()
    }
}

impl Ui for RecordingUi {
    fn info(&self, message: &str) {
        locked(&self.messages).push(message.to_owned());
    }

    fn warn(&self, message: &str) {
        locked(&self.messages).push(format!("warning: {message}"));
    }
}

#[derive(Debug, Default)]
struct StageScript {
    calls: usize,
    failure: Option<String>,
}

/// [`NextStage`] double that counts invocations.
#[derive(Clone, Debug, Default)]
pub struct RecordingStage {
    script: Arc<Mutex<StageScript>>,
}

impl RecordingStage {
    /// Creates a stage that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        locked(&self.script).failure = Some(message.into());
    }

    /// Number of times the stage ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        locked(&self.script).calls
    }
}

impl NextStage for RecordingStage {
    fn call<'a>(&'a self, _state: &'a ProvisionState) -> BackendFuture<'a, (), StageError> {
        Box::pin(async move {
            let mut script = locked(&self.script);
            script.calls = script.calls.saturating_add(1);
            script
                .failure
                .clone()
                .map_or(Ok(()), |message| Err(StageError(message)))
        })
    }
}
