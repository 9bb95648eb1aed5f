//! Core library for the boxlift provisioning tool.
//!
//! The crate provisions a single Brightbox Cloud server and waits until it is
//! usable: identifiers are resolved, the server is created, the provider is
//! polled until the build completes, a downstream stage runs once, and SSH is
//! polled until it accepts sessions. Timeouts and interruptions destroy the
//! server so a failed run does not leak it.

pub mod backend;
pub mod brightbox;
pub mod config;
pub mod pipeline;
pub mod poll;
pub mod probe;
pub mod resolve;
pub mod terminate;
pub mod test_support;
pub mod transport;
pub mod ui;
pub mod user_data;

pub use backend::{
    BackendFuture, ComputeApi, NamedResource, ServerRequest, ServerSnapshot, ServerStatus,
};
pub use brightbox::{BrightboxBackend, BrightboxError};
pub use config::{BrightboxConfig, ConfigError, RequestOverrides};
pub use pipeline::{
    LifecycleState, NextStage, NoopStage, PipelineSettings, ProvisionError, ProvisionOutcome,
    ProvisionPipeline, ProvisionRequest, ProvisionState, Stage, StageError,
};
pub use poll::{Interrupt, PollOutcome, RetryPoller, TryBudget};
pub use probe::ReadinessProbe;
pub use resolve::{IdPrefix, normalise_id};
pub use terminate::{
    ActionRunner, CleanupContext, ComputeActionRunner, TerminateError, TerminationHandler,
};
pub use transport::{
    CommandOutput, CommandRunner, ProcessCommandRunner, SshConfig, SshConfigError, SshTransport,
    Transport, TransportError, TransportErrorKind,
};
pub use ui::{SharedUi, StderrUi, Ui};
pub use user_data::{UserDataError, resolve_user_data};
