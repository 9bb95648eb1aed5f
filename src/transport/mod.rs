//! SSH transport used to decide whether a server accepts management sessions.
//!
//! The probe shells out to the system `ssh` client and runs `true` on the
//! remote host. Output is classified so that a rejected credential surfaces
//! as [`TransportErrorKind::Authentication`] instead of looking like a server
//! that simply is not up yet.

mod config;

use std::ffi::OsString;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::backend::BackendFuture;

pub use config::{SshConfig, SshConfigError};

/// Exit status `ssh` uses for its own failures, as opposed to the remote
/// command's status.
const SSH_FAILURE_STATUS: i32 = 255;

/// Fragments `ssh` prints when the server rejected every credential offered.
const AUTH_FAILURE_MARKERS: [&str; 3] = [
    "Permission denied",
    "Too many authentication failures",
    "Authentication failed",
];

/// Captured result of one `ssh` invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit status, absent when the client was killed by a signal.
    pub code: Option<i32>,
    /// Whatever the remote `true` (or `ssh` itself) wrote to stdout.
    pub stdout: String,
    /// Client diagnostics, used to spot rejected credentials.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the session opened and the remote command exited cleanly.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Seam between the transport and the process table, so probes can be
/// scripted in tests.
pub trait CommandRunner {
    /// Invokes `program` with `args` and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError>;
}

/// [`CommandRunner`] backed by [`std::process::Command`].
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| TransportError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Discriminant used by the readiness probe to decide whether to retry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportErrorKind {
    /// The server answered but refused the credential. Never retried.
    Authentication,
    /// The server is not accepting connections yet.
    Connectivity,
    /// The local SSH client could not be run at all.
    Local,
}

/// Errors raised while attempting an SSH session.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    /// Raised when the server rejects the configured credential.
    #[error("SSH authentication failed for {user}@{host}: {stderr}")]
    AuthenticationFailed {
        /// User the session was opened as.
        user: String,
        /// Host that rejected the credential.
        host: String,
        /// Diagnostic printed by `ssh`.
        stderr: String,
    },
    /// Raised for any other failed connection attempt.
    #[error("SSH to {host} not available (status {status_text}): {stderr}")]
    Unavailable {
        /// Host that could not be reached.
        host: String,
        /// Exit status of the client, or `unknown` when it had none.
        status_text: String,
        /// Diagnostic printed by `ssh`.
        stderr: String,
    },
    /// Raised when the local `ssh` client cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Client binary that was invoked.
        program: String,
        /// Reason reported by the operating system.
        message: String,
    },
}

impl TransportError {
    /// Classifies the error for retry decisions.
    #[must_use]
    pub const fn kind(&self) -> TransportErrorKind {
        match self {
            Self::AuthenticationFailed { .. } => TransportErrorKind::Authentication,
            Self::Unavailable { .. } => TransportErrorKind::Connectivity,
            Self::Spawn { .. } => TransportErrorKind::Local,
        }
    }
}

/// Opens a management session to a host.
pub trait Transport {
    /// Attempts a single connection to `host`.
    fn connect<'a>(&'a self, host: &'a str) -> BackendFuture<'a, (), TransportError>;
}

/// [`Transport`] backed by the system `ssh` client.
#[derive(Clone, Debug)]
pub struct SshTransport<R: CommandRunner> {
    config: SshConfig,
    runner: R,
}

impl SshTransport<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`SshConfigError`] when validation fails.
    pub fn with_process_runner(config: SshConfig) -> Result<Self, SshConfigError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshTransport<R> {
    /// Creates a transport using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SshConfigError`] when configuration validation fails.
    pub fn new(config: SshConfig, runner: R) -> Result<Self, SshConfigError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    /// Returns the configuration used by this transport.
    #[must_use]
    pub const fn config(&self) -> &SshConfig {
        &self.config
    }

    fn probe(&self, host: &str) -> Result<(), TransportError> {
        debug!(user = %self.config.ssh_user, host, "opening SSH session");
        let args = self.build_ssh_args(host);
        let output = self.runner.run(&self.config.ssh_bin, &args)?;
        if output.is_success() {
            return Ok(());
        }
        Err(self.classify_failure(host, &output))
    }

    fn classify_failure(&self, host: &str, output: &CommandOutput) -> TransportError {
        let stderr = output.stderr.trim().to_owned();
        let rejected = output.code == Some(SSH_FAILURE_STATUS)
            && AUTH_FAILURE_MARKERS
                .iter()
                .any(|marker| stderr.contains(marker));
        if rejected {
            return TransportError::AuthenticationFailed {
                user: self.config.ssh_user.clone(),
                host: host.to_owned(),
                stderr,
            };
        }

        TransportError::Unavailable {
            host: host.to_owned(),
            status_text: output
                .code
                .map_or_else(|| String::from("unknown"), |code| code.to_string()),
            stderr,
        }
    }

    fn build_ssh_args(&self, host: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.ssh_port.to_string()),
        ];

        if let Some(ref identity_file) = self.config.ssh_identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(expand_tilde(identity_file)));
        }

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        args.push(OsString::from("-o"));
        args.push(OsString::from(format!(
            "ConnectTimeout={}",
            self.config.ssh_connect_timeout
        )));
        args.push(OsString::from(format!("{}@{host}", self.config.ssh_user)));
        args.push(OsString::from("true"));
        args
    }
}

impl<R> Transport for SshTransport<R>
where
    R: CommandRunner + Sync,
{
    fn connect<'a>(&'a self, host: &'a str) -> BackendFuture<'a, (), TransportError> {
        Box::pin(async move { self.probe(host) })
    }
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// The input is returned unchanged when `HOME` is not set.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

#[cfg(test)]
mod tests;
