//! SSH probe configuration loaded via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// SSH settings used to probe a freshly built server.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "BOXLIFT_SSH",
    discovery(
        app_name = "boxlift",
        env_var = "BOXLIFT_CONFIG_PATH",
        config_file_name = "boxlift.toml",
        dotfile_name = ".boxlift.toml",
        project_file_name = "boxlift.toml"
    )
)]
pub struct SshConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "ubuntu".to_owned())]
    pub ssh_user: String,
    /// TCP port exposed by the server for SSH.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Private key used for authentication. Supports `~/` expansion.
    pub ssh_identity_file: Option<String>,
    /// Whether to force batch mode so SSH never prompts for a password.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking; disabled by default because
    /// every server is new.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Seconds each connection attempt may take before SSH gives up.
    #[ortho_config(default = 10)]
    pub ssh_connect_timeout: u64,
    /// Seconds to wait for SSH after the build completes. Zero waits until
    /// interrupted.
    #[ortho_config(default = 0)]
    pub reachability_timeout: u64,
}

/// Errors raised by SSH configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SshConfigError {
    /// Raised when a required value is empty.
    #[error("missing {field}: set BOXLIFT_SSH_{env_suffix} or add {field} to [ssh] in boxlift.toml", env_suffix = field.to_uppercase())]
    Missing {
        /// Field that failed validation.
        field: String,
    },
    /// Raised when the SSH port is zero.
    #[error("ssh_port must be between 1 and 65535")]
    InvalidPort,
    /// Surfaces errors from the `ortho-config` loader.
    #[error("ssh configuration parsing failed: {0}")]
    Parse(String),
}

impl SshConfig {
    /// Loads configuration from defaults, files, and environment variables
    /// without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SshConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SshConfigError> {
        Self::load_from_iter([OsString::from("boxlift")])
            .map_err(|err| SshConfigError::Parse(err.to_string()))
    }

    /// Ensures required values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`SshConfigError`] when a field is empty or the port is zero.
    pub fn validate(&self) -> Result<(), SshConfigError> {
        Self::require_value(Some(&self.ssh_bin), "ssh_bin")?;
        Self::require_value(Some(&self.ssh_user), "ssh_user")?;
        Self::require_value(self.ssh_identity_file.as_deref(), "ssh_identity_file")?;
        if self.ssh_port == 0 {
            return Err(SshConfigError::InvalidPort);
        }
        Ok(())
    }

    /// Returns the reachability bound, or `None` when the wait is unbounded.
    #[must_use]
    pub const fn reachability_bound(&self) -> Option<Duration> {
        match self.reachability_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn require_value(value: Option<&str>, field: &str) -> Result<(), SshConfigError> {
        match value {
            Some(text) if text.trim().is_empty() => Err(SshConfigError::Missing {
                field: field.to_owned(),
            }),
            _ => Ok(()),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            ssh_bin: String::from("ssh"),
            ssh_user: String::from("ubuntu"),
            ssh_port: 22,
            ssh_identity_file: None,
            ssh_batch_mode: true,
            ssh_strict_host_key_checking: false,
            ssh_known_hosts_file: String::from("/dev/null"),
            ssh_connect_timeout: 10,
            reachability_timeout: 0,
        }
    }
}
