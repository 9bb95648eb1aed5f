//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::brightbox::{BrightboxBackend, DEFAULT_API_URL};
use crate::pipeline::{ProvisionRequest, RequestError};
use crate::user_data::{UserDataError, resolve_user_data};

/// Brightbox account and server settings derived from environment
/// variables, configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "BRIGHTBOX",
    discovery(
        app_name = "boxlift",
        env_var = "BOXLIFT_CONFIG_PATH",
        config_file_name = "boxlift.toml",
        dotfile_name = ".boxlift.toml",
        project_file_name = "boxlift.toml"
    )
)]
pub struct BrightboxConfig {
    /// API endpoint. Defaults to the `gb1` region.
    #[ortho_config(default = DEFAULT_API_URL.to_owned())]
    pub api_url: String,
    /// OAuth access token sent as a bearer token. Required.
    pub access_token: Option<String>,
    /// Region label shown in the launch summary.
    #[ortho_config(default = "gb1".to_owned())]
    pub region: String,
    /// Image to boot from (for example `img-3ikco`). Required to create a
    /// server.
    pub image_id: Option<String>,
    /// Server name. Defaults to `boxlift-<uuid>`.
    pub server_name: Option<String>,
    /// Zone handle (for example `gb1-a`) or identifier.
    pub zone: Option<String>,
    /// Server type handle (for example `nano`) or identifier.
    pub server_type: Option<String>,
    /// Comma-separated server group identifiers.
    pub server_groups: Option<String>,
    /// Inline user data.
    pub user_data: Option<String>,
    /// Path to a user data file. Supports `~/` expansion.
    pub user_data_file: Option<String>,
    /// Seconds the provider may take to build the server.
    #[ortho_config(default = 120)]
    pub server_build_timeout: u64,
}

/// Per-run values that take precedence over the loaded configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RequestOverrides {
    /// Image identifier.
    pub image_id: Option<String>,
    /// Server name.
    pub server_name: Option<String>,
    /// Zone handle or identifier.
    pub zone: Option<String>,
    /// Server type handle or identifier.
    pub server_type: Option<String>,
    /// Server group identifiers; replaces the configured list when non-empty.
    pub server_groups: Vec<String>,
    /// Inline user data.
    pub user_data: Option<String>,
    /// User data file path.
    pub user_data_file: Option<String>,
    /// Build timeout in seconds.
    pub server_build_timeout: Option<u64>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

const ACCESS_TOKEN: FieldMetadata = FieldMetadata::new(
    "Brightbox access token",
    "BRIGHTBOX_ACCESS_TOKEN",
    "access_token",
);
const IMAGE_ID: FieldMetadata =
    FieldMetadata::new("server image", "BRIGHTBOX_IMAGE_ID", "image_id");
const API_URL: FieldMetadata = FieldMetadata::new("API URL", "BRIGHTBOX_API_URL", "api_url");

impl BrightboxConfig {
    fn require_field<'a>(
        value: Option<&'a str>,
        metadata: &FieldMetadata,
    ) -> Result<&'a str, ConfigError> {
        match value.map(str::trim) {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [brightbox] in boxlift.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            ))),
        }
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("boxlift")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies per-run overrides. User data given on the command line
    /// replaces both configured user data sources.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &RequestOverrides) -> Self {
        fn replace(target: &mut Option<String>, value: Option<&String>) {
            if let Some(text) = value {
                *target = Some(text.clone());
            }
        }

        replace(&mut self.image_id, overrides.image_id.as_ref());
        replace(&mut self.server_name, overrides.server_name.as_ref());
        replace(&mut self.zone, overrides.zone.as_ref());
        replace(&mut self.server_type, overrides.server_type.as_ref());
        if !overrides.server_groups.is_empty() {
            self.server_groups = Some(overrides.server_groups.join(","));
        }
        if overrides.user_data.is_some() || overrides.user_data_file.is_some() {
            self.user_data.clone_from(&overrides.user_data);
            self.user_data_file.clone_from(&overrides.user_data_file);
        }
        if let Some(timeout) = overrides.server_build_timeout {
            self.server_build_timeout = timeout;
        }
        self
    }

    /// Checks the settings needed to talk to the API at all.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the token or URL is blank.
    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        Self::require_field(self.access_token.as_deref(), &ACCESS_TOKEN)?;
        Self::require_field(Some(&self.api_url), &API_URL)?;
        Ok(())
    }

    /// Performs semantic validation on everything needed to create a server.
    /// Error messages include guidance on how to provide missing values via
    /// environment variables or configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required field is empty or the build
    /// timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_credentials()?;
        Self::require_field(self.image_id.as_deref(), &IMAGE_ID)?;
        if self.server_build_timeout == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "server_build_timeout must be greater than zero: set \
                 BRIGHTBOX_SERVER_BUILD_TIMEOUT or server_build_timeout in boxlift.toml",
            )));
        }
        Ok(())
    }

    /// Builds an API client from the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the token or URL is missing or unusable.
    pub fn backend(&self) -> Result<BrightboxBackend, ConfigError> {
        self.validate_credentials()?;
        let token = Self::require_field(self.access_token.as_deref(), &ACCESS_TOKEN)?;
        BrightboxBackend::new(&self.api_url, token)
            .map_err(|err| ConfigError::InvalidValue(err.to_string()))
    }

    /// Configured server groups, split on commas with blanks dropped.
    #[must_use]
    pub fn server_group_ids(&self) -> Vec<String> {
        self.server_groups
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|group| !group.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Builds a [`ProvisionRequest`] from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails or user data cannot be
    /// resolved.
    pub fn as_request(&self) -> Result<ProvisionRequest, ConfigError> {
        self.validate()?;
        let image_id = Self::require_field(self.image_id.as_deref(), &IMAGE_ID)?;
        let name = self
            .server_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map_or_else(
                || format!("boxlift-{}", Uuid::new_v4().simple()),
                str::to_owned,
            );
        let user_data =
            resolve_user_data(self.user_data.as_deref(), self.user_data_file.as_deref())?;

        Ok(ProvisionRequest::builder()
            .image_id(image_id)
            .name(name)
            .zone(self.zone.clone())
            .server_type(self.server_type.clone())
            .server_groups(self.server_group_ids())
            .user_data(user_data)
            .region(Some(self.region.clone()))
            .build_timeout(Duration::from_secs(self.server_build_timeout))
            .build()?)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configured value cannot be used.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Surfaces user data resolution failures.
    #[error(transparent)]
    UserData(#[from] UserDataError),
    /// Surfaces request validation failures.
    #[error("invalid server request: {0}")]
    Request(#[from] RequestError),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
