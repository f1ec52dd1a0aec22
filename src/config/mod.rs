//! Configuration loading via `ortho-config` and `drydock.toml`.
//!
//! Credentials come from [`ConnectionConfig`], which merges defaults,
//! configuration files and `GOOGLE_*` environment variables. Machine
//! settings come from the `[google]` table of `drydock.toml` and are
//! compiled into one [`ZoneConfig`] per zone by [`ProviderConfig::finalize`].

mod file;
mod provider;
mod validate;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

pub use file::{discovery, load_provider_config, parse_provider_config};
pub use provider::{
    Accelerator, AdditionalDisk, DEFAULT_DISK_SIZE_GB, DEFAULT_DISK_TYPE, DEFAULT_MACHINE_TYPE,
    DEFAULT_NETWORK, DEFAULT_READY_TIMEOUT_SECS, DEFAULT_SSH_PORT, DEFAULT_ZONE, FinalizedConfig,
    MachineSettings, ProviderConfig, ZoneConfig, default_instance_name,
};
pub use validate::{ValidationErrors, ValidationIssue};

/// Default REST endpoint of the compute API.
pub const DEFAULT_API_BASE: &str = "https://compute.googleapis.com/compute/v1";

/// Credentials and endpoint for the compute API.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "GOOGLE")]
pub struct ConnectionConfig {
    /// Project that owns the instances. Used when `drydock.toml` does not
    /// name one.
    #[ortho_config(default = String::new())]
    pub project_id: String,
    /// OAuth bearer token sent with every request.
    #[ortho_config(default = String::new())]
    pub access_token: String,
    /// Base URL of the compute REST API.
    #[ortho_config(default = DEFAULT_API_BASE.to_owned())]
    pub api_base: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl ConnectionConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to [google] in drydock.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("drydock")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks that credentials are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.project_id,
            &FieldMetadata {
                description: "Google Cloud project ID",
                env_var: "GOOGLE_PROJECT_ID",
                toml_key: "project_id",
            },
        )?;
        Self::require_field(
            &self.access_token,
            &FieldMetadata {
                description: "OAuth access token",
                env_var: "GOOGLE_ACCESS_TOKEN",
                toml_key: "access_token",
            },
        )?;
        Self::require_field(
            &self.api_base,
            &FieldMetadata {
                description: "compute API endpoint",
                env_var: "GOOGLE_API_BASE",
                toml_key: "api_base",
            },
        )
    }
}

/// Errors raised during configuration loading.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader or the TOML parser.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when a configuration file cannot be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Path that could not be read.
        path: camino::Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
