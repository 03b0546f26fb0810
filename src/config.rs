//! Configuration loading via `ortho-config`.
//!
//! Credentials, batch tuning and telemetry settings are resolved once at
//! startup into a [`Settings`] value that is handed to each component.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::profiles::{CloudProfile, ProfileError, ProfileStore};

/// Cloud credentials and endpoint selection, derived from environment
/// variables, configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "OS",
    discovery(
        app_name = "stackfleet",
        env_var = "STACKFLEET_CONFIG_PATH",
        config_file_name = "stackfleet.toml",
        dotfile_name = ".stackfleet.toml",
        project_file_name = "stackfleet.toml"
    )
)]
pub struct CloudConfig {
    /// Identity service endpoint. Defaults to a local devstack.
    #[ortho_config(default = "http://localhost:5000/v3".to_owned())]
    pub auth_url: String,
    /// Project to scope the token to.
    #[ortho_config(default = "admin".to_owned())]
    pub project_name: String,
    /// User to authenticate as.
    #[ortho_config(default = "admin".to_owned())]
    pub username: String,
    /// Password for `username`. May come from a `[clouds.<name>]` profile,
    /// so `validate` only rejects it when still blank after the merge.
    #[ortho_config(default = String::new())]
    pub password: String,
    /// Domain owning the user.
    #[ortho_config(default = "default".to_owned())]
    pub user_domain_name: String,
    /// Domain owning the project.
    #[ortho_config(default = "default".to_owned())]
    pub project_domain_name: String,
    /// Region used to pick catalog endpoints; any region when unset.
    pub region_name: Option<String>,
    /// Catalog interface (`public`, `internal` or `admin`).
    #[ortho_config(default = "public".to_owned())]
    pub interface: String,
    /// Named profile from the `[clouds]` table overriding the fields above.
    pub cloud: Option<String>,
}

/// Batch orchestration tuning.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "STACKFLEET_BATCH",
    discovery(
        app_name = "stackfleet",
        env_var = "STACKFLEET_CONFIG_PATH",
        config_file_name = "stackfleet.toml",
        dotfile_name = ".stackfleet.toml",
        project_file_name = "stackfleet.toml"
    )
)]
pub struct BatchConfig {
    /// Upper bound on concurrently running fan-out units.
    #[ortho_config(default = 5)]
    pub max_workers: usize,
    /// Servers replaced per rolling-update window.
    #[ortho_config(default = 2)]
    pub window_size: usize,
    /// Pause between rolling-update windows, in seconds.
    #[ortho_config(default = 30)]
    pub window_delay_secs: u64,
    /// Deadline for a resize to reach `VERIFY_RESIZE`, in seconds.
    #[ortho_config(default = 300)]
    pub resize_timeout_secs: u64,
    /// Deadline for other status waits, in seconds.
    #[ortho_config(default = 600)]
    pub wait_timeout_secs: u64,
    /// Interval between status polls, in seconds.
    #[ortho_config(default = 2)]
    pub poll_interval_secs: u64,
}

/// Telemetry collector settings injected into boot scripts.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "NEW_RELIC",
    discovery(
        app_name = "stackfleet",
        env_var = "STACKFLEET_CONFIG_PATH",
        config_file_name = "stackfleet.toml",
        dotfile_name = ".stackfleet.toml",
        project_file_name = "stackfleet.toml"
    )
)]
pub struct TelemetryConfig {
    /// Ingest license key. The collector is only injected when set.
    pub license_key: Option<String>,
    /// Collector release to install.
    #[ortho_config(default = "1.1.0".to_owned())]
    pub collector_version: String,
    /// OTLP endpoint the collector exports to.
    #[ortho_config(default = "https://otlp.nr-data.net".to_owned())]
    pub otlp_endpoint: String,
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

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to stackfleet.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!(
            "{} must be at least 1: set {} or {} in stackfleet.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

impl CloudConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stackfleet")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies the profile named by `explicit`, falling back to the `cloud`
    /// field (`OS_CLOUD`). Returns the config unchanged when neither is set.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] when the named profile cannot be read.
    pub fn apply_named_profile(
        self,
        store: &ProfileStore,
        explicit: Option<&str>,
    ) -> Result<Self, ProfileError> {
        let Some(name) = explicit.map(ToOwned::to_owned).or_else(|| self.cloud.clone()) else {
            return Ok(self);
        };
        let profile = store.load(&name)?;
        info!(profile = %name, "applied cloud profile");
        Ok(self.with_profile(profile))
    }

    /// Overrides credential fields with the values present in `profile`.
    #[must_use]
    pub fn with_profile(mut self, profile: CloudProfile) -> Self {
        let CloudProfile {
            auth_url,
            project_name,
            username,
            password,
            user_domain_name,
            project_domain_name,
            region_name,
            interface,
        } = profile;
        if let Some(value) = auth_url {
            self.auth_url = value;
        }
        if let Some(value) = project_name {
            self.project_name = value;
        }
        if let Some(value) = username {
            self.username = value;
        }
        if let Some(value) = password {
            self.password = value;
        }
        if let Some(value) = user_domain_name {
            self.user_domain_name = value;
        }
        if let Some(value) = project_domain_name {
            self.project_domain_name = value;
        }
        if region_name.is_some() {
            self.region_name = region_name;
        }
        if let Some(value) = interface {
            self.interface = value;
        }
        self
    }

    /// Performs semantic validation on required fields. Error messages name
    /// the environment variable and configuration key to set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty,
    /// or [`ConfigError::Invalid`] for an unknown interface.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.auth_url,
            &FieldMetadata::new("identity endpoint", "OS_AUTH_URL", "auth_url"),
        )?;
        require_field(
            &self.project_name,
            &FieldMetadata::new("project name", "OS_PROJECT_NAME", "project_name"),
        )?;
        require_field(
            &self.username,
            &FieldMetadata::new("username", "OS_USERNAME", "username"),
        )?;
        require_field(
            &self.password,
            &FieldMetadata::new("password", "OS_PASSWORD", "password"),
        )?;
        require_field(
            &self.user_domain_name,
            &FieldMetadata::new("user domain", "OS_USER_DOMAIN_NAME", "user_domain_name"),
        )?;
        require_field(
            &self.project_domain_name,
            &FieldMetadata::new(
                "project domain",
                "OS_PROJECT_DOMAIN_NAME",
                "project_domain_name",
            ),
        )?;
        if !matches!(self.interface.as_str(), "public" | "internal" | "admin") {
            return Err(ConfigError::Invalid(format!(
                "interface '{}' must be public, internal or admin (OS_INTERFACE)",
                self.interface
            )));
        }
        Ok(())
    }
}

impl BatchConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stackfleet")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Rejects zero-sized pools, windows and poll intervals.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive(
            self.max_workers as u64,
            &FieldMetadata::new("max_workers", "STACKFLEET_BATCH_MAX_WORKERS", "max_workers"),
        )?;
        require_positive(
            self.window_size as u64,
            &FieldMetadata::new("window_size", "STACKFLEET_BATCH_WINDOW_SIZE", "window_size"),
        )?;
        require_positive(
            self.poll_interval_secs,
            &FieldMetadata::new(
                "poll_interval_secs",
                "STACKFLEET_BATCH_POLL_INTERVAL_SECS",
                "poll_interval_secs",
            ),
        )?;
        Ok(())
    }

    /// Pause between rolling-update windows.
    #[must_use]
    pub const fn window_delay(&self) -> Duration {
        Duration::from_secs(self.window_delay_secs)
    }

    /// Resize confirmation deadline.
    #[must_use]
    pub const fn resize_timeout(&self) -> Duration {
        Duration::from_secs(self.resize_timeout_secs)
    }

    /// General status wait deadline.
    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    /// Interval between status polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl BatchConfig {
    /// Built-in tuning, matching the loader defaults.
    #[must_use]
    pub const fn defaults() -> Self {
        Self {
            max_workers: 5,
            window_size: 2,
            window_delay_secs: 30,
            resize_timeout_secs: 300,
            wait_timeout_secs: 600,
            poll_interval_secs: 2,
        }
    }
}

impl TelemetryConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stackfleet")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the license key when it is set and not blank.
    #[must_use]
    pub fn license_key(&self) -> Option<&str> {
        self.license_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

impl TelemetryConfig {
    /// Built-in settings with no license key, matching the loader defaults.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            license_key: None,
            collector_version: String::from("1.1.0"),
            otlp_endpoint: String::from("https://otlp.nr-data.net"),
        }
    }
}

/// Every configuration section, resolved once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Cloud credentials.
    pub cloud: CloudConfig,
    /// Batch tuning.
    pub batch: BatchConfig,
    /// Telemetry collector settings.
    pub telemetry: TelemetryConfig,
}

impl Settings {
    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] raised by a section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cloud.validate()?;
        self.batch.validate()
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
