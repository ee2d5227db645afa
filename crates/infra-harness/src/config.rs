//! Scenario configuration
//!
//! A scenario is described in YAML. The document is laid over the
//! simple-creation scenario key by key, nested sections included, so an
//! empty file (or no file at all) yields the stock `/workdir` layout and a
//! partial `terraform:` section keeps the default var files. Lists replace
//! their default rather than extending it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::terraform::Options;

/// Environment variable naming a scenario file to load instead of the defaults
pub const CONFIG_ENV_VAR: &str = "INFRA_HARNESS_CONFIG";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        /// The file that could not be read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Everything needed to provision an instance and check it over SSH
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Label used in log lines and retry descriptions
    pub name: String,

    /// Terraform working directory, var files and retry table
    pub terraform: Options,

    /// Terraform output holding the instance address
    pub output_name: String,

    /// Private half of the SSH key pair
    pub private_key_path: PathBuf,

    /// Public half of the SSH key pair
    pub public_key_path: PathBuf,

    /// Remote login name
    pub ssh_user: String,

    /// Remote port, 22 when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_port: Option<u16>,

    /// ssh client binary, `ssh` from `PATH` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_program: Option<PathBuf>,

    /// Per-connection timeout handed to the ssh client
    #[serde(rename = "connect_timeout_secs", with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Text the remote echo commands print
    pub expected_text: String,

    /// Schedule for the SSH checks
    pub retry: RetryPolicy,
}

impl ScenarioConfig {
    /// The simple-creation scenario: one instance reachable as `emergency`
    pub fn simple_creation() -> Self {
        Self {
            name: "001_simple_creation".to_string(),
            terraform: Options {
                terraform_dir: PathBuf::from("/workdir/test/001_simple_creation"),
                var_files: vec![
                    PathBuf::from("/workdir/test/000_shared/test_credentials.tfvars"),
                    PathBuf::from("/workdir/test/001_simple_creation/test.tfvars"),
                ],
                ..Options::default()
            },
            output_name: "public_ip".to_string(),
            private_key_path: PathBuf::from("/workdir/emergency-user-key"),
            public_key_path: PathBuf::from("/workdir/emergency-user-key.pub"),
            ssh_user: "emergency".to_string(),
            ssh_port: None,
            ssh_program: None,
            connect_timeout: Duration::from_secs(10),
            expected_text: "Hello, World".to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Load and validate a scenario file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a scenario from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let mut merged = serde_yaml::to_value(Self::simple_creation())?;
        // An empty document parses as null, which leaves the defaults alone
        if !contents.trim().is_empty() {
            overlay(&mut merged, serde_yaml::from_str(contents)?);
        }

        let config: Self = serde_yaml::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file named by `INFRA_HARNESS_CONFIG`, or fall back to [`Self::simple_creation`]
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load(PathBuf::from(path)),
            None => Ok(Self::simple_creation()),
        }
    }

    /// Reject configurations that cannot possibly connect
    pub fn validate(&self) -> Result<()> {
        if self.terraform.terraform_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "terraform.terraform_dir must not be empty".to_string(),
            ));
        }
        if self.output_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "output_name must not be empty".to_string(),
            ));
        }
        if self.ssh_user.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "ssh_user must not be empty".to_string(),
            ));
        }
        if self.expected_text.is_empty() {
            return Err(ConfigError::ValidationError(
                "expected_text must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Terraform options with the standard transient-error table merged in
    pub fn terraform_options(&self) -> Options {
        self.terraform.clone().with_default_retryable_errors()
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::simple_creation()
    }
}

/// Recursively lay `patch` over `base`: mappings merge, null keeps `base`,
/// anything else replaces it
fn overlay(base: &mut serde_yaml::Value, patch: serde_yaml::Value) {
    use serde_yaml::Value;

    match (base, patch) {
        (_, Value::Null) => {}
        (Value::Mapping(base), Value::Mapping(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

/// (De)serialize a [`Duration`] as fractional seconds
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
