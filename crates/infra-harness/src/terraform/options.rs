use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

const PLUGIN_NETWORK_ERROR: &str = "Failed to retrieve plugin due to transient network error.";

/// Output patterns that indicate a transient failure, with a description of each
///
/// Keys are regular expressions matched anywhere in terraform's combined output.
pub fn default_retryable_errors() -> BTreeMap<String, String> {
    [
        (".*read: connection reset by peer.*", "Connection reset while downloading modules or charts."),
        (".*transport is closing.*", "Lost connection to a remote API."),
        (".*unable to verify signature.*", PLUGIN_NETWORK_ERROR),
        (".*unable to verify checksum.*", PLUGIN_NETWORK_ERROR),
        (".*no provider exists with the given name.*", PLUGIN_NETWORK_ERROR),
        (".*registry service is unreachable.*", PLUGIN_NETWORK_ERROR),
        (".*Error installing provider.*", PLUGIN_NETWORK_ERROR),
        (".*Failed to query available provider packages.*", PLUGIN_NETWORK_ERROR),
        (".*timeout while waiting for plugin to start.*", PLUGIN_NETWORK_ERROR),
        (".*timed out waiting for server handshake.*", PLUGIN_NETWORK_ERROR),
        ("could not query provider registry for", PLUGIN_NETWORK_ERROR),
        (".*Could not retrieve the list of available versions for provider.*", PLUGIN_NETWORK_ERROR),
        (".*Provider produced inconsistent result after apply.*", "Provider eventual consistency error."),
    ]
    .into_iter()
    .map(|(pattern, description)| (pattern.to_string(), description.to_string()))
    .collect()
}

/// How to run terraform against one configuration directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Directory holding the `.tf` files; every command runs here
    pub terraform_dir: PathBuf,

    /// `-var-file` arguments, in order
    pub var_files: Vec<PathBuf>,

    /// `-var key=value` arguments
    pub vars: BTreeMap<String, String>,

    /// Extra environment for the terraform process
    pub env_vars: BTreeMap<String, String>,

    /// terraform binary to invoke
    pub terraform_binary: String,

    /// Pass `-no-color`
    pub no_color: bool,

    /// Regex → description of failures worth retrying
    pub retryable_errors: BTreeMap<String, String>,

    /// Retries after the first attempt for a retryable failure
    pub max_retries: u32,

    /// Pause between retries
    #[serde(rename = "time_between_retries_secs", with = "crate::config::duration_secs")]
    pub time_between_retries: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            terraform_dir: PathBuf::new(),
            var_files: Vec::new(),
            vars: BTreeMap::new(),
            env_vars: BTreeMap::new(),
            terraform_binary: "terraform".to_string(),
            no_color: true,
            retryable_errors: BTreeMap::new(),
            max_retries: 0,
            time_between_retries: Duration::ZERO,
        }
    }
}

impl Options {
    /// Options for the configuration in `terraform_dir`
    pub fn new(terraform_dir: impl Into<PathBuf>) -> Self {
        Self {
            terraform_dir: terraform_dir.into(),
            ..Self::default()
        }
    }

    /// Append a `-var-file`
    pub fn with_var_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.var_files.push(path.into());
        self
    }

    /// Set a `-var`
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Set an environment variable for the terraform process
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Use a different terraform binary (e.g. `tofu`)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.terraform_binary = binary.into();
        self
    }

    /// Merge in [`default_retryable_errors`] and fill in a retry schedule if none is set
    ///
    /// Patterns already present keep their description. The schedule defaults
    /// to 3 retries, 5 seconds apart.
    pub fn with_default_retryable_errors(mut self) -> Self {
        for (pattern, description) in default_retryable_errors() {
            self.retryable_errors.entry(pattern).or_insert(description);
        }
        if self.max_retries == 0 {
            self.max_retries = 3;
        }
        if self.time_between_retries.is_zero() {
            self.time_between_retries = Duration::from_secs(5);
        }
        self
    }

    fn color_args(&self) -> Vec<String> {
        if self.no_color {
            vec!["-no-color".to_string()]
        } else {
            Vec::new()
        }
    }

    fn variable_args(&self) -> Vec<String> {
        let files = self
            .var_files
            .iter()
            .map(|path| format!("-var-file={}", path.display()));
        let vars = self
            .vars
            .iter()
            .flat_map(|(key, value)| ["-var".to_string(), format!("{key}={value}")]);
        files.chain(vars).collect()
    }

    pub(crate) fn init_args(&self) -> Vec<String> {
        let mut args = vec![
            "init".to_string(),
            "-upgrade=false".to_string(),
            "-input=false".to_string(),
        ];
        args.extend(self.color_args());
        args
    }

    pub(crate) fn apply_args(&self) -> Vec<String> {
        let mut args = vec![
            "apply".to_string(),
            "-input=false".to_string(),
            "-auto-approve".to_string(),
            "-lock=false".to_string(),
        ];
        args.extend(self.color_args());
        args.extend(self.variable_args());
        args
    }

    pub(crate) fn output_args(&self, name: &str) -> Vec<String> {
        vec![
            "output".to_string(),
            "-no-color".to_string(),
            "-json".to_string(),
            name.to_string(),
        ]
    }

    pub(crate) fn destroy_args(&self) -> Vec<String> {
        let mut args = vec![
            "destroy".to_string(),
            "-auto-approve".to_string(),
            "-input=false".to_string(),
            "-lock=false".to_string(),
        ];
        args.extend(self.color_args());
        args.extend(self.variable_args());
        args
    }
}
