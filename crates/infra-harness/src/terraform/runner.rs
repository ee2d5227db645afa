use regex::Regex;
use shell_executor::{Command, Launcher, LocalLauncher};
use tracing::{info, warn};

use super::{Options, Result, TerraformError};
use crate::retry::{do_with_retry, RetryError, RetryPolicy};

/// Runs terraform commands for one [`Options`]
pub struct Terraform<L = LocalLauncher> {
    launcher: L,
    options: Options,
    retryable: Vec<(Regex, String)>,
}

impl Terraform<LocalLauncher> {
    /// Run terraform on this machine
    pub fn new(options: Options) -> Result<Self> {
        Self::with_launcher(LocalLauncher, options)
    }
}

impl<L: Launcher> Terraform<L> {
    /// Run terraform through `launcher`
    ///
    /// Fails if any retryable-error pattern is not a valid regex.
    pub fn with_launcher(launcher: L, options: Options) -> Result<Self> {
        let retryable = options
            .retryable_errors
            .iter()
            .map(|(pattern, description)| {
                Regex::new(pattern)
                    .map(|re| (re, description.clone()))
                    .map_err(|source| TerraformError::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            launcher,
            options,
            retryable,
        })
    }

    /// The options this runner was built with
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// `terraform init`
    pub async fn init(&self) -> Result<String> {
        self.run("init", self.options.init_args()).await
    }

    /// `terraform apply`
    pub async fn apply(&self) -> Result<String> {
        self.run("apply", self.options.apply_args()).await
    }

    /// `terraform init` followed by `terraform apply`
    pub async fn init_and_apply(&self) -> Result<String> {
        self.init().await?;
        self.apply().await
    }

    /// `terraform destroy`
    pub async fn destroy(&self) -> Result<String> {
        self.run("destroy", self.options.destroy_args()).await
    }

    /// Read one output value
    ///
    /// String outputs come back unquoted; lists, maps and numbers come back
    /// as compact JSON.
    pub async fn output(&self, name: &str) -> Result<String> {
        let raw = self.run("output", self.options.output_args(name)).await?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TerraformError::EmptyOutput {
                name: name.to_string(),
            });
        }

        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|source| TerraformError::OutputParse {
                name: name.to_string(),
                source,
            })?;

        let value = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        if value.is_empty() {
            return Err(TerraformError::EmptyOutput {
                name: name.to_string(),
            });
        }
        Ok(value)
    }

    async fn run(&self, subcommand: &str, args: Vec<String>) -> Result<String> {
        info!(
            "Running terraform {} in {}",
            subcommand,
            self.options.terraform_dir.display()
        );

        let policy = RetryPolicy::new(
            self.options.max_retries.saturating_add(1),
            self.options.time_between_retries,
        );
        let description = format!("terraform {subcommand}");

        let args = args.as_slice();
        match do_with_retry(&description, policy, || self.run_once(subcommand, args)).await {
            Ok(stdout) => Ok(stdout),
            Err(RetryError::Fatal { error, .. }) => Err(error),
            Err(RetryError::Exhausted {
                attempts,
                last_error,
                ..
            }) => Err(TerraformError::RetriesExhausted {
                subcommand: subcommand.to_string(),
                attempts,
                last_error: Box::new(last_error),
            }),
        }
    }

    async fn run_once(&self, subcommand: &str, args: &[String]) -> Result<String> {
        let mut cmd = Command::new(&self.options.terraform_binary);
        cmd.args(args)
            .envs(&self.options.env_vars)
            .current_dir(&self.options.terraform_dir);

        let result = self.launcher.execute(cmd).await?;
        if result.success() {
            return Ok(result.stdout);
        }

        let output = result.combined_output();
        let retryable = self.match_retryable(&output);
        if let Some(description) = &retryable {
            warn!(
                "terraform {} failed with a known transient error: {}",
                subcommand, description
            );
        }

        Err(TerraformError::CommandFailed {
            subcommand: subcommand.to_string(),
            code: result.status.code,
            output,
            retryable,
        })
    }

    fn match_retryable(&self, output: &str) -> Option<String> {
        self.retryable
            .iter()
            .find(|(re, _)| re.is_match(output))
            .map(|(_, description)| description.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let mut options = Options::new("/tmp");
        options
            .retryable_errors
            .insert("(unclosed".into(), "broken".into());

        let err = Terraform::new(options).err().unwrap();
        assert!(matches!(err, TerraformError::InvalidPattern { pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn test_match_retryable() {
        let options = Options::new("/tmp").with_default_retryable_errors();
        let terraform = Terraform::new(options).unwrap();

        let output = "Error: Failed to query available provider packages\n\nCould not retrieve ...";
        assert!(terraform.match_retryable(output).is_some());
        assert!(terraform.match_retryable("Error: Invalid reference").is_none());
    }
}
