//! The simple-creation scenario
//!
//! Provision one instance, read its public address, then prove over SSH that
//! a command's output comes back intact both when it succeeds and when it
//! exits non-zero. Teardown always runs, once.

use shell_executor::Launcher;
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, ScenarioConfig};
use crate::retry::{do_with_retry, RetryError, RetryPolicy, Retryable};
use crate::ssh::{check_ssh_command, Host, KeyPair, SshError};
use crate::terraform::{Deployment, Terraform, TerraformError};

/// Why a single remote check attempt failed
#[derive(Debug, Error)]
pub enum CheckError {
    /// Could not run the command at all, or it failed unexpectedly
    #[error(transparent)]
    Ssh(#[from] SshError),

    /// The command ran but printed something else
    #[error("expected SSH command to return '{expected}' but got '{actual}'")]
    UnexpectedOutput {
        /// What the command should print
        expected: String,
        /// What it printed
        actual: String,
    },

    /// The command was meant to fail but exited zero
    #[error("expected SSH command to return an error but got none")]
    ExpectedFailure,
}

impl Retryable for CheckError {
    fn is_retryable(&self) -> bool {
        match self {
            CheckError::Ssh(e) => e.is_retryable(),
            CheckError::UnexpectedOutput { .. } | CheckError::ExpectedFailure => false,
        }
    }
}

/// Scenario error types
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Bad or unreadable configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Provisioning, output lookup or teardown failed
    #[error(transparent)]
    Terraform(#[from] TerraformError),

    /// Key pair or host descriptor problem, before any remote call
    #[error(transparent)]
    Ssh(#[from] SshError),

    /// A remote check never passed
    #[error(transparent)]
    Check(#[from] RetryError<CheckError>),
}

/// What a successful run observed
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// Scenario label
    pub name: String,
    /// Address read from the terraform output
    pub public_ip: String,
    /// stdout of the succeeding command
    pub echo_output: String,
    /// stdout of the failing command
    pub failing_echo_output: String,
}

/// `echo -n '<text>'`, with single quotes in `text` escaped
pub fn echo_command(text: &str) -> String {
    format!("echo -n '{}'", text.replace('\'', "'\\''"))
}

/// `echo -n '<text>' && exit 1`
pub fn failing_echo_command(text: &str) -> String {
    format!("{} && exit 1", echo_command(text))
}

fn expect_output(expected: &str, actual: &str) -> Result<String, CheckError> {
    if actual.trim() == expected {
        Ok(actual.trim().to_string())
    } else {
        Err(CheckError::UnexpectedOutput {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Run `echo -n '<text>'` until it exits zero and prints exactly `text`
pub async fn check_echo(
    host: &Host<'_>,
    text: &str,
    policy: RetryPolicy,
) -> Result<String, RetryError<CheckError>> {
    let command = echo_command(text);
    let description = format!("SSH to public host {}", host.hostname());

    let command = command.as_str();
    do_with_retry(&description, policy, || async move {
        let actual = check_ssh_command(host, command).await?;
        expect_output(text, &actual)
    })
    .await
}

/// Run `echo -n '<text>' && exit 1` until it exits non-zero having printed exactly `text`
pub async fn check_failing_echo(
    host: &Host<'_>,
    text: &str,
    policy: RetryPolicy,
) -> Result<String, RetryError<CheckError>> {
    let command = failing_echo_command(text);
    let description = format!("SSH to public host {} with error command", host.hostname());

    let command = command.as_str();
    do_with_retry(&description, policy, || async move {
        match check_ssh_command(host, command).await {
            Ok(_) => Err(CheckError::ExpectedFailure),
            Err(SshError::CommandFailed { stdout, .. }) => expect_output(text, &stdout),
            Err(other) => Err(other.into()),
        }
    })
    .await
}

/// Provision with the local terraform binary and run the scenario
pub async fn run_simple_creation(config: &ScenarioConfig) -> Result<ScenarioReport, ScenarioError> {
    let terraform = Terraform::new(config.terraform_options())?;
    run_scenario(config, terraform).await
}

/// Provision with `terraform`, run both checks, tear down
pub async fn run_scenario<L: Launcher>(
    config: &ScenarioConfig,
    terraform: Terraform<L>,
) -> Result<ScenarioReport, ScenarioError> {
    info!("Starting scenario {}", config.name);

    let deployment = Deployment::apply(terraform).await?;
    let outcome = verify(&deployment, config).await;
    let report = deployment.finish(outcome).await?;

    info!("Scenario {} passed against {}", report.name, report.public_ip);
    Ok(report)
}

async fn verify<L: Launcher>(
    deployment: &Deployment<L>,
    config: &ScenarioConfig,
) -> Result<ScenarioReport, ScenarioError> {
    let public_ip = deployment.output(&config.output_name).await?;
    info!("Instance address: {}", public_ip);

    let key_pair = KeyPair::from_files(&config.private_key_path, &config.public_key_path)?;
    let host = Host::new(&public_ip, &key_pair, &config.ssh_user)?
        .with_port(config.ssh_port)
        .with_connect_timeout(config.connect_timeout)
        .with_ssh_program(config.ssh_program.clone());

    let echo_output = check_echo(&host, &config.expected_text, config.retry).await?;
    let failing_echo_output = check_failing_echo(&host, &config.expected_text, config.retry).await?;

    Ok(ScenarioReport {
        name: config.name.clone(),
        public_ip,
        echo_output,
        failing_echo_output,
    })
}
