//! # Infra Harness
//!
//! Building blocks for infrastructure conformance tests: drive a Terraform
//! configuration through init/apply/output/destroy, reach the provisioned
//! instance over SSH with a key pair, and retry checks on a fixed schedule
//! while the instance finishes booting.
//!
//! The [`scenario`] module strings these together into the simple-creation
//! check run by `tests/simple_creation.rs` and the `infra-harness` binary.

#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod retry;
pub mod scenario;
pub mod ssh;
pub mod terraform;

pub use config::{ConfigError, ScenarioConfig};
pub use retry::{do_with_retry, RetryError, RetryPolicy, Retryable};
pub use scenario::{run_simple_creation, CheckError, ScenarioError, ScenarioReport};
pub use ssh::{check_ssh_command, run_ssh_command, Host, KeyPair, SshError};
pub use terraform::{Deployment, Options, Terraform, TerraformError};
