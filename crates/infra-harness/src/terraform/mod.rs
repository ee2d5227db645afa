//! Terraform lifecycle
//!
//! [`Terraform`] shells out to the `terraform` CLI for init, apply, output
//! and destroy, retrying commands whose output matches a known transient
//! error. [`Deployment`] holds the teardown obligation for an applied
//! configuration so that destroy runs exactly once.

mod deployment;
mod options;
mod runner;

pub use deployment::Deployment;
pub use options::{default_retryable_errors, Options};
pub use runner::Terraform;

use crate::retry::Retryable;
use thiserror::Error;

/// Terraform error types
#[derive(Debug, Error)]
pub enum TerraformError {
    /// The terraform binary could not be run at all
    #[error(transparent)]
    Exec(#[from] shell_executor::Error),

    /// terraform ran and exited non-zero
    #[error("`terraform {subcommand}` exited with code {code:?}: {output}")]
    CommandFailed {
        /// init, apply, output or destroy
        subcommand: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Combined stdout and stderr
        output: String,
        /// Description of the matching retryable error, if any
        retryable: Option<String>,
    },

    /// A retryable failure kept happening
    #[error("`terraform {subcommand}` still failing after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// init, apply, output or destroy
        subcommand: String,
        /// Attempts made
        attempts: u32,
        /// Failure from the final attempt
        last_error: Box<TerraformError>,
    },

    /// A configured retryable-error pattern is not a valid regex
    #[error("invalid retryable error pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Regex compile error
        source: regex::Error,
    },

    /// `terraform output` printed nothing
    #[error("terraform output {name:?} is empty")]
    EmptyOutput {
        /// Output name
        name: String,
    },

    /// `terraform output -json` printed something that is not JSON
    #[error("failed to parse terraform output {name:?}: {source}")]
    OutputParse {
        /// Output name
        name: String,
        /// JSON error
        source: serde_json::Error,
    },
}

impl Retryable for TerraformError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            TerraformError::CommandFailed {
                retryable: Some(_),
                ..
            }
        )
    }
}

/// Result type for terraform operations
pub type Result<T> = std::result::Result<T, TerraformError>;
