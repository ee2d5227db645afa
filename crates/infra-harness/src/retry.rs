//! Bounded retry with a fixed delay between attempts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Classifies an error as worth another attempt or not
///
/// Transient failures (network, instance still booting) should return `true`.
/// Failures another attempt cannot change, like a command producing the wrong
/// output, should return `false` so the loop stops right away.
pub trait Retryable {
    /// Whether another attempt may succeed
    fn is_retryable(&self) -> bool {
        true
    }
}

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first; 0 behaves like 1
    pub max_attempts: u32,
    /// Pause between consecutive attempts
    #[serde(rename = "delay_secs", with = "crate::config::duration_secs")]
    pub delay: Duration,
}

impl RetryPolicy {
    /// A policy with `max_attempts` attempts spaced `delay` apart
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(6, Duration::from_secs(5))
    }
}

/// Why a retried action gave up
#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    /// Every attempt failed with a retryable error
    #[error("'{description}' unsuccessful after {attempts} attempts: {last_error}")]
    Exhausted {
        /// What was being attempted
        description: String,
        /// How many attempts were made
        attempts: u32,
        /// The error from the final attempt
        last_error: E,
    },

    /// An attempt failed with an error that is not worth retrying
    #[error("'{description}' failed on attempt {attempt}: {error}")]
    Fatal {
        /// What was being attempted
        description: String,
        /// The attempt that failed
        attempt: u32,
        /// The non-retryable error
        error: E,
    },
}

impl<E: fmt::Display> RetryError<E> {
    /// The underlying error, whichever way the loop ended
    pub fn inner(&self) -> &E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Fatal { error, .. } => error,
        }
    }
}

/// Run `action` until it succeeds, fails fatally, or `policy.max_attempts` is used up
///
/// The delay is only slept between attempts, never after the last one.
pub async fn do_with_retry<T, E, F, Fut>(
    description: &str,
    policy: RetryPolicy,
    mut action: F,
) -> Result<T, RetryError<E>>
where
    E: Retryable + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!("{} (attempt {}/{})", description, attempt, max_attempts);

        let error = match action().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}", description, attempt);
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !error.is_retryable() {
            warn!("{} failed with non-retryable error: {}", description, error);
            return Err(RetryError::Fatal {
                description: description.to_string(),
                attempt,
                error,
            });
        }

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                description: description.to_string(),
                attempts: max_attempts,
                last_error: error,
            });
        }

        warn!(
            "{} returned an error: {}. Sleeping for {:?} and will try again.",
            description, error, policy.delay
        );
        smol::Timer::after(policy.delay).await;
        attempt += 1;
    }
}
