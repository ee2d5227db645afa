//! Error types for command execution

use thiserror::Error;

/// Unified error type for command execution
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn `{program}`: {reason}")]
    SpawnFailed {
        /// The program that could not be started
        program: String,
        /// The reason for the spawn failure
        reason: String,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }

    /// Prefix a spawn failure with the layer it happened in (e.g. "SSH")
    pub fn with_layer_context(self, layer: impl Into<String>) -> Self {
        match self {
            Error::SpawnFailed { program, reason } => Error::SpawnFailed {
                program,
                reason: format!("in {} layer: {}", layer.into(), reason),
            },
            other => other,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
