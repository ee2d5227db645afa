//! Process management traits and types

use crate::error::Result;
use async_trait::async_trait;

/// A handle to control a running process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Get the process ID
    fn pid(&self) -> Option<u32>;

    /// Wait for the process to complete and return its exit status
    async fn wait(&mut self) -> Result<ExitStatus>;

    /// Send SIGTERM (or equivalent) for graceful shutdown
    async fn terminate(&mut self) -> Result<()>;

    /// Send SIGKILL (or equivalent) to forcefully stop the process
    async fn kill(&mut self) -> Result<()>;
}

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Result of executing a command to completion
#[derive(Debug, Clone)]
pub struct ExitResult {
    /// Final status of the process
    pub status: ExitStatus,
    /// Everything the process wrote to stdout
    pub stdout: String,
    /// Everything the process wrote to stderr
    pub stderr: String,
}

impl ExitResult {
    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stdout followed by stderr, for matching error text regardless of stream
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}
