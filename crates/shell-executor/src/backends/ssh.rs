//! SSH remote execution backend using the `ssh` CLI

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::command::Command;
use crate::error::Result;
use crate::launcher::Launcher;

/// SSH connection configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP)
    host: String,
    /// SSH user (optional, uses system default if not specified)
    user: Option<String>,
    /// SSH port (optional, defaults to 22)
    port: Option<u16>,
    /// Path to identity file (private key)
    identity_file: Option<PathBuf>,
    /// Value for `-o ConnectTimeout`
    connect_timeout: Option<Duration>,
    /// When false, host keys are neither verified nor recorded
    strict_host_key_checking: bool,
    /// Fail instead of prompting for passwords or passphrases
    batch_mode: bool,
    /// Additional SSH arguments
    extra_args: Vec<String>,
    /// The ssh client binary
    program: OsString,
}

impl SshConfig {
    /// Create a new SSH configuration for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            identity_file: None,
            connect_timeout: None,
            strict_host_key_checking: true,
            batch_mode: false,
            extra_args: Vec::new(),
            program: OsString::from("ssh"),
        }
    }

    /// Set the SSH user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the identity file (private key)
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Give up on connecting after `timeout` (whole seconds, at least 1)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Toggle host key verification
    ///
    /// Freshly provisioned instances present unknown host keys, so test
    /// harnesses usually turn this off.
    pub fn with_strict_host_key_checking(mut self, strict: bool) -> Self {
        self.strict_host_key_checking = strict;
        self
    }

    /// Never prompt interactively
    pub fn with_batch_mode(mut self, batch: bool) -> Self {
        self.batch_mode = batch;
        self
    }

    /// Add extra SSH arguments
    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Use a different ssh client binary
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// The target host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the host string (user@host if user is specified)
    pub fn host_string(&self) -> String {
        if let Some(user) = &self.user {
            format!("{}@{}", user, self.host)
        } else {
            self.host.clone()
        }
    }

    /// Options placed between `ssh` and the destination
    fn options(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }

        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().into_owned());
            args.push("-o".to_string());
            args.push("IdentitiesOnly=yes".to_string());
        }

        if let Some(timeout) = self.connect_timeout {
            args.push("-o".to_string());
            args.push(format!("ConnectTimeout={}", timeout.as_secs().max(1)));
        }

        if !self.strict_host_key_checking {
            args.push("-o".to_string());
            args.push("StrictHostKeyChecking=no".to_string());
            args.push("-o".to_string());
            args.push("UserKnownHostsFile=/dev/null".to_string());
            args.push("-o".to_string());
            args.push("LogLevel=ERROR".to_string());
        }

        if self.batch_mode {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Wrap `command` so that it runs on this host
    ///
    /// The remote side receives a single shell line, so every argument of
    /// `command` is escaped individually.
    pub fn wrap(&self, command: &Command) -> Command {
        let mut ssh_cmd = Command::new(&self.program);
        ssh_cmd.args(self.options());
        ssh_cmd.arg(self.host_string());
        ssh_cmd.arg(command.to_string());
        ssh_cmd
    }
}

/// SSH launcher that wraps another launcher for remote execution
#[derive(Debug, Clone)]
pub struct SshLauncher<L> {
    inner: L,
    config: SshConfig,
}

impl<L> SshLauncher<L> {
    /// Create a new SSH launcher wrapping the given inner launcher
    pub fn new(inner: L, config: SshConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<L> Launcher for SshLauncher<L>
where
    L: Launcher,
{
    type EventStream = L::EventStream;
    type Handle = L::Handle;

    async fn launch(&self, command: Command) -> Result<(Self::EventStream, Self::Handle)> {
        let ssh_cmd = self.config.wrap(&command);
        tracing::debug!(host = %self.config.host_string(), command = %command, "launching over ssh");

        self.inner
            .launch(ssh_cmd)
            .await
            .map_err(|e| e.with_layer_context("SSH"))
    }
}
