//! Runtime-agnostic shell command execution
//!
//! Commands are described once with [`Command`] and handed to a [`Launcher`],
//! which decides where they run. [`LocalLauncher`](backends::local::LocalLauncher)
//! spawns them on this machine; [`SshLauncher`](backends::ssh::SshLauncher)
//! wraps any other launcher and runs the command on a remote host through the
//! `ssh` client.

#![warn(missing_docs)]

pub mod backends;
pub mod command;
pub mod error;
pub mod event;
pub mod launcher;
pub mod process;

pub use backends::local::LocalLauncher;
pub use backends::ssh::{SshConfig, SshLauncher};
pub use command::Command;
pub use error::{Error, Result};
pub use event::{ProcessEvent, ProcessEventType};
pub use launcher::Launcher;
pub use process::{ExitResult, ExitStatus, ProcessHandle};
