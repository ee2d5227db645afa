//! Launcher trait for executing commands in different contexts

use crate::command::Command;
use crate::error::Result;
use crate::event::{ProcessEvent, ProcessEventType};
use crate::process::{ExitResult, ProcessHandle};
use async_trait::async_trait;
use futures::stream::Stream;

/// A launcher that can execute commands in a specific context
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    /// The event stream type this launcher produces
    type EventStream: Stream<Item = ProcessEvent> + Send + Unpin;

    /// The process handle type this launcher produces
    type Handle: ProcessHandle;

    /// Launch a command, returning event stream and control handle
    async fn launch(&self, command: Command) -> Result<(Self::EventStream, Self::Handle)>;

    /// Execute a command and wait for it to complete, capturing stdout and stderr
    async fn execute(&self, command: Command) -> Result<ExitResult> {
        use futures::StreamExt;

        let (mut events, mut handle) = self.launch(command).await?;
        let mut stdout: Vec<String> = Vec::new();
        let mut stderr: Vec<String> = Vec::new();

        while let Some(event) = events.next().await {
            match (event.event_type, event.data) {
                (ProcessEventType::Stdout, Some(line)) => stdout.push(line),
                (ProcessEventType::Stderr, Some(line)) => stderr.push(line),
                _ => {}
            }
        }

        let status = handle.wait().await?;
        Ok(ExitResult {
            status,
            stdout: stdout.join("\n"),
            stderr: stderr.join("\n"),
        })
    }
}
