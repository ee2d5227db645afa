//! Local process execution backend

use async_process::{Child, Stdio};
use async_trait::async_trait;
use futures::stream::Stream;
use futures_lite::io::{AsyncBufReadExt, BufReader, Split};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::event::{ProcessEvent, ProcessEventType};
use crate::launcher::Launcher;
use crate::process::{ExitStatus, ProcessHandle};

/// Launcher for executing processes locally
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncher;

/// A handle to control a local process; the process is killed when the handle is dropped
pub struct LocalProcessHandle {
    /// The underlying child process
    child: Child,
}

/// Stream of process events
///
/// Output is split on `\n` as raw bytes and decoded lossily, so invalid
/// UTF-8 never ends a stream early.
pub struct ProcessEventStream {
    stdout: Option<Split<BufReader<async_process::ChildStdout>>>,
    stderr: Option<Split<BufReader<async_process::ChildStderr>>>,
    started_sent: bool,
    child_id: u32,
}

#[async_trait]
impl Launcher for LocalLauncher {
    type EventStream = ProcessEventStream;
    type Handle = LocalProcessHandle;

    async fn launch(&self, command: Command) -> Result<(Self::EventStream, Self::Handle)> {
        let mut async_cmd = command.prepare();
        async_cmd.stdin(Stdio::null());
        async_cmd.stdout(Stdio::piped());
        async_cmd.stderr(Stdio::piped());

        let program = command.get_program().to_string_lossy().into_owned();
        let mut child = async_cmd
            .spawn()
            .map_err(|e| Error::spawn_failed(&program, e.to_string()))?;

        let child_id = child.id();
        debug!(pid = child_id, %program, "spawned local process");

        let stdout = child.stdout.take().map(|s| BufReader::new(s).split(b'\n'));
        let stderr = child.stderr.take().map(|s| BufReader::new(s).split(b'\n'));

        let events = ProcessEventStream {
            stdout,
            stderr,
            started_sent: false,
            child_id,
        };

        let handle = LocalProcessHandle { child };

        Ok((events, handle))
    }
}

impl LocalProcessHandle {
    #[cfg(unix)]
    fn signal(&self, sig: nix::sys::signal::Signal) -> Result<()> {
        use nix::sys::signal;
        use nix::unistd::Pid;

        let pid = Pid::from_raw(self.child.id() as i32);
        signal::kill(pid, sig).map_err(|e| Error::signal_failed(sig as i32, e.to_string()))
    }
}

#[async_trait]
impl ProcessHandle for LocalProcessHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.status().await?;
        Ok(status.into())
    }

    async fn terminate(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            self.signal(nix::sys::signal::Signal::SIGTERM)
        }

        #[cfg(not(unix))]
        {
            self.child
                .kill()
                .map_err(|e| Error::signal_failed(-1, e.to_string()))
        }
    }

    async fn kill(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            self.signal(nix::sys::signal::Signal::SIGKILL)
        }

        #[cfg(not(unix))]
        {
            self.child
                .kill()
                .map_err(|e| Error::signal_failed(-1, e.to_string()))
        }
    }
}

impl Drop for LocalProcessHandle {
    fn drop(&mut self) {
        // Synchronous kill; errors mean the process already exited
        let _ = self.child.kill();
    }
}

/// Turn one raw output line into text, dropping a trailing `\r`
fn decode_line(mut line: Vec<u8>) -> String {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8_lossy(&line).into_owned()
}

impl Stream for ProcessEventStream {
    type Item = ProcessEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.started_sent {
            self.started_sent = true;
            let event = ProcessEvent::new(ProcessEventType::Started { pid: self.child_id });
            return Poll::Ready(Some(event));
        }

        if let Some(stdout) = &mut self.stdout {
            match Pin::new(stdout).poll_next(cx) {
                Poll::Ready(Some(Ok(line))) => {
                    return Poll::Ready(Some(ProcessEvent::new_with_data(
                        ProcessEventType::Stdout,
                        decode_line(line),
                    )));
                }
                // EOF, or a read error on the pipe itself
                Poll::Ready(Some(Err(_))) | Poll::Ready(None) => self.stdout = None,
                Poll::Pending => {}
            }
        }

        if let Some(stderr) = &mut self.stderr {
            match Pin::new(stderr).poll_next(cx) {
                Poll::Ready(Some(Ok(line))) => {
                    return Poll::Ready(Some(ProcessEvent::new_with_data(
                        ProcessEventType::Stderr,
                        decode_line(line),
                    )));
                }
                Poll::Ready(Some(Err(_))) | Poll::Ready(None) => self.stderr = None,
                Poll::Pending => {}
            }
        }

        if self.stdout.is_none() && self.stderr.is_none() {
            return Poll::Ready(None);
        }

        Poll::Pending
    }
}
