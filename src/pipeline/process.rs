//! Model runner process management.
//!
//! The runner is an external executable invoked as `<runner> run <model>`. It
//! reads the prompt from stdin until EOF, writes generated text to stdout and
//! diagnostics to stderr. [`ModelRuntime`] and [`ModelProcess`] are the seam
//! between that executable and the streaming logic in [`super::relay`].

use std::fmt;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start model runner '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to send prompt to model runner: {0}")]
    PromptWrite(#[source] io::Error),
}

/// Exit status of a finished runner process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code}"),
            None => f.write_str("signal"),
        }
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self { code: status.code() }
    }
}

#[async_trait]
pub trait ModelRuntime: Send + Sync {
    async fn spawn(&self, model: &str) -> Result<Box<dyn ModelProcess>, ProcessError>;
}

/// One running model process, exclusively owned by a single request.
#[async_trait]
pub trait ModelProcess: Send {
    /// Write the whole prompt to stdin and close it. Only the first call can succeed.
    async fn write_prompt(&mut self, prompt: &str) -> Result<(), ProcessError>;

    /// Whatever stdout text is available next, or `None` once stdout has ended.
    /// Pieces are not aligned to lines.
    async fn read_chunk(&mut self) -> io::Result<Option<String>>;

    /// Everything the process wrote to stderr. Completes when stderr closes.
    async fn read_errors(&mut self) -> io::Result<String>;

    async fn try_exit(&mut self) -> io::Result<Option<ProcessExit>>;

    async fn wait(&mut self) -> io::Result<ProcessExit>;

    async fn kill(&mut self) -> io::Result<()>;
}

/// Spawns the configured runner executable with piped stdio.
#[derive(Debug, Clone)]
pub struct CommandRuntime {
    program: String,
}

impl CommandRuntime {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ModelRuntime for CommandRuntime {
    async fn spawn(&self, model: &str) -> Result<Box<dyn ModelProcess>, ProcessError> {
        let mut child = Command::new(&self.program)
            .arg("run")
            .arg(model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take().map(collect_stderr);

        tracing::debug!(program = %self.program, model, pid = ?child.id(), "Spawned model runner");

        Ok(Box::new(ChildProcess {
            child,
            stdin,
            stdout,
            pending: Vec::new(),
            stderr,
        }))
    }
}

// Collected in the background so a full stderr pipe never stalls stdout.
fn collect_stderr(mut stderr: ChildStderr) -> JoinHandle<io::Result<String>> {
    tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

const READ_BUF_SIZE: usize = 8 * 1024;

/// Length of a trailing UTF-8 sequence that is cut short and needs more bytes.
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let b = bytes[bytes.len() - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match b {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

/// Decode everything in `pending` except an unfinished trailing character.
fn take_decoded(pending: &mut Vec<u8>) -> String {
    let split = pending.len() - incomplete_tail_len(pending);
    let text = String::from_utf8_lossy(&pending[..split]).into_owned();
    pending.drain(..split);
    text
}

struct ChildProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    pending: Vec<u8>,
    stderr: Option<JoinHandle<io::Result<String>>>,
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl ModelProcess for ChildProcess {
    async fn write_prompt(&mut self, prompt: &str) -> Result<(), ProcessError> {
        let mut stdin = self.stdin.take().ok_or_else(|| {
            ProcessError::PromptWrite(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "input stream already closed",
            ))
        })?;

        stdin
            .write_all(prompt.as_bytes())
            .await
            .map_err(ProcessError::PromptWrite)?;
        stdin.flush().await.map_err(ProcessError::PromptWrite)?;
        // dropping stdin closes the pipe and signals end of input
        drop(stdin);
        Ok(())
    }

    async fn read_chunk(&mut self) -> io::Result<Option<String>> {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            let Some(stdout) = self.stdout.as_mut() else {
                return Ok(None);
            };

            let n = stdout.read(&mut buf).await?;
            if n == 0 {
                self.stdout = None;
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.pending);
                return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
            }

            self.pending.extend_from_slice(&buf[..n]);
            let text = take_decoded(&mut self.pending);
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
    }

    async fn read_errors(&mut self) -> io::Result<String> {
        // Left in place if this future is cancelled, so Drop can abort it.
        let Some(handle) = self.stderr.as_mut() else {
            return Ok(String::new());
        };
        let collected = handle.await.map_err(io::Error::other);
        self.stderr = None;
        collected?
    }

    async fn try_exit(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.child.try_wait()?.map(ProcessExit::from))
    }

    async fn wait(&mut self) -> io::Result<ProcessExit> {
        Ok(self.child.wait().await?.into())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}

/// How a process ended once the request was done with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(ProcessExit),
    Killed,
    Failed,
}

/// Wait up to `timeout` for the process to exit on its own, then kill it.
pub async fn terminate(process: &mut dyn ModelProcess, timeout: Duration, request_id: &str) -> Termination {
    match process.try_exit().await {
        Ok(Some(exit)) => return Termination::Exited(exit),
        Ok(None) => {}
        Err(e) => tracing::warn!(request_id, error = %e, "Failed to poll model process status"),
    }

    match tokio::time::timeout(timeout, process.wait()).await {
        Ok(Ok(exit)) => Termination::Exited(exit),
        Ok(Err(e)) => {
            tracing::error!(request_id, error = %e, "Failed to wait for model process");
            force_kill(process, request_id).await
        }
        Err(_) => {
            let outcome = force_kill(process, request_id).await;
            tracing::warn!(
                request_id,
                timeout_secs = timeout.as_secs_f64(),
                "Forcibly terminated model process due to timeout"
            );
            outcome
        }
    }
}

async fn force_kill(process: &mut dyn ModelProcess, request_id: &str) -> Termination {
    match process.kill().await {
        Ok(()) => Termination::Killed,
        Err(e) => {
            tracing::error!(request_id, error = %e, "Failed to kill model process");
            Termination::Failed
        }
    }
}
