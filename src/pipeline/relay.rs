use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use tokio::time::Instant;

use super::process::{ModelProcess, Termination, terminate};

pub const DEFAULT_CHUNK_THRESHOLD: usize = 50;
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Accumulates runner output and decides when to hand it to the client.
///
/// The buffer is flushed once it holds more than `threshold` characters or
/// contains a newline, whichever happens first.
#[derive(Debug)]
pub struct Chunker {
    threshold: usize,
    buffer: String,
    chars: usize,
}

impl Chunker {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            buffer: String::new(),
            chars: 0,
        }
    }

    pub fn push(&mut self, text: &str) -> Option<String> {
        self.buffer.push_str(text);
        self.chars += text.chars().count();

        if self.chars > self.threshold || text.contains('\n') {
            self.take()
        } else {
            None
        }
    }

    /// Remaining partial buffer, if any.
    pub fn finish(&mut self) -> Option<String> {
        self.take()
    }

    fn take(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        self.chars = 0;
        Some(std::mem::take(&mut self.buffer))
    }
}

/// Per-request progress through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Spawning,
    PromptSent,
    Streaming,
    DrainingErrors,
    Terminating,
    Done,
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub chunk_threshold: usize,
    pub kill_timeout: Duration,
    pub request_id: String,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            request_id: String::new(),
        }
    }
}

pub(crate) fn enter(stage: Stage, request_id: &str) {
    tracing::debug!(request_id, stage = ?stage, "Triage pipeline stage");
}

/// Stream the process's stdout as chunks, then drain stderr and terminate it.
///
/// Draining and terminating share one `kill_timeout` deadline that starts when
/// stdout ends. The process must already have its prompt. Read failures end the output with
/// a single diagnostic chunk; the process is still terminated afterwards.
/// Dropping the stream early drops the process handle.
pub fn relay(
    mut process: Box<dyn ModelProcess>,
    options: RelayOptions,
) -> impl Stream<Item = String> + Send {
    stream! {
        let request_id = options.request_id.as_str();
        let mut chunker = Chunker::new(options.chunk_threshold);
        let mut failed = false;

        enter(Stage::Streaming, request_id);
        loop {
            match process.read_chunk().await {
                Ok(Some(text)) => {
                    if let Some(chunk) = chunker.push(&text) {
                        yield chunk;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(request_id, error = %e, "Error streaming model output");
                    if let Some(rest) = chunker.finish() {
                        yield rest;
                    }
                    yield format!("\n[Error streaming AI output: {e}]");
                    failed = true;
                    break;
                }
            }
        }

        let deadline = Instant::now() + options.kill_timeout;
        let mut stderr = String::new();
        if !failed {
            if let Some(rest) = chunker.finish() {
                yield rest;
            }

            enter(Stage::DrainingErrors, request_id);
            match tokio::time::timeout_at(deadline, process.read_errors()).await {
                Ok(Ok(text)) => stderr = text.trim().to_string(),
                Ok(Err(e)) => tracing::warn!(request_id, error = %e, "Failed to read model stderr"),
                Err(_) => tracing::warn!(request_id, "Timed out draining model stderr"),
            }
            if !stderr.is_empty() {
                tracing::warn!(request_id, stderr = %stderr, "Model runner wrote to stderr");
            }
        }

        enter(Stage::Terminating, request_id);
        let remaining = deadline.saturating_duration_since(Instant::now());
        let termination = terminate(process.as_mut(), remaining, request_id).await;
        if let Termination::Exited(exit) = termination {
            if !exit.success() && !stderr.is_empty() {
                tracing::error!(request_id, status = %exit, "Model runner exited abnormally");
                yield format!("\n[Model process exited with status {exit}: {stderr}]");
            }
        }
        enter(Stage::Done, request_id);
    }
}
