//! In-memory model runner for tests.
//!
//! [`ScriptedProcess`] replays a fixed sequence of stdout fragments, stderr
//! text and exit behaviour. Clones share their kill counter and prompt log, so
//! a [`ScriptedRuntime`] can hand out copies while the test keeps observing.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::process::{ModelProcess, ModelRuntime, ProcessError, ProcessExit};

#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn incr(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitBehavior {
    /// Exits with this code as soon as all output has been read.
    Code(i32),
    /// Never exits until killed.
    Never,
}

#[derive(Debug, Clone)]
enum Step {
    Output(Duration, String),
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct ScriptedProcess {
    steps: VecDeque<Step>,
    stderr: String,
    stderr_open: bool,
    exit: ExitBehavior,
    input_closed: bool,
    killed: bool,
    kills: Counter,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl Default for ScriptedProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProcess {
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            stderr: String::new(),
            stderr_open: false,
            exit: ExitBehavior::Code(0),
            input_closed: false,
            killed: false,
            kills: Counter::default(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn output(self, text: impl Into<String>) -> Self {
        self.delayed_output(Duration::ZERO, text)
    }

    pub fn delayed_output(mut self, delay: Duration, text: impl Into<String>) -> Self {
        self.steps.push_back(Step::Output(delay, text.into()));
        self
    }

    pub fn read_error(mut self, message: impl Into<String>) -> Self {
        self.steps.push_back(Step::Fail(message.into()));
        self
    }

    pub fn stderr(mut self, text: impl Into<String>) -> Self {
        self.stderr = text.into();
        self
    }

    /// stderr never reaches end of stream, as with a runner whose child
    /// keeps the descriptor open.
    pub fn stderr_held_open(mut self) -> Self {
        self.stderr_open = true;
        self
    }

    pub fn exit(mut self, exit: ExitBehavior) -> Self {
        self.exit = exit;
        self
    }

    /// Simulate a runner that closed stdin before the prompt was written.
    pub fn closed_input(mut self) -> Self {
        self.input_closed = true;
        self
    }

    pub fn kill_counter(&self) -> Counter {
        self.kills.clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelProcess for ScriptedProcess {
    async fn write_prompt(&mut self, prompt: &str) -> Result<(), ProcessError> {
        if self.input_closed {
            return Err(ProcessError::PromptWrite(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "input stream already closed",
            )));
        }
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.input_closed = true;
        Ok(())
    }

    async fn read_chunk(&mut self) -> io::Result<Option<String>> {
        match self.steps.pop_front() {
            Some(Step::Output(delay, text)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(Some(text))
            }
            Some(Step::Fail(message)) => Err(io::Error::other(message)),
            None => Ok(None),
        }
    }

    async fn read_errors(&mut self) -> io::Result<String> {
        if self.stderr_open {
            std::future::pending::<()>().await;
        }
        Ok(std::mem::take(&mut self.stderr))
    }

    async fn try_exit(&mut self) -> io::Result<Option<ProcessExit>> {
        if self.killed {
            return Ok(Some(ProcessExit { code: None }));
        }
        Ok(match self.exit {
            ExitBehavior::Code(code) if self.steps.is_empty() => Some(ProcessExit { code: Some(code) }),
            _ => None,
        })
    }

    async fn wait(&mut self) -> io::Result<ProcessExit> {
        if let Some(exit) = self.try_exit().await? {
            return Ok(exit);
        }
        std::future::pending().await
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.kills.incr();
        self.killed = true;
        Ok(())
    }
}

/// Hands out a fresh copy of its template process on every spawn.
#[derive(Debug, Clone)]
pub struct ScriptedRuntime {
    template: Option<ScriptedProcess>,
    spawned: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRuntime {
    pub fn new(template: ScriptedProcess) -> Self {
        Self {
            template: Some(template),
            spawned: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A runtime whose runner binary cannot be started.
    pub fn unavailable() -> Self {
        Self {
            template: None,
            spawned: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Model names passed to successful spawns, in order.
    pub fn spawned_models(&self) -> Vec<String> {
        self.spawned.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ModelRuntime for ScriptedRuntime {
    async fn spawn(&self, model: &str) -> Result<Box<dyn ModelProcess>, ProcessError> {
        let template = self.template.as_ref().ok_or_else(|| ProcessError::Spawn {
            program: "scripted".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "runner not installed"),
        })?;
        if let Ok(mut spawned) = self.spawned.lock() {
            spawned.push(model.to_string());
        }
        Ok(Box::new(template.clone()))
    }
}
