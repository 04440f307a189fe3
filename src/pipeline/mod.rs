pub mod process;
pub mod prompt;
pub mod relay;
pub mod request;
pub mod testing;

use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;

pub use process::{CommandRuntime, ModelProcess, ModelRuntime, ProcessError, ProcessExit, Termination};
pub use prompt::build_prompt;
pub use relay::{Chunker, RelayOptions, Stage, relay};
pub use request::{MalformedInputError, RequestError, TriageRequest, ValidationError};

use process::terminate;
use relay::enter;

/// Knobs shared by every request.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    pub chunk_threshold: usize,
    pub kill_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            model: "tinyllama".to_string(),
            chunk_threshold: relay::DEFAULT_CHUNK_THRESHOLD,
            kill_timeout: relay::DEFAULT_KILL_TIMEOUT,
        }
    }
}

/// Spawn the runner, hand it the prompt for `request`, and return the output stream.
///
/// Errors here happen before any response bytes exist. If the prompt cannot be
/// written the process is terminated before returning.
pub async fn start(
    runtime: &dyn ModelRuntime,
    settings: &PipelineSettings,
    request: &TriageRequest,
    request_id: &str,
) -> Result<BoxStream<'static, String>, ProcessError> {
    let prompt = build_prompt(request);

    enter(Stage::Spawning, request_id);
    let mut process = runtime.spawn(&settings.model).await.inspect_err(|e| {
        tracing::error!(request_id, model = %settings.model, error = %e, "Failed to start model process");
    })?;

    if let Err(e) = process.write_prompt(&prompt).await {
        tracing::error!(request_id, error = %e, "Error writing prompt to model process");
        enter(Stage::Terminating, request_id);
        terminate(process.as_mut(), settings.kill_timeout, request_id).await;
        enter(Stage::Done, request_id);
        return Err(e);
    }
    enter(Stage::PromptSent, request_id);
    tracing::info!(request_id, model = %settings.model, prompt_len = prompt.len(), "Prompt sent to model");

    Ok(relay(
        process,
        RelayOptions {
            chunk_threshold: settings.chunk_threshold,
            kill_timeout: settings.kill_timeout,
            request_id: request_id.to_string(),
        },
    )
    .boxed())
}
