use std::time::Duration;

use clap::Parser;

use crate::pipeline::PipelineSettings;

#[derive(Debug, Clone, Parser)]
#[command(name = "triage-server", version, about = "Streams triage advice from a local model runner")]
pub struct Config {
    /// Address to bind the HTTP server to
    #[arg(long, env = "TRIAGE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "TRIAGE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Runner executable, invoked as `<runner> run <model>`
    #[arg(long, env = "TRIAGE_RUNNER", default_value = "ollama")]
    pub runner: String,

    #[arg(long, env = "TRIAGE_MODEL", default_value = "tinyllama")]
    pub model: String,

    /// Flush buffered output once it exceeds this many characters
    #[arg(
        long,
        env = "TRIAGE_CHUNK_THRESHOLD",
        default_value_t = 50,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub chunk_threshold: u32,

    /// Seconds to wait for the runner to exit before killing it
    #[arg(long, env = "TRIAGE_KILL_TIMEOUT_SECS", default_value_t = 5)]
    pub kill_timeout_secs: u64,

    /// Log filter, e.g. `info` or `triage_server=debug`
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            model: self.model.clone(),
            chunk_threshold: self.chunk_threshold as usize,
            kill_timeout: Duration::from_secs(self.kill_timeout_secs),
        }
    }
}
