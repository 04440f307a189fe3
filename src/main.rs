use clap::Parser;
use tracing_subscriber::EnvFilter;

use triage_server::{config::Config, pipeline::CommandRuntime, router, AppState};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .init();

    let state = AppState::new(CommandRuntime::new(&config.runner), config.settings());
    let app = router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("Triage server starting on http://{}", addr);
    tracing::info!("Runner: {} run {}", config.runner, config.model);
    tracing::info!("Available endpoints:");
    tracing::info!("  - GET  /api/health         - Health check");
    tracing::info!("  - POST /api/triage         - Triage advice (complete)");
    tracing::info!("  - POST /api/triage_stream  - Triage advice (streamed text)");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
