//! HTTP front end for a locally hosted model that gives patient triage advice.
//!
//! A request is validated, rendered into a prompt, written to a freshly
//! spawned `<runner> run <model>` process, and the process output is streamed
//! back as plain text. See [`pipeline`] for the request lifecycle.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

pub mod config;
pub mod error;
pub mod pipeline;
pub mod v1;

use pipeline::{ModelRuntime, PipelineSettings};

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<dyn ModelRuntime>,
    pub settings: Arc<PipelineSettings>,
}

impl AppState {
    pub fn new(runtime: impl ModelRuntime + 'static, settings: PipelineSettings) -> Self {
        Self {
            runtime: Arc::new(runtime),
            settings: Arc::new(settings),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/api/health", get(v1::health_check))
        .route("/api/triage_stream", post(v1::triage_stream))
        .route("/api/triage", post(v1::triage_complete));

    with_fallbacks(routes).with_state(state)
}

fn with_fallbacks(routes: Router<AppState>) -> Router<AppState> {
    routes
        .fallback(v1::not_found)
        .layer(CatchPanicLayer::custom(error::internal_error))
}
