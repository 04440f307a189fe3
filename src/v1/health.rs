use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

/// Reports the configured model without touching the runner.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        model: state.settings.model.clone(),
        timestamp: Utc::now(),
    };

    (StatusCode::OK, Json(response))
}
