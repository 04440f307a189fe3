use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use uuid::Uuid;

use crate::error::{TriageError, NOT_FOUND_MESSAGE};
use crate::pipeline::{self, TriageRequest};
use crate::AppState;

#[derive(Serialize)]
pub struct TriageResponse {
    pub response: String,
}

async fn begin(state: &AppState, body: &[u8]) -> Result<BoxStream<'static, String>, TriageError> {
    let request_id = Uuid::new_v4().to_string();
    let request = TriageRequest::parse(body).inspect_err(|e| {
        tracing::info!(request_id = %request_id, error = %e, "Rejected triage request");
    })?;

    tracing::info!(request_id = %request_id, age = request.age(), "Triage request accepted");

    let stream = pipeline::start(state.runtime.as_ref(), &state.settings, &request, &request_id).await?;
    Ok(stream)
}

/// `POST /api/triage_stream`: plain-text advice streamed as the model produces it.
pub async fn triage_stream(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, TriageError> {
    let stream = begin(&state, &body).await?;
    let body = Body::from_stream(stream.map(Ok::<_, Infallible>));

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8"),
         (header::CACHE_CONTROL, "no-cache")],
        body,
    ))
}

/// `POST /api/triage`: same pipeline, answered once the model has finished.
pub async fn triage_complete(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, TriageError> {
    let stream = begin(&state, &body).await?;
    let response: String = stream.collect::<Vec<_>>().await.concat();

    Ok((StatusCode::OK, Json(TriageResponse { response })))
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "message": NOT_FOUND_MESSAGE })),
    )
}
