//! HTTP surface tests driven through the router with a scripted model runner.

use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header::CONTENT_TYPE, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use triage_server::pipeline::testing::{ExitBehavior, ScriptedProcess, ScriptedRuntime};
use triage_server::pipeline::PipelineSettings;
use triage_server::{router, AppState};

fn app_with(runtime: ScriptedRuntime) -> Router {
    let settings = PipelineSettings {
        kill_timeout: Duration::from_millis(50),
        ..PipelineSettings::default()
    };
    router(AppState::new(runtime, settings))
}

fn post(uri: &str, body: impl Into<Body>) -> Request {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn valid_body() -> String {
    json!({"name": "Ada", "age": 36, "symptoms": "headache and mild fever"}).to_string()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[cfg(test)]
mod triage_stream_tests {
    use super::*;

    #[tokio::test]
    async fn test_streams_model_output_as_plain_text() {
        let process = ScriptedProcess::new()
            .output("Drink water.\n")
            .output("Rest for a day")
            .output(" and monitor temperature.\n");
        let runtime = ScriptedRuntime::new(process.clone());
        let app = app_with(runtime.clone());

        let resp = app.oneshot(post("/api/triage_stream", valid_body())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get(CONTENT_TYPE).unwrap().to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            "Drink water.\nRest for a day and monitor temperature.\n"
        );

        assert_eq!(runtime.spawned_models(), vec!["tinyllama"]);
        let prompts = process.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- Name: Ada\n"));
        assert!(prompts[0].contains("- Age: 36\n"));
        assert!(prompts[0].contains("- Symptoms: headache and mild fever\n"));
    }

    #[tokio::test]
    async fn test_malformed_json_returns_400() {
        let app = app_with(ScriptedRuntime::new(ScriptedProcess::new()));

        let resp = app.oneshot(post("/api/triage_stream", "name=Ada&age=3")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["message"], "Invalid JSON");
    }

    #[tokio::test]
    async fn test_field_violations_return_422() {
        let cases = [
            (json!({"name": "Ada", "age": 0, "symptoms": "headache"}), "age"),
            (json!({"name": "Ada", "age": 120, "symptoms": "headache"}), "age"),
            (json!({"name": "", "age": 30, "symptoms": "headache"}), "name"),
            (json!({"name": "n".repeat(51), "age": 30, "symptoms": "headache"}), "name"),
            (json!({"name": "Ada", "age": 30, "symptoms": "ache"}), "symptoms"),
            (json!({"name": "Ada", "age": 30, "symptoms": "s".repeat(501)}), "symptoms"),
        ];

        for (body, field) in cases {
            let runtime = ScriptedRuntime::new(ScriptedProcess::new());
            let app = app_with(runtime.clone());
            let resp = app.oneshot(post("/api/triage_stream", body.to_string())).await.unwrap();

            assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY, "field {field}");
            let body = json_body(resp).await;
            assert_eq!(body["field"], field);
            assert!(body["detail"].as_str().unwrap().starts_with(field));
            assert!(runtime.spawned_models().is_empty());
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_returns_500() {
        let app = app_with(ScriptedRuntime::unavailable());

        let resp = app.oneshot(post("/api/triage_stream", valid_body())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["message"], "Failed to start AI model process");
    }

    #[tokio::test]
    async fn test_prompt_write_failure_returns_500() {
        let process = ScriptedProcess::new().closed_input();
        let app = app_with(ScriptedRuntime::new(process));

        let resp = app.oneshot(post("/api/triage_stream", valid_body())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["message"], "Error sending prompt to AI model");
    }

    #[tokio::test]
    async fn test_mid_stream_failure_is_reported_in_band() {
        let process = ScriptedProcess::new()
            .output("Stay hydrated.\n")
            .read_error("connection reset");
        let app = app_with(ScriptedRuntime::new(process));

        let resp = app.oneshot(post("/api/triage_stream", valid_body())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.starts_with("Stay hydrated.\n"));
        assert!(text.ends_with("[Error streaming AI output: connection reset]"));
    }

    #[tokio::test]
    async fn test_hung_runner_is_killed_and_response_completes() {
        let process = ScriptedProcess::new()
            .output("See a doctor if it persists.\n")
            .exit(ExitBehavior::Never);
        let kills = process.kill_counter();
        let app = app_with(ScriptedRuntime::new(process));

        let resp = app.oneshot(post("/api/triage_stream", valid_body())).await.unwrap();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();

        assert_eq!(&bytes[..], b"See a doctor if it persists.\n");
        assert_eq!(kills.get(), 1);
    }
}

#[cfg(test)]
mod other_route_tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_triage_returns_full_text() {
        let process = ScriptedProcess::new().output("Rest ").output("and fluids.\n");
        let app = app_with(ScriptedRuntime::new(process));

        let resp = app.oneshot(post("/api/triage", valid_body())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["response"], "Rest and fluids.\n");
    }

    #[tokio::test]
    async fn test_health_is_independent_of_runner() {
        let app = app_with(ScriptedRuntime::unavailable());

        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model"], "tinyllama");
    }

    #[tokio::test]
    async fn test_unknown_route_returns_404_message() {
        let app = app_with(ScriptedRuntime::new(ScriptedProcess::new()));

        let req = Request::builder()
            .uri("/api/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(resp).await["message"],
            "Resource not found. Please check the URL."
        );
    }
}
