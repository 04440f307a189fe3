pub mod health;
pub mod triage;

pub use health::{health_check, HealthResponse};
pub use triage::{not_found, triage_complete, triage_stream, TriageResponse};
