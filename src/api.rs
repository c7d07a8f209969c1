//! REST API server for the campus assistant
//!
//! Thin axum surface over the response pipeline and the health monitor.
//! The dashboard UI consumes these endpoints; everything interesting
//! happens in the layers below.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::AssistantError;
use crate::health::HealthMonitor;
use crate::models::{StudentRecords, UserRole};
use crate::pipeline::ResponsePipeline;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: Option<String>,
    pub role: Option<String>,
    /// The calling user's own records, supplied by the authenticated
    /// dashboard session.
    pub context: Option<StudentRecords>,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub user_id: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<ResponsePipeline>,
    pub monitor: HealthMonitor,
}

/// =============================
/// Helpers — External Identities
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn parse_or_stable_uuid(value: Option<&str>, fallback_seed: &str) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => stable_uuid_from_string(fallback_seed),
    }
}

/// =============================
/// Health Endpoints
/// =============================

async fn health(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.monitor.status()))
}

async fn health_refresh(State(state): State<ApiState>) -> Json<ApiResponse> {
    state.monitor.force_check();
    Json(ApiResponse::success(serde_json::json!({
        "refresh": "started"
    })))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Empty message".into())),
        );
    }

    let user_id = parse_or_stable_uuid(req.user_id.as_deref(), "anonymous-user");
    let role = req
        .role
        .as_deref()
        .map(UserRole::parse_lenient)
        .unwrap_or(UserRole::Student);
    let records = req.context.unwrap_or_default();

    info!(user = %user_id, role = %role, "chat request received");

    match state.pipeline.handle(user_id, role, &req.message, &records).await {
        Ok(turn) => (StatusCode::OK, Json(ApiResponse::success(turn))),
        // Contract errors are the caller's bug; everything else has
        // already been converted into a turn by the pipeline.
        Err(e @ AssistantError::InvalidContext(_)) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("Invalid context: {}", e))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Chat handling failed: {}", e))),
        ),
    }
}

/// =============================
/// Session Endpoints
/// =============================

async fn session_reset(
    State(state): State<ApiState>,
    Json(req): Json<SessionRequest>,
) -> Json<ApiResponse> {
    let user_id = parse_or_stable_uuid(req.user_id.as_deref(), "anonymous-user");
    let welcome = state.pipeline.reset_session(user_id).await;
    Json(ApiResponse::success(welcome))
}

async fn session_history(
    State(state): State<ApiState>,
    Query(query): Query<SessionQuery>,
) -> Json<ApiResponse> {
    let user_id = parse_or_stable_uuid(query.user_id.as_deref(), "anonymous-user");
    let turns = state.pipeline.history(user_id).await;
    Json(ApiResponse::success(turns))
}

async fn session_stats(
    State(state): State<ApiState>,
    Query(query): Query<SessionQuery>,
) -> Json<ApiResponse> {
    let user_id = parse_or_stable_uuid(query.user_id.as_deref(), "anonymous-user");
    let stats = state.pipeline.session_stats(user_id).await;
    Json(ApiResponse::success(stats))
}

/// =============================
/// Router
/// =============================

pub fn create_router(pipeline: Arc<ResponsePipeline>, monitor: HealthMonitor) -> Router {
    let state = ApiState { pipeline, monitor };

    Router::new()
        .route("/health", get(health))
        .route("/health/refresh", post(health_refresh))
        .route("/api/chat", post(chat_handler))
        .route("/api/session/reset", post(session_reset))
        .route("/api/session/history", get(session_history))
        .route("/api/session/stats", get(session_stats))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    pipeline: Arc<ResponsePipeline>,
    monitor: HealthMonitor,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(pipeline, monitor);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_uuid_is_deterministic() {
        let a = stable_uuid_from_string("student-42");
        let b = stable_uuid_from_string("student-42");
        let c = stable_uuid_from_string("student-43");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_parse_or_stable_uuid_accepts_real_uuids() {
        let real = uuid::Uuid::new_v4();
        let parsed = parse_or_stable_uuid(Some(&real.to_string()), "fallback");
        assert_eq!(parsed, real);

        let derived = parse_or_stable_uuid(Some("jsmith"), "fallback");
        assert_eq!(derived, stable_uuid_from_string("jsmith"));

        let fallback = parse_or_stable_uuid(None, "anonymous-user");
        assert_eq!(fallback, stable_uuid_from_string("anonymous-user"));
    }
}
