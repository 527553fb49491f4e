//! HTTP surface of the gateway.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, Instrument};

use pulse_core::request::{ProcessedRequest, QueryRequest, RequestResponse};
use pulse_core::telemetry::{self, TraceContext, TRACEPARENT_HEADER};

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/query", post(submit_query))
        .route("/query/{request_id}", get(get_query_status))
        .route("/health", get(health))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

/// Pull the caller's trace context out of the HTTP headers, if any.
fn extract_trace(headers: &HeaderMap) -> Option<TraceContext> {
    headers
        .get(TRACEPARENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(TraceContext::parse)
}

async fn submit_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<Json<RequestResponse>, ApiError> {
    let ctx = extract_trace(&headers);
    let span = telemetry::server_span("POST", "/query", ctx.as_ref());

    async move {
        if request.query.trim().is_empty() {
            return Err(ApiError::BadRequest("query must not be empty".into()));
        }

        let response = state
            .service
            .submit_request(request, ctx.as_ref())
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(Json(response))
    }
    .instrument(span)
    .await
}

async fn get_query_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Result<Json<ProcessedRequest>, ApiError> {
    let ctx = extract_trace(&headers);
    let span = telemetry::server_span("GET", "/query/{request_id}", ctx.as_ref());

    async move {
        info!(request_id = %request_id, "status lookup");
        let record = state
            .service
            .get_request_status(&request_id)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        match record {
            Some(record) => Ok(Json(record)),
            None => Err(ApiError::NotFound(format!("request {request_id} not found"))),
        }
    }
    .instrument(span)
    .await
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    if state.state_store.is_healthy().await {
        (StatusCode::OK, Json(json!({"status": "healthy"}))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy"})),
        )
            .into_response()
    }
}
