//! Route dispatch, request parsing, and the `{"error":{...}}` envelope
//! (built once as `AppError::into_response`).
//!
//! Split by concern into per-area files: `gate` for the gated proxy and
//! top-up flow, `hire` for the marketplace, `catalog` for the price catalog
//! and liveness probe.

pub mod catalog;
pub mod gate;
pub mod hire;

use axum::http::HeaderMap;
use axum::routing::get;
use axum::routing::patch;
use axum::routing::post;
use axum::Router;

use crate::state::Core;
use crate::AppError;

pub fn router(core: Core) -> Router {
    Router::new()
        .route("/api/v1/catalog", get(catalog::catalog))
        .route("/api/v1/health", get(catalog::health))
        .route("/api/v1/topup", post(gate::topup))
        .route("/api/v1/topup/claim", post(gate::topup_claim))
        .route("/api/v1/ai-for-hire/me", get(hire::me))
        .route("/api/v1/ai-for-hire/collect", post(hire::collect))
        .route("/api/v1/ai-for-hire/tasks", get(hire::list_tasks).post(hire::create_task))
        .route("/api/v1/ai-for-hire/tasks/:task_id", get(hire::get_task))
        .route("/api/v1/ai-for-hire/tasks/:task_id/quotes", post(hire::create_quote))
        .route("/api/v1/ai-for-hire/tasks/:task_id/quotes/:quote_id", patch(hire::update_quote))
        .route("/api/v1/ai-for-hire/tasks/:task_id/quotes/:quote_id/accept", post(hire::accept_quote))
        .route(
            "/api/v1/ai-for-hire/tasks/:task_id/quotes/:quote_id/messages",
            get(hire::get_messages).post(hire::send_message),
        )
        .route("/api/v1/ai-for-hire/tasks/:task_id/deliver", post(hire::deliver))
        .route("/api/v1/ai-for-hire/tasks/:task_id/confirm", post(hire::confirm))
        .route("/api/v1/:api_name/*endpoint_path", post(gate::proxy))
        .with_state(core)
}

/// Reads a bearer-style account token off either `X-Token` or a standard
/// `Authorization: Bearer <token>` header.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("X-Token").and_then(|v| v.to_str().ok()) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub fn require_token(headers: &HeaderMap) -> Result<String, AppError> {
    extract_token(headers).ok_or_else(|| AppError::AccountRequired("missing X-Token or Authorization: Bearer header".to_string()))
}

pub fn extract_l402(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok())?;
    value.strip_prefix("L402 ").map(str::to_string)
}
