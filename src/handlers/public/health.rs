// handlers/public/health.rs - GET /health handler
//
// Reports store reachability plus audit write failures since startup. Audit
// failures never degrade the status; they are surfaced so operators notice.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::app::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let audit = state.audit.health();

    match state.documents.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok",
                    "audit": audit,
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "code": "unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "audit": audit,
                    }
                })),
            )
        }
    }
}
