use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::state::AppState;

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = state.load_balancer.healthy_count();
    let status = if healthy > 0 { "healthy" } else { "degraded" };

    Json(serde_json::json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "upstreams": {
            "healthy": healthy,
            "total": state.load_balancer.upstreams().len(),
        },
        "tracked_identifiers": state.rate_limiter.store().len(),
    }))
}
