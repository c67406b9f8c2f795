use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::metrics;

fn receiver_health(state: &AppState) -> metrics::ReceiverHealth {
    let active = state.registry.active();
    metrics::ReceiverHealth {
        active: state.registry.active_name(),
        running: active.is_some_and(|r| r.is_running()),
    }
}

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let receiver = receiver_health(&state);
    let metrics = state.metrics.snapshot();

    let status = if receiver.running { "healthy" } else { "degraded" };

    Json(metrics::HealthStatus {
        status: status.to_string(),
        receiver,
        connections: metrics.connections.active,
        uptime_secs: metrics.uptime_secs,
    })
}

/// Metrics endpoint - server counters plus receiver and camera-pool figures
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let active = state.registry.active();
    let pool = state.scene.pool();

    Json(metrics::MetricsReport {
        server: state.metrics.snapshot(),
        receiver: metrics::ReceiverReport {
            active: state.registry.active_name(),
            running: active.as_ref().is_some_and(|r| r.is_running()),
            stats: active.map(|r| r.stats()).unwrap_or_default(),
        },
        camera_pool: metrics::PoolReport {
            subscribers: pool.len(),
            dropped: pool.dropped_total(),
        },
    })
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Readiness probe - returns 200 once the active receiver is listening
pub async fn health_ready_handler(State(state): State<AppState>) -> Response {
    let receiver = receiver_health(&state);

    if receiver.running {
        Json(serde_json::json!({
            "status": "ready",
            "receiver": receiver.active
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "receiver": receiver.active
            })),
        )
            .into_response()
    }
}
