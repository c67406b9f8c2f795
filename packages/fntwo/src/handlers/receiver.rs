use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use motion_relay::SwitchError;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ReceiverInfo {
    pub active: Option<String>,
    pub available: Vec<String>,
}

fn receiver_info(state: &AppState) -> ReceiverInfo {
    ReceiverInfo {
        active: state.registry.active_name(),
        available: state.registry.names(),
    }
}

/// `GET /api/receiver`
pub async fn get_receiver(State(state): State<AppState>) -> Json<ReceiverInfo> {
    Json(receiver_info(&state))
}

/// `PUT /api/receiver/update` - the body is the receiver name as plain text
pub async fn update_receiver(State(state): State<AppState>, body: String) -> Response {
    let name = body.trim();
    if name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Receiver name is required").into_response();
    }

    match state.registry.switch_to(name).await {
        Ok(()) => {
            state.metrics.receiver_switched();
            info!("Active receiver is now \"{}\"", name);
            Json(receiver_info(&state)).into_response()
        }
        Err(SwitchError::UnknownReceiver(name)) => {
            warn!("Switch to unknown receiver \"{}\" refused", name);
            (
                StatusCode::NOT_FOUND,
                format!("Unknown receiver: {}", name),
            )
                .into_response()
        }
        Err(e) => {
            error!("Receiver switch failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::Request,
        routing::{get, put},
    };
    use tower::ServiceExt;

    async fn test_router() -> (Router, AppState, tempfile::TempDir) {
        let (state, tmp) = crate::test_helpers::test_app_state().await;
        let router = Router::new()
            .route("/api/receiver", get(get_receiver))
            .route("/api/receiver/update", put(update_receiver))
            .with_state(state.clone());
        (router, state, tmp)
    }

    fn put_name(name: &str) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri("/api/receiver/update")
            .body(Body::from(name.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_receiver() {
        let (app, _state, _tmp) = test_router().await;
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/receiver")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["active"], "vmc");
        assert_eq!(json["available"], serde_json::json!(["vmc"]));
    }

    #[tokio::test]
    async fn test_switch_to_current_receiver() {
        let (app, state, _tmp) = test_router().await;
        let resp = app.oneshot(put_name("vmc\n")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(state.registry.active().unwrap().is_running());
        assert_eq!(state.metrics.snapshot().receiver_switches, 1);
    }

    #[tokio::test]
    async fn test_unknown_receiver_is_404() {
        let (app, state, _tmp) = test_router().await;
        let resp = app.oneshot(put_name("kinect")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.registry.active_name().as_deref(), Some("vmc"));
        assert_eq!(state.metrics.snapshot().receiver_switches, 0);
    }

    #[tokio::test]
    async fn test_empty_name_is_400() {
        let (app, _state, _tmp) = test_router().await;
        let resp = app.oneshot(put_name("  ")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
