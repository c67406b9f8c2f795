use axum::{Json, extract::State, http::StatusCode};
use motion_relay::Scene;
use tracing::error;

use crate::AppState;
use crate::config::AppConfig;

/// `GET /api/config/scene`
pub async fn get_scene(State(state): State<AppState>) -> Json<Scene> {
    Json(state.scene.scene().await)
}

/// `PUT /api/config/scene/update` - persist the in-memory scene
pub async fn save_scene(State(state): State<AppState>) -> StatusCode {
    match state.scene.save().await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            error!(
                "Failed to save scene to {}: {}",
                state.scene.path().display(),
                e
            );
            state.metrics.save_error();
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// `GET /api/config/app`
pub async fn get_app_config(State(state): State<AppState>) -> Json<AppConfig> {
    Json(state.config.as_ref().clone())
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
    use motion_relay::{Camera, Vec3};
    use tower::ServiceExt;

    async fn test_router() -> (Router, crate::AppState, tempfile::TempDir) {
        let (state, tmp) = crate::test_helpers::test_app_state().await;
        let router = Router::new()
            .route("/api/config/scene", get(get_scene))
            .route("/api/config/scene/update", put(save_scene))
            .route("/api/config/app", get(get_app_config))
            .with_state(state.clone());
        (router, state, tmp)
    }

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_get_scene_reflects_published_camera() {
        let (app, state, _tmp) = test_router().await;
        state
            .scene
            .publish(Camera {
                position: Vec3::new(1.0, 2.0, 3.0),
                target: Vec3::new(0.0, 0.0, 0.0),
            })
            .await
            .unwrap();

        let json = get_json(app, "/api/config/scene").await;
        assert_eq!(json["camera"]["position"]["y"], 2.0);
    }

    #[tokio::test]
    async fn test_save_scene_writes_file() {
        let (app, state, _tmp) = test_router().await;
        assert!(!state.scene.path().exists());

        let resp = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/config/scene/update")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let saved: serde_json::Value =
            serde_json::from_slice(&std::fs::read(state.scene.path()).unwrap()).unwrap();
        assert_eq!(saved["camera"]["position"]["z"], 2.0);
    }

    #[tokio::test]
    async fn test_get_app_config() {
        let (app, state, _tmp) = test_router().await;
        let json = get_json(app, "/api/config/app").await;
        assert_eq!(json["update_frequency"], state.config.update_frequency);
        assert_eq!(json["receiver"], "vmc");
    }
}
