use axum::{
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use motion_relay::SceneError;
use motion_relay::scene::write_atomic;
use std::io;
use tracing::{error, info};

use crate::AppState;

/// Largest model accepted by `PUT /api/model/update`
pub const MAX_MODEL_BYTES: usize = 256 * 1024 * 1024;

/// `GET /api/model` - the VRM file as a download
pub async fn get_model(State(state): State<AppState>) -> Response {
    let path = &state.config.vrm_file;
    match tokio::fs::read(path).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "model/gltf-binary"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=default.vrm",
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "No model uploaded").into_response()
        }
        Err(e) => {
            error!("Failed to read model {}: {}", path.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `PUT /api/model/update` - replace the VRM file with the request body
pub async fn update_model(State(state): State<AppState>, body: Bytes) -> StatusCode {
    if body.is_empty() {
        return StatusCode::BAD_REQUEST;
    }

    let path = state.config.vrm_file.clone();
    let len = body.len();
    let result = tokio::task::spawn_blocking(move || write_atomic(&path, &body))
        .await
        .map_err(|e| SceneError::Io(io::Error::other(e)))
        .and_then(|r| r);

    match result {
        Ok(()) => {
            info!("Stored new model ({} bytes)", len);
            StatusCode::NO_CONTENT
        }
        Err(e) => {
            error!(
                "Failed to store model at {}: {}",
                state.config.vrm_file.display(),
                e
            );
            state.metrics.save_error();
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
