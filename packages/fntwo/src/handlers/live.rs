//! Live WebSocket routes.
//!
//! Each connection runs its own loop and ends on the first send or receive
//! failure, on client close, or on server shutdown. Nothing here can take
//! down a sibling connection.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use motion_relay::{Camera, PoseStore, SceneSync};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::metrics::ServerMetrics;

/// `GET /live/read/model` - pose snapshots at the configured frequency
pub async fn read_model_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let store = state.store.clone();
    let interval = state.config.update_interval();
    let metrics = state.metrics.clone();
    let shutdown = state.shutdown.clone();

    ws.on_upgrade(move |socket| stream_pose(socket, store, interval, metrics, shutdown))
}

/// `GET /live/read/camera` - current camera, then every published camera
pub async fn read_camera_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let scene = state.scene.clone();
    let metrics = state.metrics.clone();
    let shutdown = state.shutdown.clone();

    ws.on_upgrade(move |socket| stream_camera(socket, scene, metrics, shutdown))
}

/// `GET /live/write/camera` - each frame is a camera to publish
pub async fn write_camera_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let scene = state.scene.clone();
    let metrics = state.metrics.clone();
    let shutdown = state.shutdown.clone();

    ws.on_upgrade(move |socket| ingest_camera(socket, scene, metrics, shutdown))
}

/// Whether an inbound frame from a read-only client ends the connection
fn is_disconnect(incoming: Option<Result<Message, axum::Error>>) -> bool {
    matches!(incoming, None | Some(Err(_)) | Some(Ok(Message::Close(_))))
}

async fn stream_pose(
    socket: WebSocket,
    store: Arc<PoseStore>,
    interval: Duration,
    metrics: Arc<ServerMetrics>,
    shutdown: CancellationToken,
) {
    let conn_id = uuid::Uuid::new_v4();
    info!(conn = %conn_id, "Model viewer connected");
    metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    // First tick fires immediately, which sends the initial pose
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let frame = match store.read(serde_json::to_string).await {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(conn = %conn_id, "Failed to serialize pose: {}", e);
                        break;
                    }
                };
                if let Err(e) = ws_sender.send(Message::Text(frame.into())).await {
                    debug!(conn = %conn_id, "Model viewer send failed: {}", e);
                    metrics.websocket_error();
                    break;
                }
                metrics.pose_frame_sent();
            }
            incoming = ws_receiver.next() => {
                if is_disconnect(incoming) {
                    break;
                }
            }
        }
    }

    metrics.connection_closed();
    info!(conn = %conn_id, "Model viewer disconnected");
}

async fn stream_camera(
    socket: WebSocket,
    scene: Arc<SceneSync>,
    metrics: Arc<ServerMetrics>,
    shutdown: CancellationToken,
) {
    let (current, subscription) = scene.subscribe().await;
    info!(subscriber = %subscription.id(), "Camera reader connected");
    metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut next = Some(current);

    loop {
        if let Some(camera) = next.take() {
            if !send_camera(&mut ws_sender, &camera, &metrics).await {
                break;
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            published = subscription.recv() => match published {
                Some(camera) => next = Some(camera),
                None => break,
            },
            incoming = ws_receiver.next() => {
                if is_disconnect(incoming) {
                    break;
                }
            }
        }
    }

    if subscription.dropped() > 0 {
        warn!(
            subscriber = %subscription.id(),
            "Camera reader fell behind, {} updates skipped",
            subscription.dropped()
        );
    }
    metrics.connection_closed();
    info!(subscriber = %subscription.id(), "Camera reader disconnected");
    // Dropping the subscription removes it from the pool
}

async fn send_camera<S>(sender: &mut S, camera: &Camera, metrics: &ServerMetrics) -> bool
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let frame = match serde_json::to_string(camera) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to serialize camera: {}", e);
            return false;
        }
    };
    match sender.send(Message::Text(frame.into())).await {
        Ok(()) => {
            metrics.camera_frame_sent();
            true
        }
        Err(e) => {
            debug!("Camera send failed: {}", e);
            metrics.websocket_error();
            false
        }
    }
}

async fn ingest_camera(
    mut socket: WebSocket,
    scene: Arc<SceneSync>,
    metrics: Arc<ServerMetrics>,
    shutdown: CancellationToken,
) {
    let conn_id = uuid::Uuid::new_v4();
    info!(conn = %conn_id, "Camera writer connected");
    metrics.connection_opened();

    loop {
        let incoming = tokio::select! {
            _ = shutdown.cancelled() => break,
            incoming = socket.recv() => incoming,
        };

        let parsed = match incoming {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<Camera>(text.as_str()),
            Some(Ok(Message::Binary(bytes))) => serde_json::from_slice::<Camera>(&bytes),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                debug!(conn = %conn_id, "Camera writer read failed: {}", e);
                metrics.websocket_error();
                break;
            }
        };

        let camera = match parsed {
            Ok(camera) => camera,
            Err(e) => {
                warn!(conn = %conn_id, "Malformed camera frame, closing: {}", e);
                metrics.camera_rejected();
                break;
            }
        };

        match scene.publish(camera).await {
            Ok(delivered) => {
                metrics.camera_updated();
                debug!(conn = %conn_id, "Camera published to {} readers", delivered);
            }
            Err(e) => {
                warn!(conn = %conn_id, "Rejected camera frame, closing: {}", e);
                metrics.camera_rejected();
                break;
            }
        }
    }

    metrics.connection_closed();
    info!(conn = %conn_id, "Camera writer disconnected");
}
