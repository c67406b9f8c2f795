//! End-to-end tests: a real HTTP server on an ephemeral port, real VMC
//! datagrams into the running receiver, and real WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use motion_relay::decoder::{BLEND_VAL, BONE_POS};
use motion_relay::osc::{OscArg, OscMessage, encode_bundle};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::AppState;
use crate::test_helpers::test_app_state;

/// Timeout for each async operation in tests.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the full router on 127.0.0.1:0, return the bound address.
async fn start_server(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind http");
    let addr = listener.local_addr().unwrap();
    let app = crate::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, path: &str) -> WsClient {
    let (ws, _) = timeout(
        TEST_TIMEOUT,
        tokio_tungstenite::connect_async(format!("ws://{}{}", addr, path)),
    )
    .await
    .expect("connect timed out")
    .expect("websocket handshake");
    ws
}

/// Next text frame parsed as JSON; other frame kinds are skipped
async fn next_json(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = timeout(TEST_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame is JSON");
        }
    }
}

/// Whether the server ended the connection
async fn is_closed(ws: &mut WsClient) -> bool {
    loop {
        match timeout(TEST_TIMEOUT, ws.next()).await {
            Err(_) => return false,
            Ok(None | Some(Err(_)) | Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => continue,
        }
    }
}

fn vmc_addr(state: &AppState) -> SocketAddr {
    state
        .registry
        .active()
        .and_then(|r| r.local_addr())
        .expect("receiver is listening")
}

fn camera_json(x: f32) -> String {
    serde_json::json!({
        "position": {"x": x, "y": 1.0, "z": 2.0},
        "target": {"x": 0.0, "y": 1.0, "z": 0.0}
    })
    .to_string()
}

#[tokio::test]
async fn test_vmc_datagram_reaches_model_viewer() {
    let (state, _tmp) = test_app_state().await;
    let vmc = vmc_addr(&state);
    let http = start_server(state.clone()).await;

    let bundle = encode_bundle(&[
        OscMessage::new(
            BONE_POS,
            vec![
                OscArg::Str("Hips".into()),
                OscArg::Float(1.5),
                OscArg::Float(0.9),
                OscArg::Float(0.0),
                OscArg::Float(0.0),
                OscArg::Float(0.0),
                OscArg::Float(0.0),
                OscArg::Float(1.0),
            ],
        ),
        OscMessage::new(
            BLEND_VAL,
            vec![OscArg::Str("EyeBlink_L".into()), OscArg::Float(0.5)],
        ),
    ]);
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(&bundle, vmc).await.unwrap();

    let mut viewer = connect(http, "/live/read/model").await;
    // The datagram may land after the first tick; keep reading until it shows
    let pose = timeout(TEST_TIMEOUT, async {
        loop {
            let pose = next_json(&mut viewer).await;
            if pose["bones"]["hips"].is_object() {
                return pose;
            }
        }
    })
    .await
    .expect("pose never arrived");

    assert_eq!(pose["bones"]["hips"]["position"]["x"], 1.5);
    assert_eq!(pose["bones"]["hips"]["rotation"]["w"], 1.0);
    assert_eq!(pose["blendShapes"]["eye_blink_left"], 0.5);
    assert!(state.metrics.snapshot().frames.pose_sent >= 1);
}

#[tokio::test]
async fn test_model_viewer_gets_frames_at_frequency() {
    let (state, _tmp) = test_app_state().await;
    let http = start_server(state.clone()).await;

    let mut viewer = connect(http, "/live/read/model").await;
    // Immediate first frame, then one per tick
    for _ in 0..3 {
        let pose = next_json(&mut viewer).await;
        assert!(pose["bones"].is_object());
        assert!(pose["blendShapes"].is_object());
    }
}

#[tokio::test]
async fn test_camera_write_reaches_every_reader() {
    let (state, _tmp) = test_app_state().await;
    let http = start_server(state.clone()).await;

    let mut reader_a = connect(http, "/live/read/camera").await;
    let mut reader_b = connect(http, "/live/read/camera").await;

    // Current camera first
    for reader in [&mut reader_a, &mut reader_b] {
        let initial = next_json(reader).await;
        assert_eq!(initial["position"]["z"], 2.0);
        assert_eq!(initial["target"]["y"], 1.0);
    }

    let mut writer = connect(http, "/live/write/camera").await;
    for x in [1.0f32, 2.0, 3.0] {
        writer.send(Message::Text(camera_json(x).into())).await.unwrap();
    }

    // Every reader sees every camera in write order
    for reader in [&mut reader_a, &mut reader_b] {
        for x in [1.0, 2.0, 3.0] {
            let camera = next_json(reader).await;
            assert_eq!(camera["position"]["x"], x);
        }
    }
    assert_eq!(state.scene.camera().await.position.x, 3.0);
    assert_eq!(state.metrics.snapshot().frames.camera_updates, 3);
}

#[tokio::test]
async fn test_malformed_camera_closes_only_the_writer() {
    let (state, _tmp) = test_app_state().await;
    let http = start_server(state.clone()).await;

    let mut reader = connect(http, "/live/read/camera").await;
    next_json(&mut reader).await;

    let mut bad_writer = connect(http, "/live/write/camera").await;
    bad_writer
        .send(Message::Text("{\"position\": \"nowhere\"}".to_string().into()))
        .await
        .unwrap();
    assert!(is_closed(&mut bad_writer).await);
    assert_eq!(state.metrics.snapshot().frames.camera_rejected, 1);

    // The camera is untouched and other connections keep working
    assert_eq!(state.scene.camera().await.position.z, 2.0);
    let mut writer = connect(http, "/live/write/camera").await;
    writer.send(Message::Text(camera_json(7.0).into())).await.unwrap();
    assert_eq!(next_json(&mut reader).await["position"]["x"], 7.0);
}

#[tokio::test]
async fn test_overflowing_camera_is_rejected_and_scene_stays_loadable() {
    let (state, _tmp) = test_app_state().await;
    let http = start_server(state.clone()).await;

    let mut reader = connect(http, "/live/read/camera").await;
    next_json(&mut reader).await;

    let mut writer = connect(http, "/live/write/camera").await;
    let overflow = r#"{"position":{"x":1e39,"y":1,"z":2},"target":{"x":0,"y":1,"z":0}}"#;
    writer
        .send(Message::Text(overflow.to_string().into()))
        .await
        .unwrap();
    assert!(is_closed(&mut writer).await);
    assert_eq!(state.metrics.snapshot().frames.camera_rejected, 1);
    assert_eq!(state.metrics.snapshot().frames.camera_updates, 0);

    // Saved scene still reloads with the old camera
    state.scene.save().await.unwrap();
    let reloaded = motion_relay::SceneSync::load(state.scene.path(), 4)
        .await
        .unwrap();
    assert_eq!(reloaded.camera().await, motion_relay::Camera::default());

    // Readers never saw it; the next good camera is the next frame
    let mut writer = connect(http, "/live/write/camera").await;
    writer.send(Message::Text(camera_json(4.0).into())).await.unwrap();
    assert_eq!(next_json(&mut reader).await["position"]["x"], 4.0);
}

#[tokio::test]
async fn test_disconnected_reader_leaves_the_pool() {
    let (state, _tmp) = test_app_state().await;
    let http = start_server(state.clone()).await;

    let mut reader = connect(http, "/live/read/camera").await;
    next_json(&mut reader).await;
    assert_eq!(state.scene.pool().len(), 1);

    reader.close(None).await.unwrap();
    drop(reader);

    timeout(TEST_TIMEOUT, async {
        while !state.scene.pool().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscription was not removed");
    assert_eq!(state.scene.publish(Default::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_shutdown_ends_live_connections() {
    let (state, _tmp) = test_app_state().await;
    let http = start_server(state.clone()).await;

    let mut viewer = connect(http, "/live/read/model").await;
    let mut reader = connect(http, "/live/read/camera").await;
    next_json(&mut viewer).await;
    next_json(&mut reader).await;

    state.shutdown.cancel();
    assert!(is_closed(&mut viewer).await);
    assert!(is_closed(&mut reader).await);
}

mod router {
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use crate::test_helpers::test_app_state;

    #[tokio::test]
    async fn test_cors_is_permissive() {
        let (state, _tmp) = test_app_state().await;
        let resp = crate::router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/receiver")
                    .header("origin", "http://viewer.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_receiver_switch_keeps_listening() {
        let (state, _tmp) = test_app_state().await;
        let resp = crate::router(state.clone())
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/receiver/update")
                    .body(Body::from("vmc"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let info: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(info["active"], "vmc");
        assert!(state.registry.active().unwrap().is_running());
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (state, _tmp) = test_app_state().await;
        let resp = crate::router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/nothing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_model_upload_limit_allows_large_bodies() {
        let (state, _tmp) = test_app_state().await;
        // Above axum's 2 MiB default
        let model = vec![7u8; 3 * 1024 * 1024];
        let resp = crate::router(state.clone())
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/model/update")
                    .body(Body::from(model.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(std::fs::read(&state.config.vrm_file).unwrap().len(), model.len());
    }
}
