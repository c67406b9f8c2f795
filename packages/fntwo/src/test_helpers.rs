use motion_relay::{PoseStore, Scene, SceneSync};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::AppState;
use crate::config::AppConfig;
use crate::metrics::ServerMetrics;

/// Build a fully-wired `AppState` whose files live in a temp directory and
/// whose VMC receiver is already listening on an ephemeral localhost port.
///
/// Returns `(AppState, TempDir)`; callers **must** hold the `TempDir` for
/// the lifetime of the test so the scene and model paths stay valid.
pub async fn test_app_state() -> (AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");

    let mut config = AppConfig::defaults(tmp.path());
    config.vmc.ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.vmc.port = 0;
    config.pool.queue_capacity = 4;

    let store = Arc::new(PoseStore::new());
    let registry = Arc::new(crate::build_registry(&config, &store));
    registry.start_active().await.expect("start receiver");

    let scene = Arc::new(SceneSync::new(
        Scene::default(),
        config.scene_file.clone(),
        config.pool.queue_capacity,
    ));

    let state = AppState {
        config: Arc::new(config),
        store,
        registry,
        scene,
        metrics: Arc::new(ServerMetrics::new()),
        shutdown: CancellationToken::new(),
    };
    (state, tmp)
}
