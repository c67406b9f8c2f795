use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, put},
};
use clap::Parser;
use motion_relay::{PoseStore, ReceiverRegistry, SceneSync, SwitchError, VmcReceiver};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::MakeSpan;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use uuid::Uuid;

mod config;
#[cfg(test)]
mod e2e_tests;
mod handlers;
mod metrics;
#[cfg(test)]
mod test_helpers;

use crate::config::{AppConfig, AppDirs, Overrides};
use crate::metrics::ServerMetrics;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Parser)]
#[command(name = "fntwo")]
#[command(about = "Relay a motion-captured avatar and a shared camera to browser viewers")]
struct Cli {
    /// Config file (defaults to config.toml in the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<AppConfig>,
    /// The live pose every receiver writes into
    pub store: Arc<PoseStore>,
    pub registry: Arc<ReceiverRegistry>,
    pub scene: Arc<SceneSync>,
    pub metrics: Arc<ServerMetrics>,
    /// Cancelled on shutdown so open WebSocket loops return
    pub shutdown: CancellationToken,
}

/// Register every known receiver against `store`
pub(crate) fn build_registry(config: &AppConfig, store: &Arc<PoseStore>) -> ReceiverRegistry {
    let mut registry = ReceiverRegistry::new();
    registry.register(
        "vmc",
        Arc::new(VmcReceiver::new(config.vmc.addr(), store.clone())),
    );
    registry
}

/// Start the configured receiver, falling back to the default one if the
/// configured name is not registered
async fn activate_receiver(registry: &ReceiverRegistry, name: &str) -> Result<()> {
    match registry.switch_to(name).await {
        Ok(()) => Ok(()),
        Err(SwitchError::UnknownReceiver(name)) => {
            warn!(
                "Configured receiver \"{}\" does not exist, starting \"{}\"",
                name,
                registry.active_name().unwrap_or_default()
            );
            registry
                .start_active()
                .await
                .context("Failed to start the default receiver")
        }
        Err(e) => Err(e).context("Failed to start the configured receiver"),
    }
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        // Live streams
        .route("/live/read/model", get(handlers::read_model_handler))
        .route("/live/read/camera", get(handlers::read_camera_handler))
        .route("/live/write/camera", get(handlers::write_camera_handler))
        // Receiver
        .route("/api/receiver", get(handlers::get_receiver))
        .route("/api/receiver/update", put(handlers::update_receiver))
        // Scene and config
        .route("/api/config/scene", get(handlers::get_scene))
        .route("/api/config/scene/update", put(handlers::save_scene))
        .route("/api/config/app", get(handlers::get_app_config))
        // Model
        .route("/api/model", get(handlers::get_model))
        .route(
            "/api/model/update",
            put(handlers::update_model).layer(DefaultBodyLimit::max(handlers::MAX_MODEL_BYTES)),
        )
        // Health endpoints
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/health/ready", get(handlers::health_ready_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "fntwo=debug,motion_relay=debug,tower_http=debug,info"
    } else {
        "fntwo=info,motion_relay=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let dirs = AppDirs::discover()?;
    dirs.create_data_dir()?;
    let config_file = cli.config.unwrap_or_else(|| dirs.config_toml_path());
    let config = Arc::new(config::resolve(&config_file, &dirs.data_dir, &cli.overrides)?);

    info!("Starting fntwo");
    info!("Config file: {}", config_file.display());

    let store = Arc::new(PoseStore::new());
    let registry = Arc::new(build_registry(&config, &store));
    activate_receiver(&registry, &config.receiver).await?;
    info!(
        "Receiver \"{}\" listening for VMC on udp://{}",
        registry.active_name().unwrap_or_default(),
        config.vmc.addr()
    );

    let scene = Arc::new(
        SceneSync::load(&config.scene_file, config.pool.queue_capacity)
            .await
            .with_context(|| format!("Failed to load scene {}", config.scene_file.display()))?,
    );

    let shutdown = CancellationToken::new();
    let state = AppState {
        config: config.clone(),
        store,
        registry: registry.clone(),
        scene,
        metrics: Arc::new(ServerMetrics::new()),
        shutdown: shutdown.clone(),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.web.addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.web.addr()))?;
    let actual_addr = listener.local_addr()?;

    info!("fntwo listening on http://{}", actual_addr);
    info!("Live endpoints:");
    info!("  WS  /live/read/model   - Pose at {} Hz", config.update_frequency);
    info!("  WS  /live/read/camera  - Shared camera");
    info!("  WS  /live/write/camera - Camera updates");

    // Create shutdown signal handler
    let server_shutdown = shutdown.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
        // Let WebSocket loops finish so graceful shutdown can complete
        server_shutdown.cancel();
    };

    // Run server with graceful shutdown
    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    // Perform cleanup after shutdown
    shutdown.cancel();
    info!("Stopping receiver...");
    if let Err(e) = registry.stop_active().await {
        warn!("Failed to stop receiver during shutdown: {}", e);
    }

    info!("Shutdown complete");
    server_result
}
