//! Server metrics for observability
//!
//! Counters for the WebSocket surface; receiver and camera-pool figures are
//! read from the core at report time.

use motion_relay::StatsSnapshot;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently open WebSocket connections
    pub active_connections: AtomicU64,
    /// Total WebSocket connections since server start
    pub total_connections: AtomicU64,

    // Frame metrics
    /// Pose frames pushed to model viewers
    pub pose_frames_sent: AtomicU64,
    /// Camera frames pushed to camera readers
    pub camera_frames_sent: AtomicU64,
    /// Camera updates accepted from writers
    pub camera_updates: AtomicU64,
    /// Camera frames rejected as malformed
    pub camera_rejected: AtomicU64,

    // Error metrics
    /// WebSocket send/receive failures
    pub websocket_errors: AtomicU64,
    /// Failed scene or model writes
    pub save_errors: AtomicU64,

    /// Successful receiver switches
    pub receiver_switches: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    // Connection tracking
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn pose_frame_sent(&self) {
        self.pose_frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn camera_frame_sent(&self) {
        self.camera_frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn camera_updated(&self) {
        self.camera_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn camera_rejected(&self) {
        self.camera_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn websocket_error(&self) {
        self.websocket_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn save_error(&self) {
        self.save_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn receiver_switched(&self) {
        self.receiver_switches.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of the server-side counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            frames: FrameMetrics {
                pose_sent: self.pose_frames_sent.load(Ordering::Relaxed),
                camera_sent: self.camera_frames_sent.load(Ordering::Relaxed),
                camera_updates: self.camera_updates.load(Ordering::Relaxed),
                camera_rejected: self.camera_rejected.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                websocket: self.websocket_errors.load(Ordering::Relaxed),
                save: self.save_errors.load(Ordering::Relaxed),
            },
            receiver_switches: self.receiver_switches.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub frames: FrameMetrics,
    pub errors: ErrorMetrics,
    pub receiver_switches: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub pose_sent: u64,
    pub camera_sent: u64,
    pub camera_updates: u64,
    pub camera_rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub websocket: u64,
    pub save: u64,
}

/// Full `/metrics` body
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    #[serde(flatten)]
    pub server: MetricsSnapshot,
    pub receiver: ReceiverReport,
    pub camera_pool: PoolReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiverReport {
    pub active: Option<String>,
    pub running: bool,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolReport {
    pub subscribers: usize,
    /// Cameras evicted from currently connected readers' queues
    pub dropped: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub receiver: ReceiverHealth,
    pub connections: u64,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverHealth {
    pub active: Option<String>,
    pub running: bool,
}
