//! Canonical scene state and camera synchronization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::SceneError;
use crate::pool::{BroadcastPool, Subscription};
use crate::pose::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
}

impl Camera {
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.target.is_finite()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.0, 2.0),
            target: Vec3::new(0.0, 1.0, 0.0),
        }
    }
}

/// The persisted scene. Fields this crate does not know about are kept
/// as-is so a save never loses them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub camera: Camera,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Scene {
    /// Pretty JSON with single-space indentation
    pub fn to_json(&self) -> Result<Vec<u8>, SceneError> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        out.push(b'\n');
        Ok(out)
    }
}

/// Owns the canonical [`Scene`] and fans camera changes out to subscribers.
///
/// Camera writes replace the whole camera and are published while the scene
/// lock is held, so subscribers see cameras in the order they were written.
pub struct SceneSync {
    scene: RwLock<Scene>,
    path: PathBuf,
    pool: BroadcastPool<Camera>,
}

impl SceneSync {
    pub fn new(scene: Scene, path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            scene: RwLock::new(scene),
            path: path.into(),
            pool: BroadcastPool::new(capacity),
        }
    }

    /// Read the scene file at `path`. A missing file gives the default scene.
    pub async fn load(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, SceneError> {
        let path = path.into();
        let scene = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No scene file at {}, using defaults", path.display());
                Scene::default()
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded scene from {}", path.display());
        Ok(Self::new(scene, path, capacity))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The camera fan-out, for diagnostics
    pub fn pool(&self) -> &BroadcastPool<Camera> {
        &self.pool
    }

    pub async fn camera(&self) -> Camera {
        self.scene.read().await.camera
    }

    pub async fn scene(&self) -> Scene {
        self.scene.read().await.clone()
    }

    /// Current camera plus a subscription to every later one.
    ///
    /// Both are taken under the scene lock, so no publish falls in between.
    pub async fn subscribe(&self) -> (Camera, Subscription<Camera>) {
        let scene = self.scene.read().await;
        (scene.camera, self.pool.subscribe())
    }

    /// Replace the camera and publish it; returns how many subscribers got it.
    ///
    /// A camera with a NaN or infinite component is refused and the current
    /// one kept: JSON has no spelling for those values, so it could be neither
    /// sent to readers nor saved.
    pub async fn publish(&self, camera: Camera) -> Result<usize, SceneError> {
        if !camera.is_finite() {
            return Err(SceneError::NonFiniteCamera);
        }
        let mut scene = self.scene.write().await;
        scene.camera = camera;
        Ok(self.pool.update(camera))
    }

    /// Write the scene to its file.
    ///
    /// The JSON goes to a temporary file in the same directory which is then
    /// renamed over the destination, so readers see the old file or the new
    /// one and never a partial write. On failure the in-memory scene is
    /// unchanged.
    pub async fn save(&self) -> Result<(), SceneError> {
        let json = self.scene.read().await.to_json()?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| SceneError::Io(io::Error::other(e)))??;
        info!("Saved scene to {}", self.path.display());
        Ok(())
    }
}

/// Replace `path` with `contents` via a same-directory temp file and rename
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), SceneError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| SceneError::Persist(e.error))?;
    Ok(())
}
