//! The live avatar pose and the store that owns it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::trace;

use crate::skeleton::{BoneName, ShapeName};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// No component is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Alternate rotation view in spherical coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spherical {
    pub azimuth: f32,
    pub polar: f32,
}

/// Quaternion rotation, optionally carrying a spherical view.
///
/// The spherical view is never derived from the quaternion; it is only
/// present when a source supplied it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spherical: Option<Spherical>,
}

impl Rotation {
    pub fn quaternion(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self {
            x,
            y,
            z,
            w,
            spherical: None,
        }
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::quaternion(0.0, 0.0, 0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoneTransform {
    pub position: Vec3,
    pub rotation: Rotation,
}

/// Every bone transform and blend-shape weight currently known for the avatar.
///
/// Keys that have never been reported are absent rather than defaulted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pose {
    #[serde(default)]
    pub bones: BTreeMap<BoneName, BoneTransform>,
    #[serde(default)]
    pub blend_shapes: BTreeMap<ShapeName, f32>,
}

/// A single-key change to the pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoseDelta {
    Bone(BoneName, BoneTransform),
    Blend(ShapeName, f32),
}

/// Clamp a blend-shape weight into `[0, 1]`; NaN becomes 0
pub fn clamp_weight(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl Pose {
    fn merge(&mut self, delta: PoseDelta) {
        match delta {
            PoseDelta::Bone(name, transform) => {
                self.bones.insert(name, transform);
            }
            PoseDelta::Blend(name, value) => {
                self.blend_shapes.insert(name, clamp_weight(value));
            }
        }
    }
}

/// Owner of the single live [`Pose`].
///
/// Writers merge one key (or one datagram's worth of keys) under the write
/// lock; readers see the whole pose under the read lock, so a reader never
/// observes a half-applied update. Only the latest value per key is kept.
#[derive(Debug, Default)]
pub struct PoseStore {
    pose: RwLock<Pose>,
}

impl PoseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace one bone's transform, leaving every other key untouched
    pub async fn apply_bone_delta(&self, name: BoneName, transform: BoneTransform) {
        self.pose.write().await.merge(PoseDelta::Bone(name, transform));
    }

    /// Replace one blend-shape weight, leaving every other key untouched
    pub async fn apply_blend_delta(&self, name: ShapeName, value: f32) {
        self.pose.write().await.merge(PoseDelta::Blend(name, value));
    }

    /// Merge a batch of deltas under a single write lock.
    ///
    /// Returns how many deltas were applied.
    pub async fn apply<I>(&self, deltas: I) -> usize
    where
        I: IntoIterator<Item = PoseDelta>,
    {
        let mut pose = self.pose.write().await;
        let mut applied = 0;
        for delta in deltas {
            pose.merge(delta);
            applied += 1;
        }
        trace!("Merged {} pose deltas", applied);
        applied
    }

    /// Run `f` against a consistent view of the whole pose
    pub async fn read<R>(&self, f: impl FnOnce(&Pose) -> R) -> R {
        let pose = self.pose.read().await;
        f(&pose)
    }

    /// Clone the current pose
    pub async fn snapshot(&self) -> Pose {
        self.pose.read().await.clone()
    }
}
