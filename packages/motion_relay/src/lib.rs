//! Motion Relay - live avatar pose ingest and fan-out
//!
//! This crate owns the data plane between a motion-capture source and the
//! viewers that display it. It has no HTTP dependencies; a server wires the
//! pieces below to its own routes.
//!
//! - [`decoder`] turns VMC protocol messages into typed pose deltas
//! - [`PoseStore`] holds the single live [`Pose`] and merges deltas into it
//! - [`Receiver`] is a capture source; [`VmcReceiver`] listens for VMC over UDP
//! - [`ReceiverRegistry`] swaps the active capture source at runtime
//! - [`BroadcastPool`] fans one published value out to many subscribers
//! - [`SceneSync`] holds the shared camera and persists the scene file
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use motion_relay::{PoseStore, ReceiverRegistry, VmcReceiver};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(PoseStore::new());
//!
//!     let mut registry = ReceiverRegistry::new();
//!     let vmc = VmcReceiver::new("0.0.0.0:39540".parse().unwrap(), store.clone());
//!     registry.register("vmc", Arc::new(vmc));
//!     registry.switch_to("vmc").await.unwrap();
//!
//!     // Sample the pose the way a viewer connection would
//!     let bones = store.read(|pose| pose.bones.len()).await;
//!     println!("{} bones tracked", bones);
//! }
//! ```

pub mod decoder;
mod error;
pub mod osc;
pub mod pool;
pub mod pose;
pub mod receiver;
pub mod registry;
pub mod scene;
pub mod skeleton;

pub use error::{DecodeError, ReceiverError, SceneError, SwitchError};
pub use pool::{BroadcastPool, Subscription, SubscriptionHandle};
pub use pose::{BoneTransform, Pose, PoseDelta, PoseStore, Rotation, Spherical, Vec3};
pub use receiver::{Receiver, ReceiverStats, StatsSnapshot, VmcReceiver};
pub use registry::ReceiverRegistry;
pub use scene::{Camera, Scene, SceneSync};
pub use skeleton::{BoneName, ShapeName};
