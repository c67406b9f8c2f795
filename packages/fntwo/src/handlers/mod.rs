pub mod health;
pub mod live;
pub mod model;
pub mod receiver;
pub mod scene;

// Re-export all handlers for easy route registration
pub use health::{health_handler, health_live_handler, health_ready_handler, metrics_handler};
pub use live::{read_camera_handler, read_model_handler, write_camera_handler};
pub use model::{MAX_MODEL_BYTES, get_model, update_model};
pub use receiver::{get_receiver, update_receiver};
pub use scene::{get_app_config, get_scene, save_scene};
