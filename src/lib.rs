//! Mountain flyover: a collision-aware flying camera over a shadow-mapped
//! outdoor scene with a day/night cycle.
//!
//! Everything except [`render`] is GPU independent, so motion, collision,
//! lighting and the shadow-map math can be driven and tested headlessly.

pub mod app;
pub mod camera;
pub mod collision;
pub mod config;
pub mod geometry;
pub mod input;
pub mod lighting;
pub mod model;
pub mod motion;
pub mod obj;
pub mod render;
pub mod scene;
pub mod shadow;
pub mod shapes;

pub use app::{projection, Flyover, FrameClock, FrameState};
pub use camera::{CameraId, CameraPreset, CameraRegistry, CameraState};
pub use collision::{Collision, CollisionDetector};
pub use config::{
    CollisionConfig, DayCycleConfig, FlyoverConfig, MotionConfig, ShadowBias, ShadowConfig,
};
pub use geometry::{ray_triangle_intersect, sphere_triangle_intersect, Segment, Triangle};
pub use input::{Action, ActionBindings, KeyCode, NamedKey};
pub use lighting::{DayCycle, FrameLighting, LightDescriptor};
pub use model::{Material, MaterialId, Mesh, MeshGeometry, Model, ModelRegistry, Vertex};
pub use motion::{MotionController, MotionOutcome};
pub use obj::{load_obj, parse_obj};
pub use scene::{MeshLibrary, Scene, SceneObject};
pub use shadow::{ShadowMapRenderer, ShadowTargetError};
