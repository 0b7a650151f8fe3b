//! Per-frame orchestration shared by the windowed and headless binaries.
//!
//! One [`Flyover::step`] call republishes the scene's models, steers the
//! camera (at most one collision query), and computes the frame's lighting.
//! The renderer then consumes the resulting [`FrameState`].

use std::f32::consts::FRAC_PI_4;
use std::time::Instant;

use glam::{Mat4, Vec2};
use log::debug;

use crate::camera::{CameraId, CameraRegistry, CameraState};
use crate::collision::CollisionDetector;
use crate::config::FlyoverConfig;
use crate::input::{Action, ActionBindings, KeyCode};
use crate::lighting::{DayCycle, FrameLighting};
use crate::model::{FrameModels, Material, ModelRegistry};
use crate::motion::{MotionController, MotionOutcome};
use crate::scene::Scene;

pub const FIELD_OF_VIEW: f32 = FRAC_PI_4;
pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 1000.0;

/// Camera projection used by the color pass.
pub fn projection(aspect: f32) -> Mat4 {
    Mat4::perspective_rh(FIELD_OF_VIEW, aspect.max(0.01), NEAR_PLANE, FAR_PLANE)
}

/// Wall-clock frame timing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameClock {
    last: Option<Instant>,
}

impl FrameClock {
    /// Seconds since the previous tick; zero on the first tick.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = self
            .last
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last = Some(now);
        dt
    }
}

/// Everything produced by one simulation step.
#[derive(Debug, Clone)]
pub struct FrameState {
    pub lighting: FrameLighting,
    pub models: FrameModels,
    pub motion: MotionOutcome,
}

/// The running flyover: scene, flying camera and day cycle.
pub struct Flyover {
    scene: Scene,
    cameras: CameraRegistry,
    camera: CameraId,
    motion: MotionController,
    bindings: ActionBindings,
    detector: CollisionDetector,
    day_cycle: DayCycle,
    models: ModelRegistry,
    elapsed: f32,
    frames: u64,
    blocked: u64,
}

impl Flyover {
    /// Starts at the scene's camera with `config` (scene settings already applied).
    pub fn new(scene: Scene, config: &FlyoverConfig) -> Self {
        let mut cameras = CameraRegistry::new();
        let camera = cameras.insert(scene.camera.camera());
        let mut motion = MotionController::new(config.motion);
        motion.attach(camera);
        let mut day_cycle = DayCycle::new(config.day_cycle);
        if let Some(fill) = scene.fill_light {
            day_cycle = day_cycle.with_fill_light(fill);
        }
        Self {
            scene,
            cameras,
            camera,
            motion,
            bindings: ActionBindings::default(),
            detector: CollisionDetector::new(config.collision),
            day_cycle,
            models: ModelRegistry::new(),
            elapsed: 0.0,
            frames: 0,
            blocked: 0,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn materials(&self) -> &[Material] {
        &self.scene.materials
    }

    pub fn camera(&self) -> &CameraState {
        // The flyover inserts its camera at construction and never removes it.
        self.cameras
            .get(self.camera)
            .unwrap_or(&CameraState::IDENTITY)
    }

    pub fn motion(&self) -> &MotionController {
        &self.motion
    }

    pub fn bindings_mut(&mut self) -> &mut ActionBindings {
        &mut self.bindings
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Number of frames whose translation was refused.
    pub fn blocked_frames(&self) -> u64 {
        self.blocked
    }

    /// Routes a key to its bound action. Returns the action so the caller can
    /// handle the ones the controller does not own.
    pub fn key(&mut self, key: KeyCode, pressed: bool) -> Option<Action> {
        let action = self.bindings.action_for(key)?;
        self.action(action, pressed);
        Some(action)
    }

    /// Applies `action`; `false` when the flyover does not handle it.
    pub fn action(&mut self, action: Action, pressed: bool) -> bool {
        self.motion.handle_action(action, pressed, &mut self.cameras)
    }

    pub fn pointer_moved(&mut self, from_center: Vec2) {
        self.motion.pointer_moved(from_center);
    }

    pub fn pointer_pressed(&mut self) {
        self.motion.pointer_pressed();
    }

    pub fn pointer_released(&mut self) {
        self.motion.pointer_released();
    }

    pub fn pointer_left(&mut self) {
        self.motion.pointer_left();
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32) -> FrameState {
        self.elapsed += dt;
        self.frames += 1;

        let lighting = self.day_cycle.frame(self.elapsed);
        self.models
            .publish(self.scene.models_at(lighting.cycle_time));
        let models = self.models.snapshot();

        let motion = self
            .motion
            .update(&mut self.cameras, &models, &self.detector, dt);
        if let Some(collision) = motion.blocked {
            self.blocked += 1;
            debug!("frame {} blocked by {collision:?}", self.frames);
        }

        FrameState {
            lighting,
            models,
            motion,
        }
    }
}
