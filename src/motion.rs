//! Keyboard and pointer driven flight for a camera held in a [`CameraRegistry`].
//!
//! Every frame the controller may steer (look-around and roll), attempt one
//! collision-gated translation, and orbit the world origin while a pointer
//! drag is held. All changes go through [`CameraState::post_multiply`] so the
//! camera's transform and inverse never drift apart.

use glam::{Mat4, Vec2, Vec3};
use log::debug;

use crate::camera::{CameraId, CameraRegistry, CameraState};
use crate::collision::{Collision, CollisionDetector};
use crate::config::MotionConfig;
use crate::input::Action;
use crate::model::Model;

/// What one [`MotionController::update`] call did to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionOutcome {
    /// Look-around, roll or arcball rotation was applied.
    pub rotated: bool,
    /// The prospective translation was committed.
    pub translated: bool,
    /// Why the prospective translation was refused.
    pub blocked: Option<Collision>,
}

#[derive(Debug, Clone)]
pub struct MotionController {
    config: MotionConfig,
    target: Option<CameraId>,
    thrust: Vec3,
    roll: f32,
    look_around_locked: bool,
    speed_multiplier: f32,
    from_center: Vec2,
    anchor: Option<Vec2>,
}

impl Default for MotionController {
    fn default() -> Self {
        Self::new(MotionConfig::default())
    }
}

impl MotionController {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            target: None,
            thrust: Vec3::ZERO,
            roll: 0.0,
            look_around_locked: true,
            speed_multiplier: 1.0,
            from_center: Vec2::ZERO,
            anchor: None,
        }
    }

    /// Steers `camera` from now on.
    pub fn attach(&mut self, camera: CameraId) {
        self.target = Some(camera);
    }

    pub fn target(&self) -> Option<CameraId> {
        self.target
    }

    pub fn thrust(&self) -> Vec3 {
        self.thrust
    }

    pub fn roll(&self) -> f32 {
        self.roll
    }

    pub fn look_around_locked(&self) -> bool {
        self.look_around_locked
    }

    pub fn speed_multiplier(&self) -> f32 {
        self.speed_multiplier
    }

    pub fn is_dragging(&self) -> bool {
        self.anchor.is_some()
    }

    /// Pointer offset from the viewport center, in pixels.
    pub fn pointer_moved(&mut self, from_center: Vec2) {
        self.from_center = from_center;
    }

    /// Starts an arcball drag anchored at the current pointer offset.
    pub fn pointer_pressed(&mut self) {
        self.anchor = Some(self.from_center);
    }

    pub fn pointer_released(&mut self) {
        self.anchor = None;
    }

    /// The pointer left the viewport; stop steering unless a drag is held.
    pub fn pointer_left(&mut self) {
        if self.anchor.is_none() {
            self.from_center = Vec2::ZERO;
        }
    }

    /// Applies a key press or release. Returns `false` for actions the
    /// controller does not own, such as the depth overlay toggle.
    pub fn handle_action(
        &mut self,
        action: Action,
        pressed: bool,
        cameras: &mut CameraRegistry,
    ) -> bool {
        if action == Action::ToggleDepthView {
            return false;
        }
        if action.is_trigger() {
            if pressed {
                self.trigger(action, cameras);
            }
            return true;
        }
        let held = if pressed { 1.0 } else { 0.0 };
        match action {
            Action::Up => self.thrust.y = -held,
            Action::Down => self.thrust.y = held,
            Action::Forward => self.thrust.z = held,
            Action::Back => self.thrust.z = -held,
            Action::Left => self.thrust.x = held,
            Action::Right => self.thrust.x = -held,
            Action::RollLeft => self.roll = held,
            Action::RollRight => self.roll = -held,
            _ => {}
        }
        true
    }

    /// One-shot commands, applied on key press only.
    fn trigger(&mut self, action: Action, cameras: &mut CameraRegistry) {
        match action {
            Action::ToggleLook => self.look_around_locked = !self.look_around_locked,
            Action::ResetToOrigin => {
                if let Some(camera) = self.camera_mut(cameras) {
                    camera.reset();
                }
            }
            Action::Preset(preset) => {
                if let Some(camera) = self.camera_mut(cameras) {
                    *camera = preset.camera();
                }
            }
            Action::SpeedUp => self.speed_multiplier *= self.config.speed_step,
            Action::SpeedDown => self.speed_multiplier /= self.config.speed_step,
            _ => {}
        }
    }

    /// Integrates one frame of motion for the attached camera.
    ///
    /// At most one collision query is made, and only when thrust is non-zero.
    pub fn update(
        &mut self,
        cameras: &mut CameraRegistry,
        models: &[Model],
        detector: &CollisionDetector,
        dt: f32,
    ) -> MotionOutcome {
        let mut outcome = MotionOutcome::default();
        let Some(camera) = self.camera_mut(cameras) else {
            return outcome;
        };

        let meters = dt * self.speed_multiplier * self.config.meters_per_frame;
        let radians = dt * self.speed_multiplier * self.config.radians_per_frame;

        outcome.rotated |= self.look_around(camera, radians);
        if self.roll != 0.0 {
            camera.rotate_local(Vec3::Z, -self.config.roll_step * self.roll);
            outcome.rotated = true;
        }

        if self.thrust != Vec3::ZERO && meters != 0.0 {
            let offset = self.thrust * -meters;
            let current = camera.position();
            let prospective = camera.local_to_world(offset);
            match detector.check(current, prospective, models) {
                None => {
                    camera.translate_local(offset);
                    outcome.translated = true;
                }
                Some(collision) => {
                    debug!("translation blocked: {collision:?}");
                    outcome.blocked = Some(collision);
                }
            }
        }

        if let Some(anchor) = self.anchor {
            outcome.rotated |= orbit_origin(camera, self.from_center - anchor, radians);
        }
        outcome
    }

    fn look_around(&self, camera: &mut CameraState, radians: f32) -> bool {
        if self.look_around_locked {
            return false;
        }
        let leeway = self.config.dead_zone;
        let mut rotated = false;
        for (i, axis) in [Vec3::Y, Vec3::X].into_iter().enumerate() {
            let offset = self.from_center[i];
            let excess = if offset > leeway {
                offset - leeway
            } else if offset < -leeway {
                offset + leeway
            } else {
                continue;
            };
            camera.rotate_local(axis, -excess * radians);
            rotated = true;
        }
        rotated
    }

    fn camera_mut<'a>(&self, cameras: &'a mut CameraRegistry) -> Option<&'a mut CameraState> {
        cameras.get_mut(self.target?)
    }
}

/// Rotates the camera about the world origin; the axis follows the drag.
fn orbit_origin(camera: &mut CameraState, drag: Vec2, radians: f32) -> bool {
    let Some(axis) = Vec3::new(drag.y, drag.x, 0.0).try_normalize() else {
        return false;
    };
    let angle = radians * drag.length();
    let pivot = camera.view().transform_point3(Vec3::ZERO);
    let to_pivot = Mat4::from_translation(pivot);
    let from_pivot = Mat4::from_translation(-pivot);
    camera.post_multiply(
        to_pivot * Mat4::from_axis_angle(axis, angle) * from_pivot,
        to_pivot * Mat4::from_axis_angle(axis, -angle) * from_pivot,
    );
    true
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_relative_eq;

    use super::*;
    use crate::camera::CameraPreset;
    use crate::model::{MaterialId, Mesh, MeshGeometry, Vertex};

    fn setup(camera: CameraState) -> (MotionController, CameraRegistry) {
        let mut cameras = CameraRegistry::new();
        let id = cameras.insert(camera);
        let mut controller = MotionController::default();
        controller.attach(id);
        (controller, cameras)
    }

    fn position(controller: &MotionController, cameras: &CameraRegistry) -> Vec3 {
        cameras.get(controller.target().unwrap()).unwrap().position()
    }

    fn camera(controller: &MotionController, cameras: &CameraRegistry) -> CameraState {
        *cameras.get(controller.target().unwrap()).unwrap()
    }

    fn wall() -> Model {
        let v = |x: f32, y: f32| Vertex::new(Vec3::new(x, y, 0.0), Vec3::Z, Vec2::ZERO);
        Model {
            name: "Wall".into(),
            mesh: Arc::new(Mesh::ready(
                "quad",
                MeshGeometry::indexed(
                    vec![v(-1.0, -1.0), v(1.0, -1.0), v(1.0, 1.0), v(-1.0, 1.0)],
                    vec![0, 1, 2, 0, 2, 3],
                ),
            )),
            transform: Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0))
                * Mat4::from_scale(Vec3::splat(10.0)),
            collidable: true,
            casts_shadow: true,
            material: MaterialId(0),
        }
    }

    #[test]
    fn unattached_controller_does_nothing() {
        let mut controller = MotionController::default();
        let mut cameras = CameraRegistry::new();
        cameras.insert(CameraState::default());
        controller.handle_action(Action::Forward, true, &mut cameras);
        let outcome = controller.update(&mut cameras, &[], &CollisionDetector::default(), 1.0);
        assert_eq!(outcome, MotionOutcome::default());
    }

    #[test]
    fn forward_thrust_moves_along_view() {
        let (mut controller, mut cameras) = setup(CameraPreset::Front.camera());
        controller.handle_action(Action::Forward, true, &mut cameras);
        let outcome = controller.update(&mut cameras, &[], &CollisionDetector::default(), 0.1);
        assert!(outcome.translated);
        assert!(position(&controller, &cameras).abs_diff_eq(Vec3::new(0.0, 0.0, 9.0), 1e-4));
    }

    #[test]
    fn wall_ahead_blocks_translation() {
        let eye = Vec3::new(0.3, 1.0, 2.0);
        let (mut controller, mut cameras) =
            setup(CameraState::look_at(eye, eye - Vec3::Z, Vec3::Y));
        controller.handle_action(Action::Forward, true, &mut cameras);
        let outcome = controller.update(
            &mut cameras,
            &[wall()],
            &CollisionDetector::default(),
            0.02,
        );
        assert!(!outcome.translated);
        assert!(matches!(outcome.blocked, Some(Collision::Ray { model: 0, .. })));
        assert!(position(&controller, &cameras).abs_diff_eq(eye, 1e-5));
    }

    #[test]
    fn descending_below_floor_is_refused() {
        let (mut controller, mut cameras) = setup(CameraState::default());
        controller.handle_action(Action::Down, true, &mut cameras);
        let outcome = controller.update(&mut cameras, &[], &CollisionDetector::default(), 0.1);
        assert_eq!(outcome.blocked, Some(Collision::Floor));
        assert_eq!(position(&controller, &cameras), Vec3::ZERO);
    }

    #[test]
    fn release_clears_thrust_and_roll() {
        let (mut controller, mut cameras) = setup(CameraState::default());
        controller.handle_action(Action::Left, true, &mut cameras);
        controller.handle_action(Action::RollRight, true, &mut cameras);
        assert_eq!(controller.thrust(), Vec3::X);
        assert_eq!(controller.roll(), -1.0);
        controller.handle_action(Action::Left, false, &mut cameras);
        controller.handle_action(Action::RollRight, false, &mut cameras);
        assert_eq!(controller.thrust(), Vec3::ZERO);
        assert_eq!(controller.roll(), 0.0);

        let outcome = controller.update(&mut cameras, &[], &CollisionDetector::default(), 1.0);
        assert_eq!(outcome, MotionOutcome::default());
    }

    #[test]
    fn look_around_respects_lock_and_dead_zone() {
        let (mut controller, mut cameras) = setup(CameraPreset::Front.camera());
        let detector = CollisionDetector::default();
        controller.pointer_moved(Vec2::new(300.0, 0.0));
        assert!(!controller.update(&mut cameras, &[], &detector, 1.0).rotated);

        controller.handle_action(Action::ToggleLook, true, &mut cameras);
        assert!(!controller.look_around_locked());
        controller.pointer_moved(Vec2::new(50.0, -60.0));
        assert!(!controller.update(&mut cameras, &[], &detector, 1.0).rotated);

        let before = camera(&controller, &cameras);
        controller.pointer_moved(Vec2::new(300.0, 0.0));
        assert!(controller.update(&mut cameras, &[], &detector, 1.0).rotated);
        let after = camera(&controller, &cameras);
        assert_ne!(before.forward(), after.forward());
        assert!(after.position().abs_diff_eq(before.position(), 1e-4));
        assert!(after.is_consistent(1e-4));
    }

    #[test]
    fn unlocking_steers_from_the_current_pointer_offset() {
        let (mut controller, mut cameras) = setup(CameraPreset::Front.camera());
        let detector = CollisionDetector::default();
        controller.pointer_moved(Vec2::new(0.0, 200.0));
        controller.handle_action(Action::ToggleLook, true, &mut cameras);
        controller.handle_action(Action::ToggleLook, false, &mut cameras);
        assert!(!controller.look_around_locked());
        assert!(controller.update(&mut cameras, &[], &detector, 1.0).rotated);
    }

    #[test]
    fn roll_keeps_position_and_consistency() {
        let (mut controller, mut cameras) = setup(CameraPreset::Right.camera());
        controller.handle_action(Action::RollLeft, true, &mut cameras);
        for _ in 0..20 {
            controller.update(&mut cameras, &[], &CollisionDetector::default(), 0.016);
        }
        let state = camera(&controller, &cameras);
        assert!(state.position().abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), 1e-3));
        assert!(state.is_consistent(1e-4));
    }

    #[test]
    fn presets_and_reset_replace_the_camera() {
        let (mut controller, mut cameras) = setup(CameraState::default());
        controller.handle_action(Action::Preset(CameraPreset::Rear), true, &mut cameras);
        assert!(position(&controller, &cameras).abs_diff_eq(Vec3::new(0.0, 0.0, -10.0), 1e-4));
        controller.handle_action(Action::Preset(CameraPreset::Front), false, &mut cameras);
        assert!(position(&controller, &cameras).abs_diff_eq(Vec3::new(0.0, 0.0, -10.0), 1e-4));
        controller.handle_action(Action::ResetToOrigin, true, &mut cameras);
        assert_eq!(camera(&controller, &cameras), CameraState::default());
    }

    #[test]
    fn speed_steps_are_multiplicative() {
        let (mut controller, mut cameras) = setup(CameraState::default());
        controller.handle_action(Action::SpeedUp, true, &mut cameras);
        controller.handle_action(Action::SpeedUp, true, &mut cameras);
        assert_relative_eq!(controller.speed_multiplier(), 1.44, epsilon = 1e-5);
        controller.handle_action(Action::SpeedDown, true, &mut cameras);
        controller.handle_action(Action::SpeedDown, true, &mut cameras);
        assert_relative_eq!(controller.speed_multiplier(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn depth_view_is_not_a_motion_action() {
        let (mut controller, mut cameras) = setup(CameraState::default());
        assert!(!controller.handle_action(Action::ToggleDepthView, true, &mut cameras));
    }

    #[test]
    fn arcball_orbits_origin_without_collision() {
        let (mut controller, mut cameras) = setup(CameraPreset::Front.camera());
        let detector = CollisionDetector::default();
        controller.pointer_moved(Vec2::new(10.0, 10.0));
        controller.pointer_pressed();
        controller.pointer_moved(Vec2::new(60.0, 10.0));
        // The wall sits between the camera path and the origin.
        let models = [wall()];
        for _ in 0..30 {
            let outcome = controller.update(&mut cameras, &models, &detector, 0.5);
            assert!(outcome.rotated);
            assert!(outcome.blocked.is_none());
        }
        let state = camera(&controller, &cameras);
        assert_relative_eq!(state.position().length(), 10.0, epsilon = 1e-3);
        assert!(!state.position().abs_diff_eq(Vec3::new(0.0, 0.0, 10.0), 1e-2));
        assert!(state.is_consistent(1e-3));
    }

    #[test]
    fn zero_length_drag_is_a_no_op() {
        let (mut controller, mut cameras) = setup(CameraPreset::Front.camera());
        controller.pointer_moved(Vec2::new(5.0, 5.0));
        controller.pointer_pressed();
        let before = camera(&controller, &cameras);
        let outcome = controller.update(&mut cameras, &[], &CollisionDetector::default(), 1.0);
        assert!(!outcome.rotated);
        assert_eq!(camera(&controller, &cameras), before);
    }

    #[test]
    fn leaving_viewport_clears_offset_unless_dragging() {
        let (mut controller, mut cameras) = setup(CameraPreset::Front.camera());
        controller.handle_action(Action::ToggleLook, true, &mut cameras);
        controller.pointer_moved(Vec2::new(400.0, 0.0));
        controller.pointer_left();
        assert!(!controller
            .update(&mut cameras, &[], &CollisionDetector::default(), 1.0)
            .rotated);

        controller.pointer_pressed();
        controller.pointer_moved(Vec2::new(100.0, 0.0));
        controller.pointer_left();
        assert!(controller.is_dragging());
        assert!(controller
            .update(&mut cameras, &[], &CollisionDetector::default(), 1.0)
            .rotated);
        controller.pointer_released();
        assert!(!controller.is_dragging());
    }
}
