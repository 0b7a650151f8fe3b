use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Camera world transform paired with its inverse (the view matrix).
///
/// Both matrices are only ever updated together: every change applied to the
/// transform on the right is mirrored by its inverse on the left of the view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    transform: Mat4,
    inverse: Mat4,
}

impl Default for CameraState {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl CameraState {
    /// At the origin looking down -Z.
    pub const IDENTITY: Self = Self {
        transform: Mat4::IDENTITY,
        inverse: Mat4::IDENTITY,
    };

    /// Camera at `eye` looking at `target`.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let inverse = Mat4::look_at_rh(eye, target, up);
        Self {
            transform: inverse.inverse(),
            inverse,
        }
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    /// World-to-camera matrix.
    pub fn view(&self) -> Mat4 {
        self.inverse
    }

    pub fn position(&self) -> Vec3 {
        self.transform.transform_point3(Vec3::ZERO)
    }

    /// Unit view direction in world space.
    pub fn forward(&self) -> Vec3 {
        self.transform.transform_vector3(Vec3::NEG_Z).normalize_or_zero()
    }

    /// Where `offset`, given in camera-local coordinates, lands in world space.
    pub fn local_to_world(&self, offset: Vec3) -> Vec3 {
        self.transform.transform_point3(offset)
    }

    /// Applies `local` in camera space; `local_inverse` must undo it.
    pub fn post_multiply(&mut self, local: Mat4, local_inverse: Mat4) {
        self.transform *= local;
        self.inverse = local_inverse * self.inverse;
    }

    pub fn translate_local(&mut self, offset: Vec3) {
        self.post_multiply(
            Mat4::from_translation(offset),
            Mat4::from_translation(-offset),
        );
    }

    pub fn rotate_local(&mut self, axis: Vec3, angle: f32) {
        let Some(axis) = axis.try_normalize() else {
            return;
        };
        self.post_multiply(
            Mat4::from_axis_angle(axis, angle),
            Mat4::from_axis_angle(axis, -angle),
        );
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns `true` while transform × inverse stays within `tolerance` of identity.
    pub fn is_consistent(&self, tolerance: f32) -> bool {
        (self.transform * self.inverse).abs_diff_eq(Mat4::IDENTITY, tolerance)
    }

    /// Compass-style readout of the view's z axis, e.g. `"East Up South"`.
    pub fn facing_label(&self) -> String {
        let z_axis = self.inverse * Vec4::Z;
        format!(
            "{} {} {}",
            if z_axis.x > 0.0 { "West" } else { "East" },
            if z_axis.y > 0.0 { "Down" } else { "Up" },
            if z_axis.z > 0.0 { "North" } else { "South" },
        )
    }
}

/// Fixed viewpoints looking at the world origin from ten units away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraPreset {
    Front,
    Right,
    Rear,
    Left,
}

impl CameraPreset {
    pub const ALL: [Self; 4] = [Self::Front, Self::Right, Self::Rear, Self::Left];

    pub fn eye(self) -> Vec3 {
        match self {
            Self::Front => Vec3::new(0.0, 0.0, 10.0),
            Self::Right => Vec3::new(10.0, 0.0, 0.0),
            Self::Rear => Vec3::new(0.0, 0.0, -10.0),
            Self::Left => Vec3::new(-10.0, 0.0, 0.0),
        }
    }

    pub fn camera(self) -> CameraState {
        CameraState::look_at(self.eye(), Vec3::ZERO, Vec3::Y)
    }
}

/// Handle to a camera owned by a [`CameraRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraId(usize);

/// Externally owned cameras addressed by [`CameraId`].
#[derive(Debug, Clone, Default)]
pub struct CameraRegistry {
    cameras: Vec<CameraState>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, camera: CameraState) -> CameraId {
        self.cameras.push(camera);
        CameraId(self.cameras.len() - 1)
    }

    pub fn get(&self, id: CameraId) -> Option<&CameraState> {
        self.cameras.get(id.0)
    }

    pub fn get_mut(&mut self, id: CameraId) -> Option<&mut CameraState> {
        self.cameras.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_at_places_camera_at_eye() {
        let camera = CameraState::look_at(Vec3::new(0.0, 0.0, 25.0), Vec3::ZERO, Vec3::Y);
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, 25.0), 1e-4));
        assert!(camera.is_consistent(1e-5));
    }

    #[test]
    fn local_moves_keep_matrices_consistent() {
        let mut camera = CameraPreset::Right.camera();
        for step in 0..50 {
            camera.rotate_local(Vec3::new(0.3, 1.0, 0.1), 0.02 * step as f32);
            camera.translate_local(Vec3::new(0.1, -0.2, -0.5));
        }
        assert!(camera.is_consistent(1e-3));
    }

    #[test]
    fn translate_local_follows_view_direction() {
        let mut camera = CameraPreset::Front.camera();
        camera.translate_local(Vec3::new(0.0, 0.0, -1.0));
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, 9.0), 1e-4));
    }

    #[test]
    fn zero_axis_rotation_is_ignored() {
        let mut camera = CameraPreset::Front.camera();
        let before = camera;
        camera.rotate_local(Vec3::ZERO, 1.0);
        assert_eq!(camera, before);
    }

    #[test]
    fn reset_returns_to_origin() {
        let mut camera = CameraPreset::Rear.camera();
        camera.reset();
        assert_eq!(camera.position(), Vec3::ZERO);
        assert_eq!(camera.view(), Mat4::IDENTITY);
    }

    #[test]
    fn facing_label_reports_each_axis() {
        let label = CameraPreset::Front.camera().facing_label();
        assert_eq!(label.split_whitespace().count(), 3);
        assert!(label.ends_with("North"));
    }

    #[test]
    fn registry_hands_out_stable_ids() {
        let mut registry = CameraRegistry::new();
        let first = registry.insert(CameraState::default());
        let second = registry.insert(CameraPreset::Left.camera());
        assert_ne!(first, second);
        assert_eq!(registry.get(first), Some(&CameraState::default()));
        assert!(registry
            .get(second)
            .unwrap()
            .position()
            .abs_diff_eq(Vec3::new(-10.0, 0.0, 0.0), 1e-4));
    }
}
