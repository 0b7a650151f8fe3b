//! GPU-independent shadow math shared by the depth pass and the color pass.

use glam::{Mat4, Vec3, Vec4Swizzles};

use crate::config::{ShadowBias, ShadowConfig};
use crate::lighting::LightDescriptor;

/// View matrix looking from the light toward the world origin, +Y up.
///
/// Directional lights store the direction toward the light in `xyz`; their
/// eye sits halfway to the far plane along that direction.
pub fn light_view(light: &LightDescriptor, config: &ShadowConfig) -> Mat4 {
    let mut eye = light.position.xyz();
    if light.is_directional() {
        eye = eye.normalize_or_zero() * (config.far * 0.5);
    }
    if eye.length_squared() < f32::EPSILON {
        eye = Vec3::Y * (config.far * 0.5);
    }
    let up = if eye.cross(Vec3::Y).length_squared() < f32::EPSILON {
        Vec3::Z
    } else {
        Vec3::Y
    };
    Mat4::look_at_rh(eye, Vec3::ZERO, up)
}

/// Fixed orthographic volume `[-extent, extent]² × [near, far]` with depth in `[0, 1]`.
pub fn light_projection(config: &ShadowConfig) -> Mat4 {
    let e = config.extent;
    Mat4::orthographic_rh(-e, e, -e, e, config.near, config.far)
}

pub fn light_space_matrix(light: &LightDescriptor, config: &ShadowConfig) -> Mat4 {
    light_projection(config) * light_view(light, config)
}

/// Maps clip-space x, y from `[-1, 1]` to texture space `[0, 1]`.
///
/// Texture rows grow downward, so y is flipped. Depth is already in `[0, 1]`
/// and passes through unchanged.
pub fn bias_matrix() -> Mat4 {
    Mat4::from_cols_array(&[
        0.5, 0.0, 0.0, 0.0, //
        0.0, -0.5, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.5, 0.5, 0.0, 1.0,
    ])
}

/// `bias × light_space × model`, uploaded per object for the color pass.
pub fn shadow_transform(light_space: Mat4, model: Mat4) -> Mat4 {
    bias_matrix() * light_space * model
}

/// Shadow-map coordinate of the model-space point `position`.
pub fn shadow_coord(shadow_transform: Mat4, position: Vec3) -> Vec3 {
    shadow_transform.project_point3(position)
}

impl ShadowBias {
    /// Depth offset for a surface with `normal` lit from `to_light`.
    pub fn value(&self, normal: Vec3, to_light: Vec3) -> f32 {
        match *self {
            Self::Constant { value } => value,
            Self::NormalScaled { scale, min } => {
                let l = to_light.normalize_or_zero();
                (scale * (1.0 - normal.dot(l))).max(min)
            }
        }
    }
}

/// Whether `coord` falls on the shadow map. Both edges count as inside.
pub fn is_inside_shadow_map(coord: Vec3) -> bool {
    (0.0..=1.0).contains(&coord.x) && (0.0..=1.0).contains(&coord.y)
}

/// Light visibility for a fragment: `strength` when occluded, else `1.0`.
///
/// Coordinates off the map are never shadowed, whatever the map holds.
pub fn shadow_visibility(coord: Vec3, sampled_depth: f32, bias: f32, strength: f32) -> f32 {
    if is_inside_shadow_map(coord) && sampled_depth < coord.z - bias {
        strength
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{Vec4, Vec4Swizzles};

    use super::*;

    fn light_at(x: f32, y: f32, z: f32) -> LightDescriptor {
        LightDescriptor::new(Vec4::new(x, y, z, 1.0), Vec4::ONE, 1.0)
    }

    #[test]
    fn outside_coordinates_are_never_shadowed() {
        for sampled in [0.0, 0.25, 1.0] {
            let visibility = shadow_visibility(Vec3::new(1.5, 0.5, 0.9), sampled, 0.005, 0.1);
            assert_eq!(visibility, 1.0);
        }
        assert_eq!(shadow_visibility(Vec3::new(0.5, -0.01, 0.9), 0.0, 0.0, 0.1), 1.0);
    }

    #[test]
    fn occluded_fragment_takes_shadow_strength() {
        let coord = Vec3::new(0.5, 0.5, 0.5);
        assert_eq!(shadow_visibility(coord, 0.2, 0.005, 0.1), 0.1);
        assert_eq!(shadow_visibility(coord, 0.6, 0.005, 0.1), 1.0);
        // Within the bias counts as lit.
        assert_eq!(shadow_visibility(coord, 0.497, 0.005, 0.1), 1.0);
        assert_eq!(shadow_visibility(Vec3::new(1.0, 0.0, 0.5), 0.2, 0.005, 0.3), 0.3);
    }

    #[test]
    fn origin_projects_to_map_center() {
        let config = ShadowConfig::default();
        let light = light_at(10.0, 10.0, 10.0);
        let transform = shadow_transform(light_space_matrix(&light, &config), Mat4::IDENTITY);
        let coord = shadow_coord(transform, Vec3::ZERO);
        assert_relative_eq!(coord.x, 0.5, epsilon = 1e-5);
        assert_relative_eq!(coord.y, 0.5, epsilon = 1e-5);
        assert_relative_eq!(coord.z, 300f32.sqrt() / 100.0, epsilon = 1e-5);
    }

    #[test]
    fn texture_rows_grow_downward() {
        let config = ShadowConfig::default();
        let light = light_at(0.0, 0.0, 20.0);
        let transform = shadow_transform(light_space_matrix(&light, &config), Mat4::IDENTITY);
        let above = shadow_coord(transform, Vec3::new(0.0, 5.0, 0.0));
        assert_relative_eq!(above.y, 0.375, epsilon = 1e-5);
        let right = shadow_coord(transform, Vec3::new(5.0, 0.0, 0.0));
        assert_relative_eq!(right.x, 0.625, epsilon = 1e-5);
    }

    #[test]
    fn model_transform_is_applied_before_light_space() {
        let config = ShadowConfig::default();
        let light_space = light_space_matrix(&light_at(0.0, 0.0, 20.0), &config);
        let model = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        let moved = shadow_coord(shadow_transform(light_space, model), Vec3::ZERO);
        let direct = shadow_coord(
            shadow_transform(light_space, Mat4::IDENTITY),
            Vec3::new(5.0, 0.0, 0.0),
        );
        assert!(moved.abs_diff_eq(direct, 1e-5));
    }

    #[test]
    fn overhead_light_has_a_valid_view() {
        let config = ShadowConfig::default();
        let view = light_view(&light_at(0.0, 30.0, 0.0), &config);
        assert!(view.is_finite());
        let directional = LightDescriptor::new(Vec4::new(0.0, 2.0, 0.0, 0.0), Vec4::ONE, 1.0);
        let eye = light_view(&directional, &config).inverse().w_axis.xyz();
        assert!(eye.abs_diff_eq(Vec3::new(0.0, 50.0, 0.0), 1e-3));
    }

    #[test]
    fn bias_variants() {
        assert_eq!(
            ShadowBias::CONSTANT_DEFAULT.value(Vec3::Y, Vec3::X),
            0.005
        );
        let normal = ShadowBias::default();
        assert_relative_eq!(normal.value(Vec3::Y, Vec3::new(0.0, 7.0, 0.0)), 0.01);
        assert_relative_eq!(normal.value(Vec3::Y, Vec3::X), 0.05);
        assert_relative_eq!(normal.value(Vec3::Y, Vec3::NEG_Y), 0.1);
    }
}
