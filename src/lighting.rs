use std::f32::consts::TAU;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::config::DayCycleConfig;
use crate::model::Material;

/// Clear color at full daylight (`#acf5fb`).
pub const SKY_NOON: Vec4 = Vec4::new(172.0 / 255.0, 245.0 / 255.0, 251.0 / 255.0, 1.0);
/// Clear color at night (`#324054`).
pub const SKY_NIGHT: Vec4 = Vec4::new(50.0 / 255.0, 64.0 / 255.0, 84.0 / 255.0, 1.0);
/// Fixed fill light that shares the sun's intensity but never casts shadows.
pub const FILL_LIGHT_POSITION: Vec4 = Vec4::new(10.0, 10.0, 30.0, 1.0);

/// A light as handed to the renderers for one frame.
///
/// `position.w == 0` marks a directional light, `1` a positional one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightDescriptor {
    pub position: Vec4,
    pub color: Vec4,
    /// Normalized intensity in `[0, 1]`.
    pub intensity: f32,
}

impl LightDescriptor {
    pub fn new(position: Vec4, color: Vec4, intensity: f32) -> Self {
        Self {
            position,
            color,
            intensity,
        }
    }

    pub fn is_directional(&self) -> bool {
        self.position.w == 0.0
    }

    /// Apparent light size, `10^(10 * intensity)`.
    pub fn size(&self) -> f32 {
        10f32.powf(10.0 * self.intensity)
    }

    /// Distance falloff factor used by the Phong term `1 / (1 + factor * d^2)`.
    pub fn attenuation_factor(&self) -> f32 {
        1.0 / self.size()
    }
}

/// Shadow darkness derived from the shadow light's attenuation factor.
///
/// Bright suns have tiny factors and produce deep shadows (0.1); as the
/// factor grows past 0.1 the shadows fade out.
pub fn shadow_strength(attenuation_factor: f32) -> f32 {
    if attenuation_factor > 0.1 {
        (attenuation_factor + 0.1).min(1.0)
    } else {
        0.1
    }
}

/// Periodic sun driven by elapsed wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct DayCycle {
    config: DayCycleConfig,
    fill_light: Vec4,
}

impl Default for DayCycle {
    fn default() -> Self {
        Self::new(DayCycleConfig::default())
    }
}

impl DayCycle {
    pub fn new(config: DayCycleConfig) -> Self {
        Self {
            config,
            fill_light: FILL_LIGHT_POSITION,
        }
    }

    /// Moves the secondary light, which never casts shadows.
    pub fn with_fill_light(mut self, position: Vec4) -> Self {
        self.fill_light = position;
        self
    }

    /// Converts elapsed seconds into cycle time units.
    pub fn cycle_time(&self, elapsed_seconds: f32) -> f32 {
        elapsed_seconds * self.config.time_scale
    }

    fn wave(&self, t: f32) -> f32 {
        let phase = t.rem_euclid(self.config.period);
        (TAU * phase / self.config.period).sin().max(-0.6)
    }

    /// Normalized sun intensity at cycle time `t`, exactly periodic.
    pub fn intensity(&self, t: f32) -> f32 {
        (self.wave(t) + 0.6) / 1.6
    }

    /// Sun position at cycle time `t`; it rises along the x = z diagonal.
    pub fn sun_position(&self, t: f32) -> Vec3 {
        let period = self.config.period;
        let x = (40.0 / 14.0 * (t + 8.0).rem_euclid(period) - 520.0 / 14.0).max(-20.0);
        let y = 10.0 * self.wave(t) + 10.0;
        Vec3::new(x, y, x)
    }

    pub fn frame(&self, elapsed_seconds: f32) -> FrameLighting {
        let t = self.cycle_time(elapsed_seconds);
        let intensity = self.intensity(t);
        let white = Vec4::ONE;
        let sun = LightDescriptor::new(self.sun_position(t).extend(1.0), white, intensity);
        let fill = LightDescriptor::new(self.fill_light, white, intensity);
        FrameLighting::new(t, [sun, fill])
    }
}

/// Lighting parameters computed once per frame and passed down to the draw calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLighting {
    pub cycle_time: f32,
    /// The first light casts the shadows.
    pub lights: [LightDescriptor; 2],
    pub ambient_modifier: f32,
    pub sky_color: Vec4,
    pub sky_ambient: f32,
    pub shadow_strength: f32,
}

impl FrameLighting {
    pub fn new(cycle_time: f32, lights: [LightDescriptor; 2]) -> Self {
        let intensity = lights[0].intensity;
        let night_weight = 1.0 - ((intensity - 0.1) * 1.5).min(1.0);
        let sky_ambient = if intensity > 0.1 {
            ((intensity - 0.1) * 8.0).min(1.0)
        } else {
            ((0.1 - intensity) * 8.0).min(0.4)
        };
        Self {
            cycle_time,
            lights,
            ambient_modifier: 0.8 * intensity + 0.2,
            sky_color: SKY_NOON
                .lerp(SKY_NIGHT, night_weight)
                .clamp(Vec4::ZERO, Vec4::ONE),
            sky_ambient,
            shadow_strength: shadow_strength(lights[0].attenuation_factor()),
        }
    }

    pub fn intensity(&self) -> f32 {
        self.lights[0].intensity
    }

    pub fn shadow_light(&self) -> &LightDescriptor {
        &self.lights[0]
    }

    pub fn is_night(&self) -> bool {
        self.intensity() <= 0.1
    }

    /// Ambient term of `material` scaled for this frame. Sky materials
    /// already carry the frame's sky ambient and are left unscaled.
    pub fn material_ambient(&self, material: &Material) -> f32 {
        if material.sky {
            material.ambient
        } else {
            material.ambient * self.ambient_modifier
        }
    }

    /// This frame's version of a sky dome material: sky-colored and unlit,
    /// with its night texture only after dark.
    pub fn sky_material(&self, base: &Material) -> Material {
        Material {
            color: self.sky_color,
            ambient: self.sky_ambient,
            diffusivity: 0.0,
            specularity: 0.0,
            texture: if self.is_night() {
                base.texture.clone()
            } else {
                None
            },
            receives_shadows: false,
            sky: true,
            ..base.clone()
        }
    }
}
