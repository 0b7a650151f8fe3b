//! Tunable constants for collision, motion, shadows and the day cycle.
//!
//! Every value has a default matching the reference mountain scene. Scene
//! files may override them through a `<settings>` block and the binary
//! applies command-line overrides on top.

use serde::{Deserialize, Serialize};

/// Resolution used for the shadow render target when nothing overrides it.
pub const DEFAULT_SHADOW_MAP_SIZE: u32 = 8192;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlyoverConfig {
    pub collision: CollisionConfig,
    pub motion: MotionConfig,
    pub shadow: ShadowConfig,
    pub day_cycle: DayCycleConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Destinations below this height are always blocked.
    pub floor_height: f32,
    /// Ray hits closer than this to the segment origin block the move.
    pub look_ahead: f32,
    /// Destinations closer than this to a triangle surface block the move.
    pub avoidance_radius: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            floor_height: -0.8,
            look_ahead: 2.5,
            avoidance_radius: 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub radians_per_frame: f32,
    pub meters_per_frame: f32,
    /// Pointer offset from the viewport center, in pixels, that does not steer.
    pub dead_zone: f32,
    /// Roll applied per frame while a roll key is held, in radians.
    pub roll_step: f32,
    /// Factor applied by each speed-up / speed-down command.
    pub speed_step: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            radians_per_frame: 1.0 / 200.0,
            meters_per_frame: 10.0,
            dead_zone: 70.0,
            roll_step: 0.1,
            speed_step: 1.2,
        }
    }
}

/// Depth bias applied when comparing against the shadow map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShadowBias {
    Constant { value: f32 },
    /// `max(scale * (1 - N.L), min)`
    NormalScaled { scale: f32, min: f32 },
}

impl Default for ShadowBias {
    fn default() -> Self {
        Self::NormalScaled {
            scale: 0.05,
            min: 0.01,
        }
    }
}

impl ShadowBias {
    pub const CONSTANT_DEFAULT: Self = Self::Constant { value: 0.005 };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Edge length of the square depth target in texels.
    pub map_size: u32,
    /// Half-width of the orthographic light volume.
    pub extent: f32,
    pub near: f32,
    pub far: f32,
    pub bias: ShadowBias,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            map_size: DEFAULT_SHADOW_MAP_SIZE,
            extent: 20.0,
            near: 0.0,
            far: 100.0,
            bias: ShadowBias::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DayCycleConfig {
    /// Length of one day in cycle time units.
    pub period: f32,
    /// Cycle time units advanced per elapsed second.
    pub time_scale: f32,
}

impl Default for DayCycleConfig {
    fn default() -> Self {
        Self {
            period: 20.0,
            time_scale: 0.5,
        }
    }
}
