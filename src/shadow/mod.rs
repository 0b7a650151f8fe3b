//! Shadow mapping: a light-space depth pass plus the math the color pass
//! uses to sample it.

mod pass;
pub mod projection;
mod target;

pub use pass::{
    create_sample_layout, shadow_casters, RasterState, ShadowMapRenderer, ShadowPassParams,
    SHADOW_MAP_GROUP,
};
pub use projection::{
    bias_matrix, is_inside_shadow_map, light_projection, light_space_matrix, light_view,
    shadow_coord, shadow_transform, shadow_visibility,
};
pub use target::{ShadowRenderTarget, ShadowTargetError, ShadowTargetSpec};
