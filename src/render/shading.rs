//! Color-pass shaders assembled from small WGSL snippets.
//!
//! Phong lighting is always present. Texture sampling and shadow sampling
//! are optional stages selected per material through [`ShadingPolicy`].

use std::collections::HashMap;
use std::fmt;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use log::debug;

use crate::config::ShadowBias;
use crate::lighting::FrameLighting;
use crate::model::Material;

use super::mesh::vertex_layout;
use super::DepthBuffer;
use crate::shadow::RasterState;

/// How a material samples the shadow map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowSampling {
    Off,
    ConstantBias,
    NormalBias,
}

impl ShadowSampling {
    pub fn from_bias(bias: &ShadowBias) -> Self {
        match bias {
            ShadowBias::Constant { .. } => Self::ConstantBias,
            ShadowBias::NormalScaled { .. } => Self::NormalBias,
        }
    }
}

/// Combination of optional shading stages; one pipeline is built per policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadingPolicy {
    pub texture: bool,
    pub shadow: ShadowSampling,
}

impl ShadingPolicy {
    pub const PLAIN: Self = Self {
        texture: false,
        shadow: ShadowSampling::Off,
    };

    pub fn for_material(material: &Material, bias: &ShadowBias) -> Self {
        Self {
            texture: material.texture.is_some(),
            shadow: if material.receives_shadows {
                ShadowSampling::from_bias(bias)
            } else {
                ShadowSampling::Off
            },
        }
    }

    /// Full WGSL source for this combination.
    pub fn wgsl(&self) -> String {
        let mut source = String::from(COMMON_WGSL);
        match self.shadow {
            ShadowSampling::Off => source.push_str(NO_SHADOW_WGSL),
            ShadowSampling::ConstantBias => {
                source.push_str(CONSTANT_BIAS_WGSL);
                source.push_str(SHADOW_WGSL);
            }
            ShadowSampling::NormalBias => {
                source.push_str(NORMAL_BIAS_WGSL);
                source.push_str(SHADOW_WGSL);
            }
        }
        source.push_str(if self.texture {
            TEXTURED_FRAGMENT_WGSL
        } else {
            PLAIN_FRAGMENT_WGSL
        });
        source
    }
}

impl fmt::Display for ShadingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("phong")?;
        if self.texture {
            f.write_str("+texture")?;
        }
        match self.shadow {
            ShadowSampling::Off => Ok(()),
            ShadowSampling::ConstantBias => f.write_str("+shadow-constant"),
            ShadowSampling::NormalBias => f.write_str("+shadow-normal"),
        }
    }
}

/// Lazily built color pipelines keyed by [`ShadingPolicy`].
pub struct ShadingPipelines {
    layout: wgpu::PipelineLayout,
    format: wgpu::TextureFormat,
    raster: RasterState,
    pipelines: HashMap<ShadingPolicy, wgpu::RenderPipeline>,
}

impl ShadingPipelines {
    pub fn new(layout: wgpu::PipelineLayout, format: wgpu::TextureFormat) -> Self {
        Self {
            layout,
            format,
            raster: RasterState::color(1, 1),
            pipelines: HashMap::new(),
        }
    }

    pub fn get_or_create(
        &mut self,
        device: &wgpu::Device,
        policy: ShadingPolicy,
    ) -> &wgpu::RenderPipeline {
        let Self {
            layout,
            format,
            raster,
            pipelines,
        } = self;
        pipelines.entry(policy).or_insert_with(|| {
            debug!("building color pipeline {policy}");
            build_pipeline(device, layout, *format, raster, policy)
        })
    }

    pub fn get(&self, policy: &ShadingPolicy) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(policy)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    format: wgpu::TextureFormat,
    raster: &RasterState,
    policy: ShadingPolicy,
) -> wgpu::RenderPipeline {
    let label = format!("color-{policy}");
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&label),
        source: wgpu::ShaderSource::Wgsl(policy.wgsl().into()),
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[vertex_layout()],
        },
        primitive: raster.primitive(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DepthBuffer::FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: raster.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GlobalUniform {
    view_proj: [[f32; 4]; 4],
    light_space: [[f32; 4]; 4],
    camera_position: [f32; 4],
    light_positions: [[f32; 4]; 2],
    light_colors: [[f32; 4]; 2],
    light_attenuation: [f32; 4],
    lighting: [f32; 4],
    shadow_bias: [f32; 4],
}

impl GlobalUniform {
    pub fn new(
        view_proj: Mat4,
        light_space: Mat4,
        camera_position: Vec3,
        lighting: &FrameLighting,
        shadow_map_size: u32,
        bias: &ShadowBias,
    ) -> Self {
        let [sun, fill] = &lighting.lights;
        let shadow_bias = match *bias {
            ShadowBias::Constant { value } => [value, 0.0, 0.0, 0.0],
            ShadowBias::NormalScaled { scale, min } => [0.0, scale, min, 0.0],
        };
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            light_space: light_space.to_cols_array_2d(),
            camera_position: camera_position.extend(1.0).into(),
            light_positions: [sun.position.into(), fill.position.into()],
            light_colors: [sun.color.into(), fill.color.into()],
            light_attenuation: [
                sun.attenuation_factor(),
                fill.attenuation_factor(),
                0.0,
                lighting.lights.len() as f32,
            ],
            lighting: [
                lighting.ambient_modifier,
                lighting.shadow_strength,
                shadow_map_size as f32,
                0.0,
            ],
            shadow_bias,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectConstants {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
    shadow_transform: [[f32; 4]; 4],
    color: [f32; 4],
    material: [f32; 4],
    texture: [f32; 4],
}

impl ObjectConstants {
    pub fn new(
        model: Mat4,
        shadow_transform: Mat4,
        material: &Material,
        lighting: &FrameLighting,
    ) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal_matrix(model)),
            shadow_transform: shadow_transform.to_cols_array_2d(),
            color: material.color.into(),
            material: [
                lighting.material_ambient(material),
                material.diffusivity,
                material.specularity,
                material.smoothness,
            ],
            texture: [material.texture_scale.x, material.texture_scale.y, 0.0, 0.0],
        }
    }
}

/// Inverse-transpose of the model's linear part; flattened models keep the
/// plain linear part since they have no inverse.
fn normal_matrix(model: Mat4) -> Mat3 {
    let linear = Mat3::from_mat4(model);
    if linear.determinant().abs() <= f32::EPSILON {
        linear
    } else {
        linear.inverse().transpose()
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

const COMMON_WGSL: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    light_space: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_positions: array<vec4<f32>, 2>,
    light_colors: array<vec4<f32>, 2>,
    // xy: per-light attenuation factors, w: light count
    light_attenuation: vec4<f32>,
    // x: ambient modifier, y: shadow strength, z: shadow map size
    lighting: vec4<f32>,
    // x: constant bias, y: normal bias scale, z: normal bias minimum
    shadow_bias: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    shadow_transform: mat4x4<f32>,
    color: vec4<f32>,
    // ambient, diffusivity, specularity, smoothness
    material: vec4<f32>,
    texture: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) shadow_coord: vec4<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;
    out.normal = normalize(world_normal);
    out.uv = input.uv * object.texture.xy;
    out.shadow_coord = object.shadow_transform * vec4<f32>(input.position, 1.0);
    return out;
}

fn phong_lights(n: vec3<f32>, world_pos: vec3<f32>) -> vec3<f32> {
    let eye = normalize(globals.camera_position.xyz - world_pos);
    var result = vec3<f32>(0.0);
    let count = min(u32(globals.light_attenuation.w), 2u);
    for (var i = 0u; i < count; i = i + 1u) {
        let light = globals.light_positions[i];
        let to_light = light.xyz - light.w * world_pos;
        let dist = length(to_light);
        let l = normalize(to_light);
        let h = normalize(l + eye);
        let diffuse = max(dot(n, l), 0.0);
        let specular = pow(max(dot(n, h), 0.0), object.material.w);
        let attenuation = 1.0 / (1.0 + globals.light_attenuation[i] * dist * dist);
        let color = globals.light_colors[i].rgb;
        let contribution = object.color.rgb * color * object.material.y * diffuse
            + color * object.material.z * specular;
        result = result + attenuation * contribution;
    }
    return result;
}
"#;

const NO_SHADOW_WGSL: &str = r#"
fn shadow_visibility(shadow_coord: vec4<f32>, n: vec3<f32>, world_pos: vec3<f32>) -> f32 {
    return 1.0;
}
"#;

const CONSTANT_BIAS_WGSL: &str = r#"
fn shadow_bias(n: vec3<f32>, world_pos: vec3<f32>) -> f32 {
    return globals.shadow_bias.x;
}
"#;

const NORMAL_BIAS_WGSL: &str = r#"
fn shadow_bias(n: vec3<f32>, world_pos: vec3<f32>) -> f32 {
    let light = globals.light_positions[0];
    let l = normalize(light.xyz - light.w * world_pos);
    return max(globals.shadow_bias.y * (1.0 - dot(n, l)), globals.shadow_bias.z);
}
"#;

const SHADOW_WGSL: &str = r#"
@group(2) @binding(0)
var shadow_map: texture_depth_2d;

fn shadow_visibility(shadow_coord: vec4<f32>, n: vec3<f32>, world_pos: vec3<f32>) -> f32 {
    let coord = shadow_coord.xyz / shadow_coord.w;
    if (coord.x < 0.0 || coord.x > 1.0 || coord.y < 0.0 || coord.y > 1.0) {
        return 1.0;
    }
    let size = i32(globals.lighting.z);
    let texel = clamp(vec2<i32>(coord.xy * f32(size)), vec2<i32>(0), vec2<i32>(size - 1));
    let sampled = textureLoad(shadow_map, texel, 0);
    if (sampled < coord.z - shadow_bias(n, world_pos)) {
        return globals.lighting.y;
    }
    return 1.0;
}
"#;

const PLAIN_FRAGMENT_WGSL: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(input.normal);
    let visibility = shadow_visibility(input.shadow_coord, n, input.world_pos);
    let ambient = object.color.rgb * object.material.x;
    let lit = ambient + visibility * phong_lights(n, input.world_pos);
    return vec4<f32>(lit, object.color.a);
}
"#;

const TEXTURED_FRAGMENT_WGSL: &str = r#"
@group(3) @binding(0)
var base_texture: texture_2d<f32>;
@group(3) @binding(1)
var base_sampler: sampler;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let tex = textureSample(base_texture, base_sampler, input.uv);
    if (tex.a < 0.01) {
        discard;
    }
    let n = normalize(input.normal);
    let visibility = shadow_visibility(input.shadow_coord, n, input.world_pos);
    let ambient = visibility * (tex.rgb + object.color.rgb) * object.material.x;
    let lit = ambient + visibility * phong_lights(n, input.world_pos);
    return vec4<f32>(lit, object.color.a * tex.a);
}
"#;
