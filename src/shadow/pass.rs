use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use log::{debug, error, info};
use wgpu::util::DeviceExt;

use super::projection::light_space_matrix;
use super::target::{ShadowRenderTarget, ShadowTargetError, ShadowTargetSpec};
use crate::config::ShadowConfig;
use crate::lighting::LightDescriptor;
use crate::model::Model;
use crate::render::mesh::{vertex_layout, MeshBuffers, MeshCache};

/// Bind group index at which the color pass expects the shadow map.
pub const SHADOW_MAP_GROUP: u32 = 2;

/// Viewport, culling and blending for one pass.
///
/// Every pass builds its own pipeline and viewport from one of these, so the
/// color pass never inherits the depth pass's front-face culling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterState {
    pub viewport: [u32; 2],
    pub cull_mode: Option<wgpu::Face>,
    pub blend: Option<wgpu::BlendState>,
}

impl RasterState {
    /// Depth pass: full-map viewport, front faces culled, no blending.
    pub fn shadow(size: u32) -> Self {
        Self {
            viewport: [size, size],
            cull_mode: Some(wgpu::Face::Front),
            blend: None,
        }
    }

    pub fn color(width: u32, height: u32) -> Self {
        Self {
            viewport: [width, height],
            cull_mode: None,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
        }
    }

    pub fn primitive(&self) -> wgpu::PrimitiveState {
        wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: self.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            ..Default::default()
        }
    }

    pub fn apply(&self, pass: &mut wgpu::RenderPass<'_>) {
        let [width, height] = self.viewport;
        pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
    }
}

/// Layout of the shadow map as sampled by the color pass.
pub fn create_sample_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("shadow-sample-layout"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        }],
    })
}

/// Models drawn into the depth pass: shadow casters whose mesh has loaded.
pub fn shadow_casters(models: &[Model]) -> impl Iterator<Item = &Model> {
    models
        .iter()
        .filter(|model| model.casts_shadow && model.mesh.is_ready())
}

/// Inputs for one depth pass.
pub struct ShadowPassParams<'a> {
    pub device: &'a wgpu::Device,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub meshes: &'a MeshCache,
    pub models: &'a [Model],
    pub light: &'a LightDescriptor,
}

struct ShadowResources {
    target: ShadowRenderTarget,
    pipeline: wgpu::RenderPipeline,
    object_layout: wgpu::BindGroupLayout,
    sample_bind_group: wgpu::BindGroup,
}

/// Renders shadow casters into a light-space depth map once per frame.
///
/// GPU resources are created on the first [`render`](Self::render) call. A
/// rejected render-target configuration is reported once and every later
/// call returns the same error.
pub struct ShadowMapRenderer {
    config: ShadowConfig,
    sample_layout: Arc<wgpu::BindGroupLayout>,
    resources: Option<ShadowResources>,
    failure: Option<ShadowTargetError>,
    light_space: Mat4,
}

impl ShadowMapRenderer {
    pub fn new(config: ShadowConfig, sample_layout: Arc<wgpu::BindGroupLayout>) -> Self {
        Self {
            config,
            sample_layout,
            resources: None,
            failure: None,
            light_space: Mat4::IDENTITY,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.resources.is_some()
    }

    /// Light projection × view from the most recent pass.
    pub fn light_space(&self) -> Mat4 {
        self.light_space
    }

    pub fn map_size(&self) -> u32 {
        self.config.map_size
    }

    pub fn sample_bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.resources.as_ref().map(|r| &r.sample_bind_group)
    }

    /// Depth rendered as gray levels, for the debug overlay.
    pub fn color_view(&self) -> Option<&wgpu::TextureView> {
        self.resources.as_ref().map(|r| r.target.color_view())
    }

    /// Encodes the depth pass. Returns the number of casters drawn.
    pub fn render(&mut self, params: ShadowPassParams<'_>) -> Result<usize, ShadowTargetError> {
        let light_space = light_space_matrix(params.light, &self.config);
        self.light_space = light_space;
        let resources = self.ensure_resources(params.device)?;
        let raster = RasterState::shadow(resources.target.size());

        let mut draws: Vec<(&MeshBuffers, wgpu::BindGroup)> = Vec::new();
        for model in shadow_casters(params.models) {
            let Some(mesh) = params.meshes.get(&model.mesh) else {
                debug!("shadow pass skipping {}: mesh not uploaded", model.name);
                continue;
            };
            let constants = ShadowObject {
                light_mvp: (light_space * model.transform).to_cols_array_2d(),
            };
            let buffer = params
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("shadow-object-uniform"),
                    contents: bytemuck::bytes_of(&constants),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let bind_group = params.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("shadow-object-bind-group"),
                layout: &resources.object_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            draws.push((mesh, bind_group));
        }

        let mut pass = params
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: resources.target.color_view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: resources.target.depth_view(),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        raster.apply(&mut pass);
        pass.set_pipeline(&resources.pipeline);
        for (mesh, bind_group) in &draws {
            pass.set_bind_group(0, bind_group, &[]);
            mesh.draw(&mut pass);
        }
        Ok(draws.len())
    }

    fn ensure_resources(
        &mut self,
        device: &wgpu::Device,
    ) -> Result<&ShadowResources, ShadowTargetError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let resources = match self.resources.take() {
            Some(resources) => resources,
            None => {
                let spec = ShadowTargetSpec::new(self.config.map_size);
                let target = match ShadowRenderTarget::create(device, spec) {
                    Ok(target) => target,
                    Err(err) => {
                        error!("failed to configure shadow render target: {err}");
                        self.failure = Some(err.clone());
                        return Err(err);
                    }
                };
                info!("allocated {0}x{0} shadow map", spec.size);
                ShadowResources::new(device, target, &self.sample_layout)
            }
        };
        let resources: &ShadowResources = self.resources.insert(resources);
        Ok(resources)
    }
}

impl ShadowResources {
    fn new(
        device: &wgpu::Device,
        target: ShadowRenderTarget,
        sample_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADOW_SHADER.into()),
        });

        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow-object-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<ShadowObject>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow-pipeline-layout"),
            bind_group_layouts: &[&object_layout],
            push_constant_ranges: &[],
        });

        let raster = RasterState::shadow(target.size());
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shadow-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[vertex_layout()],
            },
            primitive: raster.primitive(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: ShadowTargetSpec::DEPTH_FORMAT,
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
                    format: ShadowTargetSpec::COLOR_FORMAT,
                    blend: raster.blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let sample_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow-sample-bind-group"),
            layout: sample_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(target.depth_view()),
            }],
        });

        Self {
            target,
            pipeline,
            object_layout,
            sample_bind_group,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ShadowObject {
    light_mvp: [[f32; 4]; 4],
}

const SHADOW_SHADER: &str = r#"
struct ShadowObject {
    light_mvp: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> object: ShadowObject;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return object.light_mvp * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(vec3<f32>(frag.z), 1.0);
}
"#;
