//! wgpu renderer: a shadow depth pass followed by the main color pass.

pub mod mesh;
mod overlay;
pub mod shading;
mod texture;

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::info;
use thiserror::Error;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::app::projection;
use crate::camera::CameraState;
use crate::config::{ShadowBias, ShadowConfig};
use crate::lighting::FrameLighting;
use crate::model::{Material, Model};
use crate::shadow::{
    create_sample_layout, shadow_transform, RasterState, ShadowMapRenderer, ShadowPassParams,
    ShadowTargetError, SHADOW_MAP_GROUP,
};

pub use mesh::{MeshBuffers, MeshCache};
pub use overlay::{overlay_rect, DepthOverlay};
pub use shading::{GlobalUniform, ObjectConstants, ShadingPipelines, ShadingPolicy, ShadowSampling};
pub use texture::MaterialTextures;

/// Why a frame could not be drawn.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Surface(#[from] wgpu::SurfaceError),
    #[error("shadow map unavailable: {0}")]
    Shadow(#[from] ShadowTargetError),
}

/// Everything the renderer reads for one frame.
pub struct FrameView<'a> {
    pub camera: &'a CameraState,
    pub lighting: &'a FrameLighting,
    pub models: &'a [Model],
    pub materials: &'a [Material],
}

/// GPU renderer backed by wgpu that draws the per-frame model list.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    shading: ShadingPipelines,
    shadow: ShadowMapRenderer,
    shadow_bias: ShadowBias,
    meshes: MeshCache,
    textures: MaterialTextures,
    overlay: DepthOverlay,
    show_depth: bool,
    default_material: Material,
}

impl Renderer {
    /// Initializes the GPU renderer for `window`. Textures resolve against `asset_root`.
    pub async fn new(
        window: Arc<Window>,
        shadow_config: ShadowConfig,
        asset_root: PathBuf,
    ) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        // The shadow target is validated against these limits, so ask for
        // what the adapter can actually do rather than the defaults.
        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("flyover-device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no supported formats")?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps
                .present_modes
                .iter()
                .copied()
                .find(|mode| {
                    matches!(
                        mode,
                        wgpu::PresentMode::Mailbox | wgpu::PresentMode::Immediate
                    )
                })
                .unwrap_or(wgpu::PresentMode::Fifo),
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);

        let global_layout = uniform_layout::<GlobalUniform>(&device, "global-bind-layout");
        let object_layout = uniform_layout::<ObjectConstants>(&device, "object-bind-layout");
        let sample_layout = Arc::new(create_sample_layout(&device));
        let textures = MaterialTextures::new(&device, &queue, asset_root);

        let mut group_layouts = vec![&global_layout, &object_layout];
        group_layouts.insert(SHADOW_MAP_GROUP as usize, sample_layout.as_ref());
        group_layouts.push(textures.layout());
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("color-pipeline-layout"),
            bind_group_layouts: &group_layouts,
            push_constant_ranges: &[],
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global-bind-group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let shading = ShadingPipelines::new(pipeline_layout, surface_format);
        let overlay = DepthOverlay::new(&device, surface_format);
        let shadow_bias = shadow_config.bias;
        let shadow = ShadowMapRenderer::new(shadow_config, sample_layout);
        info!(
            "renderer ready: {}x{} {:?}",
            size.width, size.height, surface_format
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            global_buffer,
            global_bind_group,
            object_layout,
            shading,
            shadow,
            shadow_bias,
            meshes: MeshCache::new(),
            textures,
            overlay,
            show_depth: false,
            default_material: Material::default(),
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn aspect(&self) -> f32 {
        self.size.width as f32 / self.size.height.max(1) as f32
    }

    /// Flips the depth-buffer overlay and returns the new setting.
    pub fn toggle_depth_view(&mut self) -> bool {
        self.show_depth = !self.show_depth;
        self.show_depth
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    /// Runs the shadow pass and then the color pass for one frame.
    pub fn render(&mut self, frame: &FrameView<'_>) -> Result<(), RenderError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        self.meshes.prepare(&self.device, frame.models);
        for material in frame.materials {
            if let Some(texture) = material.texture.as_deref() {
                self.textures.request(texture);
            }
        }
        self.textures.poll(&self.device, &self.queue);

        self.shadow.render(ShadowPassParams {
            device: &self.device,
            encoder: &mut encoder,
            meshes: &self.meshes,
            models: frame.models,
            light: frame.lighting.shadow_light(),
        })?;
        let light_space = self.shadow.light_space();

        let view_proj = projection(self.aspect()) * frame.camera.view();
        let globals = GlobalUniform::new(
            view_proj,
            light_space,
            frame.camera.position(),
            frame.lighting,
            self.shadow.map_size(),
            &self.shadow_bias,
        );
        self.queue
            .write_buffer(&self.global_buffer, 0, bytemuck::bytes_of(&globals));

        let mut draws = Vec::new();
        for model in frame.models {
            let Some(mesh) = self.meshes.get(&model.mesh) else {
                continue;
            };
            let base = frame
                .materials
                .get(model.material.0)
                .unwrap_or(&self.default_material);
            let material = if base.sky {
                Cow::Owned(frame.lighting.sky_material(base))
            } else {
                Cow::Borrowed(base)
            };
            let material = material.as_ref();
            let policy = ShadingPolicy::for_material(material, &self.shadow_bias);
            self.shading.get_or_create(&self.device, policy);

            let constants = ObjectConstants::new(
                model.transform,
                shadow_transform(light_space, model.transform),
                material,
                frame.lighting,
            );
            let object_buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("object-uniform"),
                    contents: bytemuck::bytes_of(&constants),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
            let object_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("object-bind-group"),
                layout: &self.object_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: object_buffer.as_entire_binding(),
                }],
            });
            draws.push((policy, mesh, object_bind_group, material.texture.clone()));
        }

        let overlay_view = self.show_depth.then(|| self.shadow.color_view()).flatten();
        if let Some(depth_color) = overlay_view {
            let aspect = self.aspect();
            self.overlay
                .prepare(&self.device, &self.queue, depth_color, aspect);
        }

        let sky = frame.lighting.sky_color;
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("color-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: sky.x as f64,
                        g: sky.y as f64,
                        b: sky.z as f64,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        RasterState::color(self.size.width, self.size.height).apply(&mut pass);
        pass.set_bind_group(0, &self.global_bind_group, &[]);
        if let Some(shadow_map) = self.shadow.sample_bind_group() {
            pass.set_bind_group(SHADOW_MAP_GROUP, shadow_map, &[]);
        }
        for (policy, mesh, bind_group, texture) in &draws {
            let Some(pipeline) = self.shading.get(policy) else {
                continue;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(1, bind_group, &[]);
            pass.set_bind_group(3, self.textures.bind_group(texture.as_deref()), &[]);
            mesh.draw(&mut pass);
        }
        if overlay_view.is_some() {
            self.overlay.draw(&mut pass);
        }

        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn uniform_layout<T>(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<T>() as u64),
            },
            count: None,
        }],
    })
}

pub(crate) struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    pub(crate) const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
