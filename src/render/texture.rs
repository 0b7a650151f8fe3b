use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use anyhow::{Context, Result};
use log::{error, info};

enum TextureSlot {
    Loading(Receiver<Result<image::RgbaImage>>),
    Ready(wgpu::BindGroup),
    Failed,
}

/// Material textures decoded off-thread and uploaded once ready.
///
/// Until a texture arrives its materials are drawn with a 1×1 white texture.
pub struct MaterialTextures {
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    fallback: wgpu::BindGroup,
    root: PathBuf,
    slots: HashMap<String, TextureSlot>,
}

impl MaterialTextures {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, root: impl Into<PathBuf>) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material-texture-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let white = image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        let fallback = upload(device, queue, &layout, &sampler, &white, "white");
        Self {
            layout,
            sampler,
            fallback,
            root: root.into(),
            slots: HashMap::new(),
        }
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// Starts decoding `name` unless it is already loading or loaded.
    pub fn request(&mut self, name: &str) {
        if self.slots.contains_key(name) {
            return;
        }
        let path = self.root.join(name);
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            // The receiver may be gone if the renderer shut down first.
            let _ = sender.send(decode(&path));
        });
        self.slots
            .insert(name.to_string(), TextureSlot::Loading(receiver));
    }

    /// Uploads every texture whose decode finished since the last call.
    pub fn poll(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        for (name, slot) in self.slots.iter_mut() {
            let TextureSlot::Loading(receiver) = slot else {
                continue;
            };
            match receiver.try_recv() {
                Ok(Ok(image)) => {
                    info!("loaded texture {name} ({}x{})", image.width(), image.height());
                    let bind_group =
                        upload(device, queue, &self.layout, &self.sampler, &image, name);
                    *slot = TextureSlot::Ready(bind_group);
                }
                Ok(Err(err)) => {
                    error!("failed to load texture {name}: {err:?}");
                    *slot = TextureSlot::Failed;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    error!("texture loader for {name} exited without a result");
                    *slot = TextureSlot::Failed;
                }
            }
        }
    }

    pub fn is_ready(&self, name: &str) -> bool {
        matches!(self.slots.get(name), Some(TextureSlot::Ready(_)))
    }

    /// Bind group for `name`, or the white fallback while it is unavailable.
    pub fn bind_group(&self, name: Option<&str>) -> &wgpu::BindGroup {
        match name.and_then(|name| self.slots.get(name)) {
            Some(TextureSlot::Ready(bind_group)) => bind_group,
            _ => &self.fallback,
        }
    }
}

fn decode(path: &Path) -> Result<image::RgbaImage> {
    let image = image::open(path)
        .with_context(|| format!("unable to decode {}", path.display()))?;
    Ok(image.to_rgba8())
}

fn upload(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    image: &image::RgbaImage,
    label: &str,
) -> wgpu::BindGroup {
    let (width, height) = image.dimensions();
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        image.as_raw(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}
