use thiserror::Error;

/// The shadow render target could not be configured on this device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShadowTargetError {
    #[error("shadow map size must be non-zero")]
    ZeroSize,
    #[error("shadow map size {size} exceeds the device limit of {limit} texels")]
    TooLarge { size: u32, limit: u32 },
}

/// Requested shape of the shadow render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowTargetSpec {
    pub size: u32,
}

impl ShadowTargetSpec {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
    /// Companion attachment that receives depth as a gray level for debugging.
    pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    pub fn new(size: u32) -> Self {
        Self { size }
    }

    /// Checks the attachment combination against the device limits.
    pub fn validate(&self, limits: &wgpu::Limits) -> Result<(), ShadowTargetError> {
        if self.size == 0 {
            return Err(ShadowTargetError::ZeroSize);
        }
        if self.size > limits.max_texture_dimension_2d {
            return Err(ShadowTargetError::TooLarge {
                size: self.size,
                limit: limits.max_texture_dimension_2d,
            });
        }
        Ok(())
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.size,
            height: self.size,
            depth_or_array_layers: 1,
        }
    }
}

/// Square depth texture plus its companion color texture, allocated once.
pub struct ShadowRenderTarget {
    spec: ShadowTargetSpec,
    _depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    _color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
}

impl ShadowRenderTarget {
    pub fn create(device: &wgpu::Device, spec: ShadowTargetSpec) -> Result<Self, ShadowTargetError> {
        spec.validate(&device.limits())?;

        let texture = |label: &str, format: wgpu::TextureFormat| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: spec.extent(),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
        };
        let depth_texture = texture("shadow-depth-texture", ShadowTargetSpec::DEPTH_FORMAT);
        let color_texture = texture("shadow-color-texture", ShadowTargetSpec::COLOR_FORMAT);
        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            spec,
            _depth_texture: depth_texture,
            depth_view,
            _color_texture: color_texture,
            color_view,
        })
    }

    pub fn size(&self) -> u32 {
        self.spec.size
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    pub fn color_view(&self) -> &wgpu::TextureView {
        &self.color_view
    }
}
