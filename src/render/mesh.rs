use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use wgpu::util::DeviceExt;

use crate::model::{Mesh, MeshGeometry, Model, Vertex};

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

/// Buffer layout for [`Vertex`], shared by the depth and color pipelines.
pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }
}

pub struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: Option<wgpu::Buffer>,
    count: u32,
}

impl MeshBuffers {
    /// Uploads `geometry`, or returns `None` when there is nothing to draw.
    pub fn from_geometry(device: &wgpu::Device, geometry: &MeshGeometry, label: &str) -> Option<Self> {
        if geometry.vertices.is_empty() || geometry.element_count() == 0 {
            return None;
        }
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = geometry.indices.as_ref().map(|indices| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-indices")),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });
        Some(Self {
            vertex,
            index,
            count: geometry.element_count() as u32,
        })
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex.slice(..));
        match &self.index {
            Some(index) => {
                pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..self.count, 0, 0..1);
            }
            None => pass.draw(0..self.count, 0..1),
        }
    }
}

/// GPU buffers for every mesh that has finished loading, keyed by mesh name.
#[derive(Default)]
pub struct MeshCache {
    meshes: HashMap<String, MeshBuffers>,
    empty: HashSet<String>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads meshes that became ready since the last frame.
    pub fn prepare(&mut self, device: &wgpu::Device, models: &[Model]) {
        for model in models {
            let name = model.mesh.name();
            if self.meshes.contains_key(name) || self.empty.contains(name) {
                continue;
            }
            let Some(geometry) = model.mesh.geometry() else {
                debug!("mesh {name} not ready; drawing without it this frame");
                continue;
            };
            match MeshBuffers::from_geometry(device, geometry, name) {
                Some(buffers) => {
                    self.meshes.insert(name.to_string(), buffers);
                }
                None => {
                    warn!("mesh {name} has no triangles");
                    self.empty.insert(name.to_string());
                }
            }
        }
    }

    pub fn get(&self, mesh: &Mesh) -> Option<&MeshBuffers> {
        self.meshes.get(mesh.name())
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}
