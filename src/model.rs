use std::sync::{Arc, OnceLock};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::geometry::Triangle;

/// Interleaved vertex layout shared by the shadow and color passes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.into(),
            normal: normal.into(),
            uv: uv.into(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Triangulated mesh data, either indexed or a flat list of triples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshGeometry {
    pub vertices: Vec<Vertex>,
    pub indices: Option<Vec<u32>>,
}

impl MeshGeometry {
    pub fn indexed(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices: Some(indices),
        }
    }

    pub fn non_indexed(vertices: Vec<Vertex>) -> Self {
        Self {
            vertices,
            indices: None,
        }
    }

    /// Number of vertices the rasterizer will consume.
    pub fn element_count(&self) -> usize {
        match &self.indices {
            Some(indices) => indices.len(),
            None => self.vertices.len(),
        }
    }

    /// Iterates the model-space triangles in triples.
    ///
    /// Trailing data that does not form a full triangle is dropped, and so is
    /// any indexed triangle referencing a vertex past the end of the buffer.
    pub fn triangles(&self) -> Box<dyn Iterator<Item = Triangle> + '_> {
        let vertices = &self.vertices;
        match &self.indices {
            Some(indices) => Box::new(indices.chunks_exact(3).filter_map(move |tri| {
                let v0 = vertices.get(tri[0] as usize)?;
                let v1 = vertices.get(tri[1] as usize)?;
                let v2 = vertices.get(tri[2] as usize)?;
                Some(Triangle::new(v0.position(), v1.position(), v2.position()))
            })),
            None => Box::new(vertices.chunks_exact(3).map(|tri| {
                Triangle::new(tri[0].position(), tri[1].position(), tri[2].position())
            })),
        }
    }
}

/// Mesh whose geometry may still be loading.
#[derive(Debug)]
pub struct Mesh {
    name: String,
    geometry: OnceLock<MeshGeometry>,
}

impl Mesh {
    /// Creates a mesh that becomes ready once [`Mesh::fulfill`] is called.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            geometry: OnceLock::new(),
        }
    }

    pub fn ready(name: impl Into<String>, geometry: MeshGeometry) -> Self {
        let mesh = Self::pending(name);
        mesh.fulfill(geometry);
        mesh
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stores the loaded geometry. Returns `false` if the mesh was already ready.
    pub fn fulfill(&self, geometry: MeshGeometry) -> bool {
        self.geometry.set(geometry).is_ok()
    }

    pub fn is_ready(&self) -> bool {
        self.geometry.get().is_some()
    }

    pub fn geometry(&self) -> Option<&MeshGeometry> {
        self.geometry.get()
    }
}

/// Index into the scene's material table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MaterialId(pub usize);

/// Surface description. Per-frame lighting is supplied separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    #[serde(default = "default_color")]
    pub color: Vec4,
    #[serde(default = "default_ambient")]
    pub ambient: f32,
    #[serde(default = "default_diffusivity")]
    pub diffusivity: f32,
    #[serde(default)]
    pub specularity: f32,
    #[serde(default = "default_smoothness")]
    pub smoothness: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    #[serde(default = "default_texture_scale")]
    pub texture_scale: Vec2,
    #[serde(default = "default_receives_shadows")]
    pub receives_shadows: bool,
    /// Unlit dome whose color and ambient follow the day cycle. The texture
    /// is only shown at night.
    #[serde(default)]
    pub sky: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            color: default_color(),
            ambient: default_ambient(),
            diffusivity: default_diffusivity(),
            specularity: 0.0,
            smoothness: default_smoothness(),
            texture: None,
            texture_scale: default_texture_scale(),
            receives_shadows: default_receives_shadows(),
            sky: false,
        }
    }
}

fn default_color() -> Vec4 {
    Vec4::ONE
}

fn default_ambient() -> f32 {
    0.5
}

fn default_diffusivity() -> f32 {
    0.8
}

fn default_smoothness() -> f32 {
    40.0
}

fn default_texture_scale() -> Vec2 {
    Vec2::ONE
}

fn default_receives_shadows() -> bool {
    true
}

/// One drawable entry of the per-frame model list.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub mesh: Arc<Mesh>,
    pub transform: Mat4,
    pub collidable: bool,
    pub casts_shadow: bool,
    pub material: MaterialId,
}

impl Model {
    /// World-space triangles, or `None` while the mesh is still loading.
    pub fn world_triangles(&self) -> Option<impl Iterator<Item = Triangle> + '_> {
        let geometry = self.mesh.geometry()?;
        let transform = self.transform;
        Some(
            geometry
                .triangles()
                .map(move |triangle| triangle.transformed(&transform)),
        )
    }
}

/// Read-only snapshot of the models for the current frame.
pub type FrameModels = Arc<[Model]>;

/// Shared registry the scene republishes every frame.
///
/// Readers receive an immutable snapshot, so the motion controller and the
/// shadow pass always observe the same list within a frame.
#[derive(Debug)]
pub struct ModelRegistry {
    models: Arc<RwLock<FrameModels>>,
}

impl Clone for ModelRegistry {
    fn clone(&self) -> Self {
        Self {
            models: Arc::clone(&self.models),
        }
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: Arc::new(RwLock::new(Arc::from(Vec::new()))),
        }
    }

    /// Replaces the published list with this frame's models.
    pub fn publish(&self, models: Vec<Model>) {
        *self.models.write() = Arc::from(models);
    }

    pub fn snapshot(&self) -> FrameModels {
        Arc::clone(&self.models.read())
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32, z: f32) -> Vertex {
        Vertex::new(Vec3::new(x, y, z), Vec3::Z, Vec2::ZERO)
    }

    #[test]
    fn non_indexed_triangles_drop_trailing_data() {
        let geometry = MeshGeometry::non_indexed(vec![
            vertex(0.0, 0.0, 0.0),
            vertex(1.0, 0.0, 0.0),
            vertex(0.0, 1.0, 0.0),
            vertex(5.0, 5.0, 5.0),
        ]);
        assert_eq!(geometry.triangles().count(), 1);
    }

    #[test]
    fn indexed_triangles_skip_out_of_range_indices() {
        let geometry = MeshGeometry::indexed(
            vec![
                vertex(0.0, 0.0, 0.0),
                vertex(1.0, 0.0, 0.0),
                vertex(0.0, 1.0, 0.0),
            ],
            vec![0, 1, 2, 0, 2, 9, 1],
        );
        let triangles: Vec<_> = geometry.triangles().collect();
        assert_eq!(triangles.len(), 1);
        assert_eq!(triangles[0].v1, Vec3::X);
    }

    #[test]
    fn pending_mesh_has_no_world_triangles() {
        let model = Model {
            name: "Tree".into(),
            mesh: Arc::new(Mesh::pending("tree.obj")),
            transform: Mat4::IDENTITY,
            collidable: true,
            casts_shadow: true,
            material: MaterialId::default(),
        };
        assert!(model.world_triangles().is_none());
        assert!(model.mesh.fulfill(MeshGeometry::default()));
        assert!(model.world_triangles().is_some());
        assert!(!model.mesh.fulfill(MeshGeometry::default()));
    }

    #[test]
    fn world_triangles_apply_model_transform() {
        let mesh = Mesh::ready(
            "tri",
            MeshGeometry::non_indexed(vec![
                vertex(0.0, 0.0, 0.0),
                vertex(1.0, 0.0, 0.0),
                vertex(0.0, 1.0, 0.0),
            ]),
        );
        let model = Model {
            name: "Shifted".into(),
            mesh: Arc::new(mesh),
            transform: Mat4::from_translation(Vec3::new(0.0, 0.0, -4.0)),
            collidable: true,
            casts_shadow: false,
            material: MaterialId(0),
        };
        let triangle = model.world_triangles().unwrap().next().unwrap();
        assert_eq!(triangle.v0, Vec3::new(0.0, 0.0, -4.0));
    }

    #[test]
    fn registry_snapshots_are_stable_across_publish() {
        let registry = ModelRegistry::new();
        let mesh = Arc::new(Mesh::ready("empty", MeshGeometry::default()));
        let model = Model {
            name: "Cube".into(),
            mesh,
            transform: Mat4::IDENTITY,
            collidable: false,
            casts_shadow: false,
            material: MaterialId(0),
        };
        registry.publish(vec![model.clone()]);
        let before = registry.snapshot();
        registry.publish(vec![model.clone(), model]);
        assert_eq!(before.len(), 1);
        assert_eq!(registry.len(), 2);
    }
}
