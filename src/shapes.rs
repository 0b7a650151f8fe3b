//! Built-in meshes that need no asset file.

use glam::{Vec2, Vec3};

use crate::model::{MeshGeometry, Vertex};

const CUBE_FACES: [(Vec3, Vec3, Vec3); 6] = [
    // normal, tangent (u), bitangent (v)
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
];

/// Side faces in the order they wrap around the Y axis.
const PANORAMA_ORDER: [usize; 4] = [0, 3, 1, 2];

/// Axis-aligned unit cube centered on the origin, one quad per face.
pub fn cube() -> MeshGeometry {
    cube_with_uvs(|_, uv| uv)
}

/// Cube for a sky dome. The four sides share one panorama, a quarter each,
/// read from the top quarter of the image. Top and bottom sample its corner.
pub fn skybox() -> MeshGeometry {
    cube_with_uvs(|face, uv| {
        match PANORAMA_ORDER.iter().position(|&side| side == face) {
            Some(strip) => Vec2::new((strip as f32 + uv.x) * 0.25, (1.0 - uv.y) * 0.25),
            None => Vec2::ZERO,
        }
    })
}

fn cube_with_uvs(map_uv: impl Fn(usize, Vec2) -> Vec2) -> MeshGeometry {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (face, (normal, u, v)) in CUBE_FACES.into_iter().enumerate() {
        let base = vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = 0.5 * (normal + su * u + sv * v);
            let uv = Vec2::new((su + 1.0) * 0.5, (sv + 1.0) * 0.5);
            vertices.push(Vertex::new(position, normal, map_uv(face, uv)));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MeshGeometry::indexed(vertices, indices)
}

/// Square spanning ±1 in the XY plane facing +Z, uvs in [0, 1].
pub fn square() -> MeshGeometry {
    let vertices = [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)]
        .map(|(x, y)| {
            Vertex::new(
                Vec3::new(x, y, 0.0),
                Vec3::Z,
                Vec2::new((x + 1.0) * 0.5, (y + 1.0) * 0.5),
            )
        })
        .to_vec();
    MeshGeometry::indexed(vertices, vec![0, 1, 2, 1, 3, 2])
}

/// Looks up a built-in shape by its scene-file name.
pub fn builtin(name: &str) -> Option<MeshGeometry> {
    match name {
        "cube" => Some(cube()),
        "square" => Some(square()),
        "skybox" => Some(skybox()),
        _ => None,
    }
}
