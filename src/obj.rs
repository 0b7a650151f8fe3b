use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};

use crate::model::{MeshGeometry, Vertex};

/// Reads and parses an OBJ file from disk.
pub fn load_obj(path: &Path) -> Result<MeshGeometry> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_obj(&data).with_context(|| format!("failed to parse {}", path.display()))
}

/// Parses OBJ text into an indexed mesh.
///
/// Polygons are fan-triangulated. Vertices sharing the same
/// position/uv/normal triple are deduplicated. Missing normals are
/// replaced by area-weighted face normals; missing uvs are zero.
pub fn parse_obj(data: &str) -> Result<MeshGeometry> {
    let mut attributes = ObjAttributes::default();
    let mut faces: Vec<[Corner; 3]> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        let line_no = line_no + 1;
        match tag {
            "v" => attributes.positions.push(
                parse_vec3(parts).with_context(|| format!("invalid vertex on line {line_no}"))?,
            ),
            "vn" => attributes.normals.push(
                parse_vec3(parts).with_context(|| format!("invalid normal on line {line_no}"))?,
            ),
            "vt" => attributes.uvs.push(
                parse_vec2(parts)
                    .with_context(|| format!("invalid texture coordinate on line {line_no}"))?,
            ),
            "f" => {
                let polygon =
                    parse_face(parts).with_context(|| format!("invalid face on line {line_no}"))?;
                for i in 1..polygon.len() - 1 {
                    faces.push([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if attributes.positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    let (mut vertices, indices) = attributes.build(&faces)?;
    fill_missing_normals(&mut vertices, &indices);
    Ok(MeshGeometry::indexed(vertices, indices))
}

#[derive(Debug, Default)]
struct ObjAttributes {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
}

impl ObjAttributes {
    fn build(&self, faces: &[[Corner; 3]]) -> Result<(Vec<Vertex>, Vec<u32>)> {
        let mut lookup: HashMap<Key, u32> = HashMap::new();
        let mut vertices = Vec::new();
        let mut indices = Vec::with_capacity(faces.len() * 3);

        for corner in faces.iter().flatten() {
            let key = Key {
                position: resolve_index(corner.position, self.positions.len())
                    .ok_or_else(|| anyhow!("vertex index {} out of range", corner.position))?,
                uv: resolve_index(corner.uv, self.uvs.len()),
                normal: resolve_index(corner.normal, self.normals.len()),
            };
            let index = *lookup.entry(key).or_insert_with(|| {
                vertices.push(Vertex::new(
                    self.positions[key.position],
                    key.normal.map_or(Vec3::ZERO, |i| self.normals[i]),
                    key.uv.map_or(Vec2::ZERO, |i| self.uvs[i]),
                ));
                (vertices.len() - 1) as u32
            });
            indices.push(index);
        }
        Ok((vertices, indices))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Corner {
    position: i64,
    uv: i64,
    normal: i64,
}

fn parse_components<'a, const N: usize>(
    mut parts: impl Iterator<Item = &'a str>,
) -> Result<[f32; N]> {
    let mut out = [0.0; N];
    for slot in &mut out {
        *slot = parts
            .next()
            .ok_or_else(|| anyhow!("missing vector component"))?
            .parse::<f32>()?;
    }
    Ok(out)
}

fn parse_vec3<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    parse_components::<3>(parts).map(Vec3::from_array)
}

fn parse_vec2<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    parse_components::<2>(parts).map(Vec2::from_array)
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<Corner>> {
    let mut corners = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let position = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i64>()?;
        let uv = optional_index(segments.next())?;
        let normal = optional_index(segments.next())?;
        corners.push(Corner {
            position,
            uv,
            normal,
        });
    }
    if corners.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(corners)
}

fn optional_index(segment: Option<&str>) -> Result<i64> {
    match segment {
        None | Some("") => Ok(0),
        Some(text) => Ok(text.parse::<i64>()?),
    }
}

/// Maps a 1-based (or negative, relative) OBJ index to a 0-based one.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = (index - 1) as usize;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let back = index.unsigned_abs() as usize;
        (back <= len).then(|| len - back)
    } else {
        None
    }
}

fn fill_missing_normals(vertices: &mut [Vertex], indices: &[u32]) {
    let missing: Vec<bool> = vertices
        .iter()
        .map(|vertex| vertex.normal == [0.0; 3])
        .collect();
    if !missing.contains(&true) {
        return;
    }

    let mut accum = vec![Vec3::ZERO; vertices.len()];
    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        let p0 = vertices[i0].position();
        let face = (vertices[i1].position() - p0).cross(vertices[i2].position() - p0);
        for i in [i0, i1, i2] {
            accum[i] += face;
        }
    }

    for ((vertex, normal), missing) in vertices.iter_mut().zip(accum).zip(missing) {
        if missing {
            vertex.normal = normal.normalize_or_zero().into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_textured_quad() {
        let obj = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";
        let mesh = parse_obj(obj).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.as_deref(), Some(&[0, 1, 2, 0, 2, 3][..]));
        assert_eq!(mesh.vertices[2].uv, [1.0, 1.0]);
        assert_eq!(mesh.vertices[3].normal, [0.0, 0.0, 1.0]);
        assert_eq!(mesh.triangles().count(), 2);
    }

    #[test]
    fn computes_missing_normals() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = parse_obj(obj).unwrap();
        for vertex in &mesh.vertices {
            assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = parse_obj(obj).unwrap();
        assert_eq!(mesh.vertices[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(mesh.vertices[2].position, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn rejects_out_of_range_faces() {
        let err = parse_obj("v 0 0 0\nf 1 2 3\n").unwrap_err();
        assert!(format!("{err:#}").contains("out of range"));
    }

    #[test]
    fn reports_line_numbers() {
        let err = parse_obj("v 0 0 0\nv 1 x 0\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn load_obj_names_missing_file() {
        let err = load_obj(Path::new("missing/tree.obj")).unwrap_err();
        assert!(format!("{err:#}").contains("tree.obj"));
    }
}
