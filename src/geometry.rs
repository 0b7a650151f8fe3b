use glam::{Mat4, Vec3};

/// Parallel-ray threshold for [`ray_triangle_intersect`].
pub const EPSILON: f32 = 1e-6;

/// World-space triangle derived from a mesh for a single query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
}

impl Triangle {
    pub const fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }

    /// Moves the triangle from model space into world space.
    pub fn transformed(&self, transform: &Mat4) -> Self {
        Self {
            v0: transform.transform_point3(self.v0),
            v1: transform.transform_point3(self.v1),
            v2: transform.transform_point3(self.v2),
        }
    }

    pub fn centroid(&self) -> Vec3 {
        (self.v0 + self.v1 + self.v2) / 3.0
    }

    /// Unnormalized face normal following counter-clockwise winding.
    pub fn normal(&self) -> Vec3 {
        (self.v1 - self.v0).cross(self.v2 - self.v0)
    }
}

/// Proposed camera displacement for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub origin: Vec3,
    pub destination: Vec3,
}

impl Segment {
    pub const fn new(origin: Vec3, destination: Vec3) -> Self {
        Self {
            origin,
            destination,
        }
    }

    pub fn length(&self) -> f32 {
        (self.destination - self.origin).length()
    }

    /// Unit direction from origin to destination, zero for a degenerate segment.
    pub fn direction(&self) -> Vec3 {
        (self.destination - self.origin).normalize_or_zero()
    }

    pub fn is_degenerate(&self) -> bool {
        self.origin == self.destination
    }
}

/// Determinant-based ray/triangle test.
///
/// The barycentric bounds are compared against the unscaled determinant, so
/// only triangles whose counter-clockwise face points back at the ray are
/// reported. The parametric distance is not clamped: a hit behind the origin
/// is still returned.
pub fn ray_triangle_intersect(origin: Vec3, direction: Vec3, triangle: &Triangle) -> Option<Vec3> {
    let edge1 = triangle.v1 - triangle.v0;
    let edge2 = triangle.v2 - triangle.v0;

    let pvec = direction.cross(edge2);
    let det = edge1.dot(pvec);
    if det.abs() < EPSILON {
        return None;
    }

    let tvec = origin - triangle.v0;
    let u = tvec.dot(pvec);
    if u < 0.0 || u > det {
        return None;
    }

    let qvec = tvec.cross(edge1);
    let v = direction.dot(qvec);
    if v < 0.0 || u + v > det {
        return None;
    }

    let t = edge2.dot(qvec) / det;
    Some(origin + direction * t)
}

/// Point-in-triangle-plus-distance test.
///
/// Projects `center` onto the triangle's plane and accepts the projection only
/// when it falls inside the triangle and lies within `radius` of `center`.
/// Overlap with edges outside the projected footprint is not detected.
pub fn sphere_triangle_intersect(center: Vec3, radius: f32, triangle: &Triangle) -> Option<Vec3> {
    let u = triangle.v1 - triangle.v0;
    let v = triangle.v2 - triangle.v0;
    let n = u.cross(v);
    let n2 = n.dot(n);
    if n2 <= f32::EPSILON * f32::EPSILON {
        return None;
    }

    let w = center - triangle.v0;
    let gamma = u.cross(w).dot(n) / n2;
    let beta = w.cross(v).dot(n) / n2;
    let alpha = 1.0 - gamma - beta;

    let unit = 0.0..=1.0;
    if !(unit.contains(&alpha) && unit.contains(&beta) && unit.contains(&gamma)) {
        return None;
    }

    let hit = triangle.v0 * alpha + triangle.v1 * beta + triangle.v2 * gamma;
    (hit.distance(center) <= radius).then_some(hit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facing_z() -> Triangle {
        // Counter-clockwise when seen from +Z.
        Triangle::new(
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn parallel_ray_never_hits() {
        let triangle = facing_z();
        for origin in [
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(-3.0, 2.0, 0.0),
            Vec3::new(0.1, 0.1, 0.0),
            Vec3::new(5.0, -7.0, -2.0),
        ] {
            assert_eq!(ray_triangle_intersect(origin, Vec3::X, &triangle), None);
            assert_eq!(
                ray_triangle_intersect(origin, Vec3::new(1.0, 1.0, 0.0).normalize(), &triangle),
                None
            );
        }
    }

    #[test]
    fn ray_through_centroid_returns_centroid() {
        let triangle = facing_z();
        let centroid = triangle.centroid();
        let origin = centroid + Vec3::new(0.0, 0.0, 5.0);
        let hit = ray_triangle_intersect(origin, Vec3::NEG_Z, &triangle).unwrap();
        assert!(hit.abs_diff_eq(centroid, 1e-5), "{hit:?} != {centroid:?}");
    }

    #[test]
    fn oblique_ray_through_centroid_returns_centroid() {
        let triangle = Triangle::new(
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(0.0, 0.0, 2.0),
        );
        let centroid = triangle.centroid();
        let origin = Vec3::new(3.0, 2.5, 4.0);
        let direction = (centroid - origin).normalize();
        let hit = ray_triangle_intersect(origin, direction, &triangle).unwrap();
        assert!(hit.abs_diff_eq(centroid, 1e-5));
    }

    #[test]
    fn ray_outside_triangle_misses() {
        let triangle = facing_z();
        let origin = Vec3::new(3.0, 3.0, 5.0);
        assert_eq!(ray_triangle_intersect(origin, Vec3::NEG_Z, &triangle), None);
    }

    #[test]
    fn back_face_is_not_reported() {
        let triangle = facing_z();
        let origin = Vec3::new(0.0, 0.0, -5.0);
        assert_eq!(ray_triangle_intersect(origin, Vec3::Z, &triangle), None);
    }

    #[test]
    fn sphere_at_vertex_with_zero_radius_returns_vertex() {
        let triangle = facing_z();
        for vertex in [triangle.v0, triangle.v1, triangle.v2] {
            assert_eq!(sphere_triangle_intersect(vertex, 0.0, &triangle), Some(vertex));
        }
    }

    #[test]
    fn sphere_off_triangle_with_zero_radius_misses() {
        let triangle = facing_z();
        assert_eq!(
            sphere_triangle_intersect(Vec3::new(0.0, 0.0, 0.5), 0.0, &triangle),
            None
        );
        assert_eq!(
            sphere_triangle_intersect(Vec3::new(4.0, 4.0, 0.0), 0.0, &triangle),
            None
        );
    }

    #[test]
    fn sphere_hits_within_radius_of_face() {
        let triangle = facing_z();
        let center = Vec3::new(0.0, 0.0, 1.0);
        let hit = sphere_triangle_intersect(center, 1.5, &triangle).unwrap();
        assert!(hit.abs_diff_eq(Vec3::ZERO, 1e-6));
        assert_eq!(sphere_triangle_intersect(center, 0.5, &triangle), None);
    }

    #[test]
    fn sphere_ignores_edge_overlap_outside_footprint() {
        let triangle = facing_z();
        // Close to the right edge but projecting outside the triangle.
        let center = Vec3::new(1.2, -0.9, 0.0);
        assert_eq!(sphere_triangle_intersect(center, 1.0, &triangle), None);
    }

    #[test]
    fn degenerate_triangle_is_not_an_error() {
        let sliver = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::X * 2.0);
        assert_eq!(sphere_triangle_intersect(Vec3::X, 1.0, &sliver), None);
        assert_eq!(ray_triangle_intersect(Vec3::Z, Vec3::NEG_Z, &sliver), None);
    }

    #[test]
    fn transformed_moves_every_vertex() {
        let triangle = facing_z().transformed(&Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)));
        assert_eq!(triangle.v0, Vec3::new(-1.0, 1.0, 0.0));
        assert_eq!(triangle.v2, Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn segment_direction_is_unit_length() {
        let segment = Segment::new(Vec3::ZERO, Vec3::new(0.0, 3.0, 4.0));
        assert!((segment.length() - 5.0).abs() < 1e-6);
        assert!((segment.direction().length() - 1.0).abs() < 1e-6);
        assert!(Segment::new(Vec3::ONE, Vec3::ONE).is_degenerate());
    }
}
