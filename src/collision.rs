use glam::Vec3;
use log::debug;

use crate::config::CollisionConfig;
use crate::geometry::{ray_triangle_intersect, sphere_triangle_intersect, Segment};
use crate::model::Model;

/// Reason a proposed displacement was refused.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Collision {
    /// The destination is below the world floor.
    Floor,
    /// The movement ray hits a triangle inside the look-ahead horizon.
    Ray { model: usize, point: Vec3 },
    /// The destination is within the avoidance radius of a triangle.
    Sphere { model: usize, point: Vec3 },
}

/// Brute-force segment test against every collidable triangle.
///
/// Each query transforms and tests every triangle of every collidable model,
/// which is fine for one camera segment per frame but has no spatial index.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollisionDetector {
    config: CollisionConfig,
}

impl CollisionDetector {
    pub fn new(config: CollisionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CollisionConfig {
        &self.config
    }

    /// Returns `true` when moving from `p1` to `p2` is not blocked.
    pub fn collision_free(&self, p1: Vec3, p2: Vec3, models: &[Model]) -> bool {
        self.check(p1, p2, models).is_none()
    }

    /// Finds the first reason the move from `p1` to `p2` is blocked, if any.
    pub fn check(&self, p1: Vec3, p2: Vec3, models: &[Model]) -> Option<Collision> {
        if p2.y < self.config.floor_height {
            return Some(Collision::Floor);
        }
        let segment = Segment::new(p1, p2);
        if segment.is_degenerate() {
            return None;
        }

        let direction = segment.direction();
        for (index, model) in models.iter().enumerate() {
            if !model.collidable {
                continue;
            }
            let Some(triangles) = model.world_triangles() else {
                debug!("skipping collision against {}: mesh not ready", model.name);
                continue;
            };
            for triangle in triangles {
                if let Some(point) = ray_triangle_intersect(p1, direction, &triangle) {
                    if point.distance(p1) <= self.config.look_ahead {
                        return Some(Collision::Ray {
                            model: index,
                            point,
                        });
                    }
                }
                if let Some(point) =
                    sphere_triangle_intersect(p2, self.config.avoidance_radius, &triangle)
                {
                    return Some(Collision::Sphere {
                        model: index,
                        point,
                    });
                }
            }
        }
        None
    }
}
