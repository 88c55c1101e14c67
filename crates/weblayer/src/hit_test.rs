//! Ray intersection against layer content planes.
//!
//! A content mesh is the unit quad `[-0.5, 0.5]²` at `z = 0` placed by the
//! content transform inside its layer.

use crate::layer::LayerId;
use dom::NodeId;
use glam::{Affine3A, Vec2, Vec3};
use serde::Serialize;

/// Interaction ray in the tree's coordinate space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Ray pointing down `-Z` through the given point.
    pub fn toward_negative_z(x: f32, y: f32, z: f32) -> Self {
        Self::new(Vec3::new(x, y, z), Vec3::NEG_Z)
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Where a ray meets a content plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Intersection {
    /// Hit point in tree space.
    pub point: [f32; 3],
    /// Distance from the ray origin.
    pub distance: f32,
    /// Normalized plane coordinate from the top-left corner.
    pub uv: [f32; 2],
}

/// Result of [`LayerTree::hit_test`](crate::LayerTree::hit_test).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerHit {
    pub layer: LayerId,
    pub intersection: Intersection,
    /// Most specific element of the layer under the hit point.
    pub element: NodeId,
}

/// Intersect `ray` with the unit quad transformed by `mesh`.
pub fn intersect_quad(ray: &Ray, mesh: &Affine3A) -> Option<Intersection> {
    if mesh.matrix3.determinant().abs() <= f32::EPSILON * f32::EPSILON {
        return None;
    }
    let inverse = mesh.inverse();
    let origin = inverse.transform_point3(ray.origin);
    let direction = inverse.transform_vector3(ray.direction);
    if direction.z.abs() <= f32::EPSILON {
        return None;
    }

    let t = -origin.z / direction.z;
    if t < 0.0 {
        return None;
    }
    let local = origin + direction * t;
    if local.x.abs() > 0.5 || local.y.abs() > 0.5 {
        return None;
    }

    let uv = Vec2::new(local.x + 0.5, 0.5 - local.y);
    Some(Intersection {
        point: ray.at(t).to_array(),
        distance: t * ray.direction.length(),
        uv: uv.to_array(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_hit_center() {
        let mesh = Affine3A::from_scale_rotation_translation(
            Vec3::new(0.5, 0.15, 1.0),
            Quat::IDENTITY,
            Vec3::new(0.25, -0.075, 0.0),
        );
        let hit = intersect_quad(&Ray::toward_negative_z(0.25, -0.075, 1.0), &mesh).unwrap();
        assert!((hit.distance - 1.0).abs() < 1e-6);
        assert!((hit.uv[0] - 0.5).abs() < 1e-5);
        assert!((hit.uv[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_uv_top_left() {
        let mesh = Affine3A::from_scale_rotation_translation(Vec3::ONE, Quat::IDENTITY, Vec3::ZERO);
        let hit = intersect_quad(&Ray::toward_negative_z(-0.4, 0.4, 1.0), &mesh).unwrap();
        assert!((hit.uv[0] - 0.1).abs() < 1e-5);
        assert!((hit.uv[1] - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_miss_and_behind() {
        let mesh = Affine3A::IDENTITY;
        assert!(intersect_quad(&Ray::toward_negative_z(2.0, 0.0, 1.0), &mesh).is_none());
        assert!(intersect_quad(&Ray::toward_negative_z(0.0, 0.0, -1.0), &mesh).is_none());
        assert!(intersect_quad(&Ray::new(Vec3::Z, Vec3::X), &mesh).is_none());
    }
}
