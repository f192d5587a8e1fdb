/// Data-Oriented Axis-Aligned Bounding Box helpers
///
/// Pure functions over `Aabb` - no methods beyond construction constants.

use cgmath::{Point3, Vector3};

/// Axis-Aligned Bounding Box - pure data structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// Identity for `aabb_merge`
    pub const NULL: Self = Self {
        min: Point3::new(f32::MAX, f32::MAX, f32::MAX),
        max: Point3::new(-f32::MAX, -f32::MAX, -f32::MAX),
    };

    pub const INFINITE: Self = Self {
        min: Point3::new(-f32::MAX, -f32::MAX, -f32::MAX),
        max: Point3::new(f32::MAX, f32::MAX, f32::MAX),
    };
}

/// Create new AABB from min/max points
pub fn create_aabb(min: Point3<f32>, max: Point3<f32>) -> Aabb {
    Aabb { min, max }
}

/// Create AABB from center point and half extents
pub fn aabb_from_center_half_extents(center: Point3<f32>, half_extents: Vector3<f32>) -> Aabb {
    Aabb {
        min: center - half_extents,
        max: center + half_extents,
    }
}

pub fn aabb_center(aabb: &Aabb) -> Point3<f32> {
    Point3::new(
        (aabb.min.x + aabb.max.x) * 0.5,
        (aabb.min.y + aabb.max.y) * 0.5,
        (aabb.min.z + aabb.max.z) * 0.5,
    )
}

pub fn aabb_half_extents(aabb: &Aabb) -> Vector3<f32> {
    (aabb.max - aabb.min) * 0.5
}

pub fn aabb_size(aabb: &Aabb) -> Vector3<f32> {
    aabb.max - aabb.min
}

/// Test if two AABBs intersect, touching faces count as intersecting
pub fn aabb_intersects(aabb1: &Aabb, aabb2: &Aabb) -> bool {
    aabb1.min.x <= aabb2.max.x && aabb1.max.x >= aabb2.min.x &&
    aabb1.min.y <= aabb2.max.y && aabb1.max.y >= aabb2.min.y &&
    aabb1.min.z <= aabb2.max.z && aabb1.max.z >= aabb2.min.z
}

/// Smallest AABB enclosing both inputs
pub fn aabb_merge(aabb1: &Aabb, aabb2: &Aabb) -> Aabb {
    Aabb {
        min: Point3::new(
            aabb1.min.x.min(aabb2.min.x),
            aabb1.min.y.min(aabb2.min.y),
            aabb1.min.z.min(aabb2.min.z),
        ),
        max: Point3::new(
            aabb1.max.x.max(aabb2.max.x),
            aabb1.max.y.max(aabb2.max.y),
            aabb1.max.z.max(aabb2.max.z),
        ),
    }
}

/// True when min <= max on every axis
pub fn aabb_is_valid(aabb: &Aabb) -> bool {
    aabb.min.x <= aabb.max.x && aabb.min.y <= aabb.max.y && aabb.min.z <= aabb.max.z
}

/// Point on the segment between `aabb.min` and `aabb.max`, per-axis factor
pub fn aabb_lerp(aabb: &Aabb, t: Vector3<f32>) -> Point3<f32> {
    let size = aabb_size(aabb);
    Point3::new(
        aabb.min.x + size.x * t.x,
        aabb.min.y + size.y * t.y,
        aabb.min.z + size.z * t.z,
    )
}

/// Clip `aabb` against `bounds` per axis
pub fn aabb_clamp_to(aabb: &Aabb, bounds: &Aabb) -> Aabb {
    Aabb {
        min: Point3::new(
            aabb.min.x.max(bounds.min.x),
            aabb.min.y.max(bounds.min.y),
            aabb.min.z.max(bounds.min.z),
        ),
        max: Point3::new(
            aabb.max.x.min(bounds.max.x),
            aabb.max.y.min(bounds.max.y),
            aabb.max.z.min(bounds.max.z),
        ),
    }
}
