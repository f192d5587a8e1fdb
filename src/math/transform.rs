/// Instance transforms
///
/// Pure functions turning a node transform into the matrices the voxelizer
/// kernels consume.

use super::aabb::{aabb_size, Aabb};
use cgmath::{ElementWise, EuclideanSpace, Matrix4, Quaternion, Rotation, Vector3};

/// Derived node transform of a scene instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceTransform {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for InstanceTransform {
    fn default() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

/// Translation * rotation * scale
pub fn world_matrix(transform: &InstanceTransform) -> Matrix4<f32> {
    Matrix4::from_translation(transform.position)
        * Matrix4::from(transform.rotation)
        * Matrix4::from_nonuniform_scale(transform.scale.x, transform.scale.y, transform.scale.z)
}

fn safe_reciprocal(value: f32) -> f32 {
    if value.abs() > f32::EPSILON {
        1.0 / value
    } else {
        0.0
    }
}

/// Matrix mapping world space into the [0, 1] UVW cube spanned by `local_aabb`
///
/// A zero-sized axis collapses to 0 instead of dividing by zero.
pub fn world_to_uvw(transform: &InstanceTransform, local_aabb: &Aabb) -> Matrix4<f32> {
    let local_min = local_aabb.min.to_vec().mul_element_wise(transform.scale);
    let origin = transform.position + transform.rotation.rotate_vector(local_min);
    let extent = aabb_size(local_aabb).mul_element_wise(transform.scale);

    Matrix4::from_nonuniform_scale(
        safe_reciprocal(extent.x),
        safe_reciprocal(extent.y),
        safe_reciprocal(extent.z),
    ) * Matrix4::from(transform.rotation.invert())
        * Matrix4::from_translation(-origin)
}

/// First three rows of `matrix`, row-major, as the kernels read them
pub fn matrix_rows_3x4(matrix: &Matrix4<f32>) -> [f32; 12] {
    let mut rows = [0.0; 12];
    for row in 0..3 {
        rows[row * 4] = matrix.x[row];
        rows[row * 4 + 1] = matrix.y[row];
        rows[row * 4 + 2] = matrix.z[row];
        rows[row * 4 + 3] = matrix.w[row];
    }
    rows
}
