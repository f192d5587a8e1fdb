pub mod aabb;
pub mod transform;

pub use aabb::{
    aabb_center, aabb_clamp_to, aabb_from_center_half_extents, aabb_half_extents,
    aabb_intersects, aabb_is_valid, aabb_lerp, aabb_merge, aabb_size, create_aabb, Aabb,
};
pub use transform::{matrix_rows_3x4, world_matrix, world_to_uvw, InstanceTransform};
