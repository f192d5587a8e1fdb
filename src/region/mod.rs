/// Voxel region partitioning
///
/// Uniform octant subdivision and sliding window shell computation.
pub mod region_data;
pub mod region_operations;
pub mod shift_operations;

pub use region_data::{Octant, ShellAxis, TextureCopyRegion, VoxelRegion};
pub use region_operations::{
    subdivide, voxel_box_to_world, voxel_cell_size, voxel_count, voxel_origin,
};
pub use shift_operations::{relative_copy_region, shift};
