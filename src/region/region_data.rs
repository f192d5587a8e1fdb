//! Voxel Region Data - Pure DOP
//!
//! NO METHODS. Just data.
//! All transformations happen in region_operations.rs and shift_operations.rs

use crate::math::Aabb;

/// World-space box being voxelized plus its voxel resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelRegion {
    pub aabb: Aabb,
    /// Width, height, depth in voxels
    pub resolution: [u32; 3],
}

/// Axis a shell octant spans fully on the other two axes
///
/// The discriminant doubles as the partial-clear threads-per-group index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellAxis {
    Z = 0,
    Y = 1,
    X = 2,
}

/// Independently dispatchable sub-box of a `VoxelRegion`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Octant {
    /// Voxel-space offset
    pub x: u32,
    pub y: u32,
    pub z: u32,
    /// Voxel-space extent
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// World-space box covered by the voxels above
    pub region: Aabb,
    /// Set on shell octants produced by a region shift
    pub diff_axis: Option<ShellAxis>,
}

/// Source/destination of the copy that carries the overlap of two windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopyRegion {
    pub src_origin: [u32; 3],
    pub dst_origin: [u32; 3],
    pub extent: [u32; 3],
}
