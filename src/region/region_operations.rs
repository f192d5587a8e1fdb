//! Voxel Region Operations - Pure DOP Functions
//!
//! Region metrics and uniform octant subdivision.

use super::region_data::{Octant, VoxelRegion};
use crate::math::{aabb_lerp, aabb_size, create_aabb, Aabb};
use cgmath::{Point3, Vector3};

/// World-space size of one voxel
pub fn voxel_cell_size(region: &VoxelRegion) -> Vector3<f32> {
    let size = aabb_size(&region.aabb);
    Vector3::new(
        size.x / region.resolution[0] as f32,
        size.y / region.resolution[1] as f32,
        size.z / region.resolution[2] as f32,
    )
}

pub fn voxel_origin(region: &VoxelRegion) -> Point3<f32> {
    region.aabb.min
}

pub fn voxel_count(region: &VoxelRegion) -> u64 {
    region.resolution.iter().map(|&r| r as u64).product()
}

/// World box of the voxel range `[offset, offset + extent)`
pub fn voxel_box_to_world(region: &VoxelRegion, offset: [u32; 3], extent: [u32; 3]) -> Aabb {
    let res = region.resolution;
    let t = |i: usize, v: u32| v as f32 / res[i] as f32;
    let min = aabb_lerp(
        &region.aabb,
        Vector3::new(t(0, offset[0]), t(1, offset[1]), t(2, offset[2])),
    );
    let max = aabb_lerp(
        &region.aabb,
        Vector3::new(
            t(0, offset[0] + extent[0]),
            t(1, offset[1] + extent[1]),
            t(2, offset[2] + extent[2]),
        ),
    );
    create_aabb(min, max)
}

/// Split `region` into `count_x * count_y * count_z` equal octants
///
/// Output is x-outer, y-middle, z-inner. Every resolution axis must be an
/// exact multiple of its count.
pub fn subdivide(region: &VoxelRegion, count_x: u32, count_y: u32, count_z: u32) -> Vec<Octant> {
    let [width, height, depth] = region.resolution;
    assert!(
        count_x > 0 && count_y > 0 && count_z > 0,
        "octant counts must be non-zero"
    );
    assert!(
        width % count_x == 0 && height % count_y == 0 && depth % count_z == 0,
        "resolution {}x{}x{} is not divisible by {}x{}x{} octants",
        width,
        height,
        depth,
        count_x,
        count_y,
        count_z
    );

    let extent = [width / count_x, height / count_y, depth / count_z];
    let mut octants = Vec::with_capacity((count_x * count_y * count_z) as usize);

    for ox in 0..count_x {
        for oy in 0..count_y {
            for oz in 0..count_z {
                let offset = [ox * extent[0], oy * extent[1], oz * extent[2]];
                octants.push(Octant {
                    x: offset[0],
                    y: offset[1],
                    z: offset[2],
                    width: extent[0],
                    height: extent[1],
                    depth: extent[2],
                    region: voxel_box_to_world(region, offset, extent),
                    diff_axis: None,
                });
            }
        }
    }

    octants
}
