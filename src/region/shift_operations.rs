//! Sliding window shift operations
//!
//! A displacement of `d` voxels on an axis means the window moved `d` cells
//! towards +axis: new voxel `i` holds what old voxel `i + d` held, and the
//! voxels exposed by the move sit on the max face. Negative displacements
//! expose the min face.

use super::region_data::{Octant, ShellAxis, TextureCopyRegion, VoxelRegion};
use super::region_operations::voxel_box_to_world;

/// Voxel range `[start, end)` along one axis
type AxisRange = (u32, u32);

fn exposed_range(resolution: u32, diff: i32) -> AxisRange {
    let thickness = diff.unsigned_abs().min(resolution);
    if diff > 0 {
        (resolution - thickness, resolution)
    } else {
        (0, thickness)
    }
}

fn retained_range(resolution: u32, diff: i32) -> AxisRange {
    let thickness = diff.unsigned_abs().min(resolution);
    if diff > 0 {
        (0, resolution - thickness)
    } else {
        (thickness, resolution)
    }
}

fn shell_octant(region: &VoxelRegion, ranges: [AxisRange; 3], axis: ShellAxis) -> Option<Octant> {
    let offset = [ranges[0].0, ranges[1].0, ranges[2].0];
    let extent = [
        ranges[0].1 - ranges[0].0,
        ranges[1].1 - ranges[1].0,
        ranges[2].1 - ranges[2].0,
    ];
    if extent.contains(&0) {
        return None;
    }

    Some(Octant {
        x: offset[0],
        y: offset[1],
        z: offset[2],
        width: extent[0],
        height: extent[1],
        depth: extent[2],
        region: voxel_box_to_world(region, offset, extent),
        diff_axis: Some(axis),
    })
}

/// Disjoint shell octants covering the voxels newly exposed by a move
///
/// `region` is the window after the move. Shells are produced in Z, Y, X
/// order and each later shell excludes the rows claimed by earlier ones.
pub fn shift(region: &VoxelRegion, diff_x: i32, diff_y: i32, diff_z: i32) -> Vec<Octant> {
    let [width, height, depth] = region.resolution;
    let mut remaining: [AxisRange; 3] = [(0, width), (0, height), (0, depth)];
    let mut shells = Vec::with_capacity(3);

    if diff_z != 0 {
        let ranges = [remaining[0], remaining[1], exposed_range(depth, diff_z)];
        shells.extend(shell_octant(region, ranges, ShellAxis::Z));
        remaining[2] = retained_range(depth, diff_z);
    }
    if diff_y != 0 {
        let ranges = [remaining[0], exposed_range(height, diff_y), remaining[2]];
        shells.extend(shell_octant(region, ranges, ShellAxis::Y));
        remaining[1] = retained_range(height, diff_y);
    }
    if diff_x != 0 {
        let ranges = [exposed_range(width, diff_x), remaining[1], remaining[2]];
        shells.extend(shell_octant(region, ranges, ShellAxis::X));
    }

    shells
}

/// Overlap of the previous and current windows, `None` when they are disjoint
pub fn relative_copy_region(resolution: [u32; 3], diff: [i32; 3]) -> Option<TextureCopyRegion> {
    let mut copy = TextureCopyRegion {
        src_origin: [0; 3],
        dst_origin: [0; 3],
        extent: [0; 3],
    };

    for axis in 0..3 {
        let shift = diff[axis].unsigned_abs();
        if shift >= resolution[axis] {
            return None;
        }
        if diff[axis] > 0 {
            copy.src_origin[axis] = shift;
        } else {
            copy.dst_origin[axis] = shift;
        }
        copy.extent[axis] = resolution[axis] - shift;
    }

    Some(copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::create_aabb;
    use cgmath::Point3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn region(res: [u32; 3]) -> VoxelRegion {
        VoxelRegion {
            aabb: create_aabb(
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(res[0] as f32, res[1] as f32, res[2] as f32),
            ),
            resolution: res,
        }
    }

    fn is_exposed(i: u32, res: u32, diff: i32) -> bool {
        let old = i as i64 + diff as i64;
        old < 0 || old >= res as i64
    }

    #[test]
    fn test_positive_z_shift_covers_max_face() {
        let shells = shift(&region([64, 64, 64]), 0, 0, 4);
        assert_eq!(shells.len(), 1);
        let shell = shells[0];
        assert_eq!((shell.x, shell.y, shell.z), (0, 0, 60));
        assert_eq!((shell.width, shell.height, shell.depth), (64, 64, 4));
        assert_eq!(shell.diff_axis, Some(ShellAxis::Z));
        assert_eq!(shell.region.min.z, 60.0);

        let copy = relative_copy_region([64, 64, 64], [0, 0, 4]).unwrap();
        assert_eq!(copy.src_origin, [0, 0, 4]);
        assert_eq!(copy.dst_origin, [0, 0, 0]);
        assert_eq!(copy.extent, [64, 64, 60]);
    }

    #[test]
    fn test_negative_shift_covers_min_face() {
        let shells = shift(&region([16, 16, 16]), -3, 0, 0);
        assert_eq!(shells.len(), 1);
        assert_eq!((shells[0].x, shells[0].width), (0, 3));
        assert_eq!(shells[0].diff_axis, Some(ShellAxis::X));

        let copy = relative_copy_region([16, 16, 16], [-3, 0, 0]).unwrap();
        assert_eq!(copy.src_origin, [0, 0, 0]);
        assert_eq!(copy.dst_origin, [3, 0, 0]);
        assert_eq!(copy.extent, [13, 16, 16]);
    }

    #[test]
    fn test_no_displacement_no_shells() {
        assert!(shift(&region([8, 8, 8]), 0, 0, 0).is_empty());
    }

    #[test]
    fn test_full_jump_has_no_overlap() {
        assert!(relative_copy_region([8, 8, 8], [0, 9, 0]).is_none());
        let shells = shift(&region([8, 8, 8]), 0, 9, 0);
        assert_eq!(shells.len(), 1);
        assert_eq!(shells[0].height, 8);
    }

    #[test]
    fn test_shells_exactly_cover_exposed_voxels() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let res = [12u32, 10, 8];

        for _ in 0..200 {
            let diff = [
                rng.gen_range(-6..=6),
                rng.gen_range(-6..=6),
                rng.gen_range(-6..=6),
            ];
            let shells = shift(&region(res), diff[0], diff[1], diff[2]);
            assert!(shells.len() <= 3);

            for x in 0..res[0] {
                for y in 0..res[1] {
                    for z in 0..res[2] {
                        let covering = shells
                            .iter()
                            .filter(|o| {
                                (o.x..o.x + o.width).contains(&x)
                                    && (o.y..o.y + o.height).contains(&y)
                                    && (o.z..o.z + o.depth).contains(&z)
                            })
                            .count();
                        let exposed = is_exposed(x, res[0], diff[0])
                            || is_exposed(y, res[1], diff[1])
                            || is_exposed(z, res[2], diff[2]);
                        assert_eq!(covering, exposed as usize, "diff {:?} at {:?}", diff, (x, y, z));
                    }
                }
            }
        }
    }
}
