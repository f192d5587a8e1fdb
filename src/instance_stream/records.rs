//! GPU instance records
//!
//! Both voxelizers read 96-byte records from a read-only buffer. The first
//! 12 floats are always a row-major 3x4 matrix, followed by the world AABB.

use crate::constants::lod;
use bytemuck::{Pod, Zeroable};
use cgmath::Vector3;
use static_assertions::const_assert_eq;

/// One submesh partition of one instance, geometry path
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GeometryInstanceRecord {
    pub world_matrix: [f32; 12],
    pub aabb_center: [f32; 3],
    pub vertex_start: u32,
    pub aabb_half_size: [f32; 3],
    pub index_start: u32,
    pub index_count: u32,
    pub partition_idx: u32,
    pub material_idx: u32,
    pub flags: u32,
}

/// One instance, texture-space path
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ImageInstanceRecord {
    pub world_to_uvw: [f32; 12],
    pub aabb_center: [f32; 3],
    /// Texture index in the low 8 bits, alpha exponent * 10000 above
    pub texture_idx_alpha_exponent: u32,
    pub aabb_half_size: [f32; 3],
    pub lod_level: f32,
    pub _padding: [f32; 4],
}

const_assert_eq!(std::mem::size_of::<GeometryInstanceRecord>(), 96);
const_assert_eq!(std::mem::size_of::<ImageInstanceRecord>(), 96);

pub const INSTANCE_FLAG_NEEDS_AABB_UPDATE: u32 = 1 << 0;
pub const INSTANCE_FLAG_ADJUSTED_START: u32 = 1 << 1;

/// LOD to sample a mesh's baked volume at and the alpha sharpening exponent
///
/// The constants are empirically tuned and must be reproduced exactly.
/// `raw_lod_level` below zero means the scene grid is finer than the mesh
/// volume; the exponent then grows to thin out the coverage alpha.
pub fn lod_and_alpha_exponent(
    voxel_cell_size: Vector3<f32>,
    mesh_resolution: Vector3<f32>,
    world_aabb_size: Vector3<f32>,
) -> (f32, f32) {
    let ratio3 = Vector3::new(
        voxel_cell_size.x * (mesh_resolution.x / world_aabb_size.x),
        voxel_cell_size.y * (mesh_resolution.y / world_aabb_size.y),
        voxel_cell_size.z * (mesh_resolution.z / world_aabb_size.z),
    );
    let ratio = ratio3.x.min(ratio3.y.min(ratio3.z));
    let raw_lod_level = ratio.log2();

    let lod_level = (raw_lod_level + lod::LOD_BIAS).max(0.0);
    let alpha_exponent = (lod_level
        - raw_lod_level.max(lod::RAW_LOD_FLOOR) * lod::ALPHA_EXPONENT_SCALE)
        .max(lod::MIN_ALPHA_EXPONENT);

    (lod_level, alpha_exponent)
}

pub fn pack_texture_idx_alpha_exponent(texture_idx: u32, budget: u32, alpha_exponent: f32) -> u32 {
    (texture_idx % budget) | (((alpha_exponent * lod::ALPHA_EXPONENT_PACK_SCALE) as u32) << 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32) -> Vector3<f32> {
        Vector3::new(x, x, x)
    }

    #[test]
    fn test_matching_density_samples_lod0() {
        // 64 texels over 64 world units, 1 unit cells: ratio 1, raw lod 0
        let (lod_level, alpha) = lod_and_alpha_exponent(v(1.0), v(64.0), v(64.0));
        assert_eq!(lod_level, 0.0);
        assert_eq!(alpha, 1.0);
    }

    #[test]
    fn test_coarse_scene_samples_higher_lod() {
        // Scene cells cover 4 mesh texels: raw lod 2
        let (lod_level, alpha) = lod_and_alpha_exponent(v(4.0), v(64.0), v(64.0));
        assert!((lod_level - 1.5).abs() < 1e-6);
        assert_eq!(alpha, 1.0);
    }

    #[test]
    fn test_fine_scene_sharpens_alpha() {
        // Scene cells are half a mesh texel: raw lod -1, exponent 0 + 3
        let (lod_level, alpha) = lod_and_alpha_exponent(v(0.5), v(64.0), v(64.0));
        assert_eq!(lod_level, 0.0);
        assert!((alpha - 3.0).abs() < 1e-6);

        // Clamped at raw lod -5
        let (_, alpha) = lod_and_alpha_exponent(v(1.0 / 256.0), v(64.0), v(64.0));
        assert!((alpha - 15.0).abs() < 1e-4);
    }

    #[test]
    fn test_anisotropic_ratio_uses_min_axis() {
        let cell = Vector3::new(2.0, 0.5, 2.0);
        let (lod_level, alpha) = lod_and_alpha_exponent(cell, v(32.0), v(32.0));
        assert_eq!(lod_level, 0.0);
        assert!((alpha - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_packing() {
        assert_eq!(pack_texture_idx_alpha_exponent(6, 30, 1.0), 6 | (10000 << 8));
        assert_eq!(pack_texture_idx_alpha_exponent(33, 30, 3.0), 3 | (30000 << 8));
    }
}
