//! State shared by both voxelizers
//!
//! Region, octants and registered instances. GPU resources live elsewhere.

use crate::constants::threads;
use crate::gpu::{thread_groups_exact, thread_groups_rounded_up};
use crate::math::{aabb_clamp_to, aabb_is_valid, aabb_size, Aabb};
use crate::region::{subdivide, voxel_cell_size, voxel_origin, Octant, VoxelRegion};
use crate::scene::{merged_world_aabb, SceneRegistry};
use cgmath::{Point3, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Every octant of the subdivision
    Full,
    /// Shell octants of a sliding window move
    Relative,
    /// Whole region of a per-mesh bake, sized to the mesh so often unaligned
    Bake,
}

/// Whether `octant` splits into whole full-build thread groups
pub fn full_build_aligned(octant: &Octant) -> bool {
    let extent = [octant.width, octant.height, octant.depth];
    (0..3).all(|i| extent[i] % threads::FULL_BUILD[i] == 0)
}

/// Threads per group and group count for voxelizing `octant`
///
/// Full builds divide exactly; shells are thin along their axis so they use
/// flat groups and round up. Bakes round up silently, an unaligned full
/// build rounds up with a warning.
pub fn voxelize_dispatch_size(octant: &Octant, mode: BuildMode) -> ([u32; 3], [u32; 3]) {
    let extent = [octant.width, octant.height, octant.depth];
    if let (BuildMode::Relative, Some(axis)) = (mode, octant.diff_axis) {
        let threads_per_group = threads::PARTIAL_CLEAR[axis as usize];
        return (threads_per_group, thread_groups_rounded_up(extent, threads_per_group));
    }

    if full_build_aligned(octant) {
        return (
            threads::FULL_BUILD,
            thread_groups_exact(extent, threads::FULL_BUILD),
        );
    }
    if mode == BuildMode::Full {
        log::warn!(
            "[VoxelizerState] octant {:?} is not a multiple of {:?} threads; edge groups run partially outside it",
            extent,
            threads::FULL_BUILD
        );
    }
    (
        threads::FULL_BUILD,
        thread_groups_rounded_up(extent, threads::FULL_BUILD),
    )
}

#[derive(Debug)]
pub struct VoxelizerState {
    pub resolution: [u32; 3],
    pub region: Aabb,
    /// Upper bound for auto regions
    pub max_region: Aabb,
    pub auto_region: bool,
    pub octants: Vec<Octant>,
    /// Subdivision the current octants were built with
    pub subdivision: [u32; 3],
    pub full_build_done: bool,
    pub registry: SceneRegistry,
}

impl VoxelizerState {
    pub fn new(resolution: [u32; 3]) -> Self {
        Self {
            resolution,
            region: Aabb::NULL,
            max_region: Aabb::INFINITE,
            auto_region: true,
            octants: Vec::new(),
            subdivision: [1, 1, 1],
            full_build_done: false,
            registry: SceneRegistry::default(),
        }
    }

    pub fn voxel_region(&self) -> VoxelRegion {
        VoxelRegion {
            aabb: self.region,
            resolution: self.resolution,
        }
    }

    /// Replace the region, dropping octants derived from the old one
    pub fn set_region(&mut self, auto_region: bool, region: Aabb, max_region: Aabb) {
        self.auto_region = auto_region;
        self.region = region;
        self.max_region = max_region;
        self.octants.clear();
    }

    /// Fit the region to the registered instances when in auto mode
    ///
    /// An empty scene or a union entirely outside the max region keeps the
    /// previous region.
    pub fn auto_calculate_region(&mut self) {
        if !self.auto_region {
            return;
        }

        let merged = merged_world_aabb(&self.registry);
        let clamped = aabb_clamp_to(&merged, &self.max_region);
        if !aabb_is_valid(&merged) || !aabb_is_valid(&clamped) {
            log::warn!(
                "[VoxelizerState] Auto region is empty ({} instances); keeping {:?}",
                self.registry.instances.len(),
                self.region
            );
            return;
        }

        if clamped != self.region {
            self.region = clamped;
            self.octants.clear();
        }
    }

    /// Change the resolution, returns true when it differs
    ///
    /// The caller destroys its volumes on change; the next build is a full one.
    pub fn set_resolution(&mut self, resolution: [u32; 3]) -> bool {
        if resolution == self.resolution {
            return false;
        }
        self.resolution = resolution;
        self.octants.clear();
        self.full_build_done = false;
        true
    }

    pub fn divide_octants(&mut self, count_x: u32, count_y: u32, count_z: u32) {
        self.octants = subdivide(&self.voxel_region(), count_x, count_y, count_z);
        self.subdivision = [count_x, count_y, count_z];
        log::debug!(
            "[VoxelizerState] {} octants over {:?}",
            self.octants.len(),
            self.region
        );
    }

    pub fn ensure_octants(&mut self, subdivision: [u32; 3]) {
        if self.octants.is_empty() {
            self.divide_octants(subdivision[0], subdivision[1], subdivision[2]);
        }
    }

    pub fn voxel_origin(&self) -> Point3<f32> {
        voxel_origin(&self.voxel_region())
    }

    pub fn voxel_cell_size(&self) -> Vector3<f32> {
        voxel_cell_size(&self.voxel_region())
    }

    pub fn voxel_size(&self) -> Vector3<f32> {
        aabb_size(&self.region)
    }

    pub fn voxel_resolution(&self) -> [u32; 3] {
        self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::create_aabb;
    use crate::scene::add_instance;
    use crate::testing::{instance_of, mesh_with_indices16};

    fn aabb(min: [f32; 3], max: [f32; 3]) -> Aabb {
        create_aabb(Point3::from(min), Point3::from(max))
    }

    #[test]
    fn test_dispatch_size_per_mode() {
        let region = VoxelRegion {
            aabb: aabb([0.0; 3], [64.0; 3]),
            resolution: [64, 64, 64],
        };
        let octants = subdivide(&region, 2, 2, 2);
        assert_eq!(
            voxelize_dispatch_size(&octants[0], BuildMode::Full),
            ([4, 4, 4], [8, 8, 8])
        );

        let tiny = VoxelRegion {
            aabb: aabb([0.0; 3], [2.0; 3]),
            resolution: [2, 2, 2],
        };
        let tiny_octant = subdivide(&tiny, 1, 1, 1)[0];
        assert!(full_build_aligned(&octants[0]));
        assert!(!full_build_aligned(&tiny_octant));
        assert_eq!(
            voxelize_dispatch_size(&tiny_octant, BuildMode::Bake),
            ([4, 4, 4], [1, 1, 1])
        );
        // Unaligned full builds still cover the octant
        assert_eq!(
            voxelize_dispatch_size(&tiny_octant, BuildMode::Full),
            ([4, 4, 4], [1, 1, 1])
        );

        let shells = crate::region::shift(&region, -3, 0, 0);
        assert_eq!(
            voxelize_dispatch_size(&shells[0], BuildMode::Relative),
            ([1, 8, 8], [3, 8, 8])
        );
    }

    #[test]
    fn test_auto_region_clamped_to_max() {
        let mesh = mesh_with_indices16(1, 6);
        let mut state = VoxelizerState::new([32, 32, 32]);
        state.set_region(true, Aabb::NULL, aabb([-10.0; 3], [10.0; 3]));
        add_instance(&mut state.registry, instance_of(1, &mesh, [0.0; 3], 2.0)).unwrap();
        add_instance(&mut state.registry, instance_of(2, &mesh, [9.0, 0.0, 0.0], 4.0)).unwrap();

        state.auto_calculate_region();
        assert_eq!(state.region, aabb([-2.0, -4.0, -4.0], [10.0, 4.0, 4.0]));
    }

    #[test]
    fn test_empty_auto_region_keeps_previous() {
        let previous = aabb([0.0; 3], [8.0; 3]);
        let mut state = VoxelizerState::new([8, 8, 8]);
        state.set_region(true, previous, Aabb::INFINITE);
        state.auto_calculate_region();
        assert_eq!(state.region, previous);

        // Union entirely outside the max region
        let mesh = mesh_with_indices16(1, 6);
        add_instance(&mut state.registry, instance_of(1, &mesh, [100.0; 3], 1.0)).unwrap();
        state.max_region = aabb([0.0; 3], [8.0; 3]);
        state.auto_calculate_region();
        assert_eq!(state.region, previous);
    }

    #[test]
    fn test_explicit_region_ignores_instances() {
        let mesh = mesh_with_indices16(1, 6);
        let explicit = aabb([0.0; 3], [64.0; 3]);
        let mut state = VoxelizerState::new([64, 64, 64]);
        state.set_region(false, explicit, Aabb::INFINITE);
        add_instance(&mut state.registry, instance_of(1, &mesh, [500.0; 3], 1.0)).unwrap();
        state.auto_calculate_region();
        assert_eq!(state.region, explicit);
    }

    #[test]
    fn test_region_change_drops_octants() {
        let mut state = VoxelizerState::new([64, 64, 64]);
        state.set_region(false, aabb([0.0; 3], [64.0; 3]), Aabb::INFINITE);
        state.divide_octants(2, 2, 2);
        assert_eq!(state.octants.len(), 8);

        state.set_region(false, aabb([1.0; 3], [65.0; 3]), Aabb::INFINITE);
        assert!(state.octants.is_empty());
    }

    #[test]
    fn test_resolution_change_forces_full_build() {
        let mut state = VoxelizerState::new([64, 64, 64]);
        state.set_region(false, aabb([0.0; 3], [32.0; 3]), Aabb::INFINITE);
        state.divide_octants(1, 1, 1);
        state.full_build_done = true;

        assert!(!state.set_resolution([64, 64, 64]));
        assert!(state.full_build_done);
        assert!(state.set_resolution([32, 32, 32]));
        assert!(!state.full_build_done);
        assert!(state.octants.is_empty());
        assert_eq!(state.voxel_cell_size(), Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(state.voxel_size(), Vector3::new(32.0, 32.0, 32.0));
    }
}
