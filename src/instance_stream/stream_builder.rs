//! Instance stream builder
//!
//! CPU staging for the per-octant instance buffer. Every octant owns a fixed
//! block of `num_candidates` records; inside that block each group (bucket or
//! batch) gets one contiguous range, in the order groups are opened.

use crate::error::VoxelizerResult;
use crate::gpu::{ensure_buffer_capacity, release_buffer, AllocatedBuffer, BufferHandle, GpuBackend};
use crate::math::{aabb_intersects, Aabb};
use crate::region::Octant;
use bytemuck::Pod;
use wgpu::BufferUsages;

/// Records of one group inside one octant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstanceRange {
    /// First record, absolute in the instance buffer
    pub offset: u32,
    pub count: u32,
}

#[derive(Debug)]
pub struct InstanceStream<R: Pod> {
    label: &'static str,
    records: Vec<R>,
    num_octants: usize,
    num_candidates: usize,
    /// Records written so far per octant
    written: Vec<u32>,
    /// `ranges[group][octant]`
    ranges: Vec<Vec<InstanceRange>>,
    gpu_buffer: Option<AllocatedBuffer>,
}

impl<R: Pod> InstanceStream<R> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            records: Vec::new(),
            num_octants: 0,
            num_candidates: 0,
            written: Vec::new(),
            ranges: Vec::new(),
            gpu_buffer: None,
        }
    }

    /// Start a new fill able to hold every candidate in every octant
    pub fn reset(&mut self, num_octants: usize, num_candidates: usize) {
        self.num_octants = num_octants;
        self.num_candidates = num_candidates;
        self.records.clear();
        self.records.resize(num_octants * num_candidates, R::zeroed());
        self.written.clear();
        self.written.resize(num_octants, 0);
        self.ranges.clear();
    }

    /// Open a new group, its ranges start after everything written so far
    pub fn begin_group(&mut self) -> usize {
        let group = (0..self.num_octants)
            .map(|octant| InstanceRange {
                offset: (octant * self.num_candidates) as u32 + self.written[octant],
                count: 0,
            })
            .collect();
        self.ranges.push(group);
        self.ranges.len() - 1
    }

    /// Append `record` to the current group of every octant `world_aabb` touches
    ///
    /// Returns how many octants accepted it.
    pub fn push(&mut self, octants: &[Octant], world_aabb: &Aabb, record: R) -> usize {
        debug_assert_eq!(octants.len(), self.num_octants);
        let Some(group) = self.ranges.last_mut() else {
            return 0;
        };

        let mut accepted = 0;
        for (octant_idx, octant) in octants.iter().enumerate() {
            if !aabb_intersects(&octant.region, world_aabb) {
                continue;
            }
            let written = self.written[octant_idx] as usize;
            debug_assert!(written < self.num_candidates, "octant block overflow");
            self.records[octant_idx * self.num_candidates + written] = record;
            self.written[octant_idx] += 1;
            group[octant_idx].count += 1;
            accepted += 1;
        }
        accepted
    }

    pub fn num_groups(&self) -> usize {
        self.ranges.len()
    }

    pub fn range(&self, group: usize, octant: usize) -> InstanceRange {
        self.ranges[group][octant]
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Records of `group` in `octant`
    pub fn group_records(&self, group: usize, octant: usize) -> &[R] {
        let range = self.range(group, octant);
        &self.records[range.offset as usize..(range.offset + range.count) as usize]
    }

    pub fn total_records(&self) -> u32 {
        self.written.iter().sum()
    }

    pub fn gpu_buffer(&self) -> Option<BufferHandle> {
        self.gpu_buffer.map(|b| b.handle)
    }

    /// Upload the staged records, growing GPU storage only when needed
    pub fn upload<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> VoxelizerResult<BufferHandle> {
        let handle = ensure_buffer_capacity(
            backend,
            &mut self.gpu_buffer,
            self.label,
            self.records.len() as u32,
            std::mem::size_of::<R>() as u32,
            BufferUsages::STORAGE | BufferUsages::COPY_DST,
        )?;
        if !self.records.is_empty() {
            backend.upload_buffer(handle, 0, bytemuck::cast_slice(&self.records));
        }
        Ok(handle)
    }

    pub fn destroy<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        release_buffer(backend, &mut self.gpu_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{aabb_from_center_half_extents, create_aabb};
    use crate::region::{subdivide, VoxelRegion};
    use crate::testing::RecordingBackend;
    use cgmath::{Point3, Vector3};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn octants_64() -> Vec<Octant> {
        let region = VoxelRegion {
            aabb: create_aabb(Point3::new(0.0, 0.0, 0.0), Point3::new(64.0, 64.0, 64.0)),
            resolution: [64, 64, 64],
        };
        subdivide(&region, 2, 2, 2)
    }

    fn cube(center: [f32; 3], half: f32) -> Aabb {
        aabb_from_center_half_extents(
            Point3::new(center[0], center[1], center[2]),
            Vector3::new(half, half, half),
        )
    }

    #[test]
    fn test_instance_inside_first_octant() {
        let octants = octants_64();
        let mut stream = InstanceStream::<u32>::new("test");
        stream.reset(octants.len(), 1);
        stream.begin_group();
        assert_eq!(stream.push(&octants, &cube([10.0, 10.0, 10.0], 4.0), 7), 1);

        assert_eq!(stream.range(0, 0).count, 1);
        assert!((1..8).all(|o| stream.range(0, o).count == 0));
        assert_eq!(stream.group_records(0, 0), &[7]);
    }

    #[test]
    fn test_boundary_touch_counts() {
        let octants = octants_64();
        let mut stream = InstanceStream::<u32>::new("test");
        stream.reset(octants.len(), 3);
        stream.begin_group();

        // Max face exactly on the x = 32 split plane
        let touching = create_aabb(Point3::new(28.0, 4.0, 4.0), Point3::new(32.0, 8.0, 8.0));
        assert_eq!(stream.push(&octants, &touching, 1), 2);
        // Straddles the center: all eight octants
        assert_eq!(stream.push(&octants, &cube([32.0, 32.0, 32.0], 1.0), 2), 8);
        // Entirely outside the region
        assert_eq!(stream.push(&octants, &cube([100.0, 10.0, 10.0], 1.0), 3), 0);
    }

    #[test]
    fn test_groups_stay_contiguous_per_octant() {
        let octants = octants_64();
        let mut stream = InstanceStream::<u32>::new("test");
        stream.reset(octants.len(), 4);

        stream.begin_group();
        stream.push(&octants, &cube([8.0, 8.0, 8.0], 1.0), 10);
        stream.push(&octants, &cube([9.0, 8.0, 8.0], 1.0), 11);
        stream.begin_group();
        stream.push(&octants, &cube([40.0, 40.0, 40.0], 1.0), 20);
        stream.push(&octants, &cube([8.0, 9.0, 8.0], 1.0), 21);

        assert_eq!(stream.range(0, 0), InstanceRange { offset: 0, count: 2 });
        assert_eq!(stream.range(1, 0), InstanceRange { offset: 2, count: 1 });
        assert_eq!(stream.range(1, 7), InstanceRange { offset: 28, count: 1 });
        assert_eq!(stream.group_records(1, 0), &[21]);
        assert_eq!(stream.range(1, 3).count, 0);
        assert_eq!(stream.total_records(), 4);
    }

    #[test]
    fn test_culling_matches_brute_force() {
        let octants = octants_64();
        let mut rng = StdRng::seed_from_u64(42);
        let boxes: Vec<Aabb> = (0..64)
            .map(|_| {
                let c = [
                    rng.gen_range(-8.0..72.0f32).round(),
                    rng.gen_range(-8.0..72.0f32).round(),
                    rng.gen_range(-8.0..72.0f32).round(),
                ];
                cube(c, rng.gen_range(1..8) as f32)
            })
            .collect();

        let mut stream = InstanceStream::<u32>::new("test");
        stream.reset(octants.len(), boxes.len());
        stream.begin_group();
        for (idx, aabb) in boxes.iter().enumerate() {
            stream.push(&octants, aabb, idx as u32);
        }

        for (octant_idx, octant) in octants.iter().enumerate() {
            let expected: Vec<u32> = boxes
                .iter()
                .enumerate()
                .filter(|(_, b)| aabb_intersects(&octant.region, b))
                .map(|(i, _)| i as u32)
                .collect();
            assert_eq!(stream.group_records(0, octant_idx), expected.as_slice());
        }
    }

    #[test]
    fn test_upload_reuses_storage_until_growth() {
        let mut backend = RecordingBackend::new();
        let mut stream = InstanceStream::<[f32; 24]>::new("instances");

        stream.reset(8, 4);
        let first = stream.upload(&mut backend).unwrap();
        stream.reset(8, 2);
        assert_eq!(stream.upload(&mut backend).unwrap(), first);
        stream.reset(8, 5);
        assert_ne!(stream.upload(&mut backend).unwrap(), first);
        assert_eq!(backend.buffers_created(), 2);
    }
}
