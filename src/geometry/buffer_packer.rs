//! Geometry buffer packer
//!
//! Merges every registered mesh into four shared buffers (compressed and
//! uncompressed vertices, 16 and 32-bit indices), splits large submeshes into
//! broad-phase partitions and drives the per-partition AABB kernels.

use super::geometry_data::{
    CompressedVertex, PackedGeometryCounts, PartitionAabb, PartitionRange, PartitionRecord,
    PartitionedSubMesh, PositionDecode, QueuedMesh, SubMeshPartition, UncompressedVertex,
    IDENTITY_POSITION_DECODE, PARTITION_FLAG_ADJUSTED_START,
};
use crate::constants::{kernels, params, threads, variant_bits};
use crate::error::VoxelizerResult;
use crate::gpu::{
    dispatch_with_barriers, ensure_buffer_exact, release_buffer, AllocatedBuffer, BufferHandle,
    ComputeExecutor, GpuBackend, KernelBindings, KernelVariantTable, ParamValue, ResourceAccess,
};
use crate::math::{aabb_center, aabb_half_extents, Aabb};
use crate::scene::{IndexData, MeshGeometry, MeshId, SourceVertex};
use std::collections::BTreeMap;
use std::sync::Arc;
use wgpu::BufferUsages;

const AABB_VARIANT_PROPERTIES: &[&str] = &["index_32bit", "compressed_vertex_format"];

/// Effective split threshold for a requested value
///
/// `0` selects `default_split`, `u32::MAX` disables partitioning and anything
/// else is rounded down to whole triangles.
pub fn resolve_index_count_split(requested: u32, default_split: u32) -> u32 {
    let split = if requested == 0 { default_split } else { requested };
    if split == u32::MAX {
        split
    } else {
        (split - split % 3).max(3)
    }
}

/// `(start, count)` index ranges of a submesh after splitting
pub fn partition_index_ranges(index_count: u32, split: u32) -> Vec<(u32, u32)> {
    if index_count == 0 {
        return Vec::new();
    }
    if index_count <= split {
        return vec![(0, index_count)];
    }
    (0..index_count)
        .step_by(split as usize)
        .map(|start| (start, split.min(index_count - start)))
        .collect()
}

/// Move an odd 16-bit start one index earlier so it lands on a 32-bit word
///
/// Returns true when the range was adjusted; the kernel then skips the extra
/// leading index.
pub fn adjust_index_offsets16(index_start: &mut u32, index_count: &mut u32) -> bool {
    if *index_start % 2 == 1 {
        *index_start -= 1;
        *index_count += 1;
        true
    } else {
        false
    }
}

fn to_snorm16(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

fn from_snorm16(value: i16) -> f32 {
    (value as f32 / 32767.0).max(-1.0)
}

/// Decode parameters for the positions a mesh is packed with
pub fn position_decode(local_aabb: &Aabb, compressed: bool) -> PositionDecode {
    if !compressed {
        return IDENTITY_POSITION_DECODE;
    }
    PositionDecode {
        offset: aabb_center(local_aabb).into(),
        scale: aabb_half_extents(local_aabb).into(),
    }
}

/// Mesh-space position of a compressed vertex, as the kernels reconstruct it
pub fn decode_stored_position(vertex: &CompressedVertex, decode: &PositionDecode) -> [f32; 3] {
    std::array::from_fn(|axis| {
        from_snorm16(vertex.position[axis]) * decode.scale[axis] + decode.offset[axis]
    })
}

fn compress_vertex(vertex: &SourceVertex, decode: &PositionDecode) -> CompressedVertex {
    let rel = |axis: usize| {
        let half = decode.scale[axis];
        if half > 0.0 {
            (vertex.position[axis] - decode.offset[axis]) / half
        } else {
            0.0
        }
    };

    CompressedVertex {
        position: [to_snorm16(rel(0)), to_snorm16(rel(1)), to_snorm16(rel(2)), 0],
        normal: [
            to_snorm16(vertex.normal[0]),
            to_snorm16(vertex.normal[1]),
            to_snorm16(vertex.normal[2]),
            0,
        ],
        uv: vertex.uv,
    }
}

fn aabb_variant(index_32bit: bool, compressed: bool) -> u32 {
    let mut variant = 0;
    if index_32bit {
        variant |= variant_bits::INDEX_32BIT;
    }
    if compressed {
        variant |= variant_bits::COMPRESSED_VERTEX;
    }
    variant
}

/// CPU staging for one buffer build
#[derive(Debug, Default)]
struct PackedGeometry {
    counts: PackedGeometryCounts,
    ranges: [PartitionRange; kernels::NUM_AABB_VARIANTS],
    uncompressed: Vec<UncompressedVertex>,
    compressed: Vec<CompressedVertex>,
    indices16: Vec<u16>,
    indices32: Vec<u32>,
    partitions: Vec<PartitionRecord>,
}

fn pack_meshes(meshes: &mut BTreeMap<MeshId, QueuedMesh>) -> PackedGeometry {
    let mut packed = PackedGeometry::default();

    for queued in meshes.values_mut() {
        let mesh = Arc::clone(&queued.mesh);
        queued.submeshes.clear();
        queued.position_decode = position_decode(&mesh.local_aabb, queued.compressed);
        let decode = queued.position_decode;

        for submesh in &mesh.submeshes {
            let vertex_start = if queued.compressed {
                let start = packed.compressed.len() as u32;
                packed.compressed.extend(
                    submesh
                        .vertices
                        .iter()
                        .map(|v| compress_vertex(v, &decode)),
                );
                start
            } else {
                let start = packed.uncompressed.len() as u32;
                packed.uncompressed.extend(submesh.vertices.iter().map(|v| UncompressedVertex {
                    position: v.position,
                    normal: v.normal,
                    uv: v.uv,
                }));
                start
            };

            let (index_32bit, base, index_count) = match &submesh.indices {
                Some(IndexData::U16(indices)) => {
                    let base = packed.indices16.len() as u32;
                    packed.indices16.extend_from_slice(indices);
                    if packed.indices16.len() % 2 == 1 {
                        packed.indices16.push(0);
                    }
                    (false, base, indices.len() as u32)
                }
                Some(IndexData::U32(indices)) => {
                    let base = packed.indices32.len() as u32;
                    packed.indices32.extend_from_slice(indices);
                    (true, base, indices.len() as u32)
                }
                None => continue,
            };

            let partitions = partition_index_ranges(index_count, queued.index_count_split)
                .into_iter()
                .map(|(start, count)| {
                    let mut index_start = base + start;
                    let mut index_count = count;
                    let adjusted_start =
                        !index_32bit && adjust_index_offsets16(&mut index_start, &mut index_count);
                    SubMeshPartition {
                        vertex_start,
                        index_start,
                        index_count,
                        partition_idx: 0,
                        adjusted_start,
                    }
                })
                .collect();

            queued.submeshes.push(PartitionedSubMesh {
                index_32bit,
                partitions,
            });
        }
    }

    // Partition slots are grouped per AABB variant so each variant kernel
    // covers one contiguous range.
    for variant in 0..kernels::NUM_AABB_VARIANTS as u32 {
        let start = packed.partitions.len() as u32;
        for queued in meshes.values_mut() {
            let compressed = queued.compressed;
            let decode = queued.position_decode;
            for submesh in queued.submeshes.iter_mut() {
                if aabb_variant(submesh.index_32bit, compressed) != variant {
                    continue;
                }
                for partition in submesh.partitions.iter_mut() {
                    partition.partition_idx = packed.partitions.len() as u32;
                    packed.partitions.push(PartitionRecord {
                        vertex_start: partition.vertex_start,
                        index_start: partition.index_start,
                        index_count: partition.index_count,
                        flags: if partition.adjusted_start {
                            PARTITION_FLAG_ADJUSTED_START
                        } else {
                            0
                        },
                        position_offset: decode.offset,
                        position_scale: decode.scale,
                        ..Default::default()
                    });
                }
            }
        }
        packed.ranges[variant as usize] = PartitionRange {
            start,
            count: packed.partitions.len() as u32 - start,
        };
    }

    packed.counts = PackedGeometryCounts {
        vertices_compressed: packed.compressed.len() as u32,
        vertices_uncompressed: packed.uncompressed.len() as u32,
        indices16: packed.indices16.len() as u32,
        indices32: packed.indices32.len() as u32,
        partitions: packed.partitions.len() as u32,
    };
    packed
}

pub struct GeometryBufferPacker {
    meshes: BTreeMap<MeshId, QueuedMesh>,
    default_index_count_split: u32,
    dirty: bool,
    counts: PackedGeometryCounts,
    variant_ranges: [PartitionRange; kernels::NUM_AABB_VARIANTS],
    aabb_kernels: KernelVariantTable<{ kernels::NUM_AABB_VARIANTS }>,

    vertex_compressed: Option<AllocatedBuffer>,
    vertex_uncompressed: Option<AllocatedBuffer>,
    /// 16-bit indices packed two per 32-bit word
    index16: Option<AllocatedBuffer>,
    index32: Option<AllocatedBuffer>,
    partition_table: Option<AllocatedBuffer>,
    partition_aabbs: Option<AllocatedBuffer>,
}

impl GeometryBufferPacker {
    pub fn new<E: ComputeExecutor + ?Sized>(
        executor: &E,
        default_index_count_split: u32,
    ) -> VoxelizerResult<Self> {
        Ok(Self {
            meshes: BTreeMap::new(),
            default_index_count_split,
            dirty: false,
            counts: PackedGeometryCounts::default(),
            variant_ranges: Default::default(),
            aabb_kernels: KernelVariantTable::new(
                executor,
                kernels::AABB_CALCULATOR,
                AABB_VARIANT_PROPERTIES,
            )?,
            vertex_compressed: None,
            vertex_uncompressed: None,
            index16: None,
            index32: None,
            partition_table: None,
            partition_aabbs: None,
        })
    }

    /// Add one reference to `mesh`
    ///
    /// Meshes with a submesh lacking an index buffer are rejected and `false`
    /// is returned. The latest compression choice applies to every reference.
    pub fn register_mesh(
        &mut self,
        mesh: &Arc<MeshGeometry>,
        compressed: bool,
        index_count_split: u32,
    ) -> bool {
        if mesh.submeshes.iter().any(|submesh| submesh.indices.is_none()) {
            log::warn!(
                "[GeometryBufferPacker] mesh '{}' has a submesh without index buffer; it will not be voxelized",
                mesh.name
            );
            return false;
        }

        let split = resolve_index_count_split(index_count_split, self.default_index_count_split);
        let queued = self.meshes.entry(mesh.id).or_insert_with(|| {
            self.dirty = true;
            QueuedMesh {
                mesh: Arc::clone(mesh),
                num_items: 0,
                compressed,
                position_decode: position_decode(&mesh.local_aabb, compressed),
                index_count_split: split,
                submeshes: Vec::new(),
            }
        });

        if queued.compressed != compressed || queued.index_count_split != split {
            queued.compressed = compressed;
            queued.index_count_split = split;
            self.dirty = true;
        }
        queued.num_items += 1;
        true
    }

    /// Drop one reference, removing the mesh at zero
    pub fn unregister_mesh(&mut self, mesh_id: MeshId) {
        let queued = self.meshes.get_mut(&mesh_id);
        assert!(
            matches!(&queued, Some(q) if q.num_items > 0),
            "mesh {:?} reference count would go negative",
            mesh_id
        );
        if let Some(queued) = queued {
            queued.num_items -= 1;
            if queued.num_items == 0 {
                self.meshes.remove(&mesh_id);
                self.dirty = true;
            }
        }
    }

    pub fn queued_mesh(&self, mesh_id: MeshId) -> Option<&QueuedMesh> {
        self.meshes.get(&mesh_id)
    }

    pub fn num_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn counts(&self) -> PackedGeometryCounts {
        self.counts
    }

    pub fn variant_range(&self, variant: u32) -> PartitionRange {
        self.variant_ranges[variant as usize]
    }

    pub fn vertex_buffer(&self, compressed: bool) -> Option<BufferHandle> {
        let slot = if compressed {
            &self.vertex_compressed
        } else {
            &self.vertex_uncompressed
        };
        slot.map(|b| b.handle)
    }

    pub fn index_buffer(&self, index_32bit: bool) -> Option<BufferHandle> {
        let slot = if index_32bit { &self.index32 } else { &self.index16 };
        slot.map(|b| b.handle)
    }

    /// Partition records, including the position decode of each mesh
    pub fn partition_table_buffer(&self) -> Option<BufferHandle> {
        self.partition_table.map(|b| b.handle)
    }

    pub fn partition_aabb_buffer(&self) -> Option<BufferHandle> {
        self.partition_aabbs.map(|b| b.handle)
    }

    /// Rebuild the shared buffers if registrations changed since the last build
    ///
    /// Returns whether a rebuild happened. Storage is only recreated when an
    /// element count differs from the current allocation.
    pub fn build_buffers<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> VoxelizerResult<bool> {
        if !self.dirty {
            return Ok(false);
        }

        let packed = pack_meshes(&mut self.meshes);
        let storage = BufferUsages::STORAGE | BufferUsages::COPY_DST;

        if let Some(handle) = ensure_buffer_exact(
            backend,
            &mut self.vertex_compressed,
            "VctVoxelizer/VertexBufferCompressed",
            packed.counts.vertices_compressed,
            std::mem::size_of::<CompressedVertex>() as u32,
            storage,
        )? {
            backend.upload_buffer(handle, 0, bytemuck::cast_slice(&packed.compressed));
        }
        if let Some(handle) = ensure_buffer_exact(
            backend,
            &mut self.vertex_uncompressed,
            "VctVoxelizer/VertexBufferUncompressed",
            packed.counts.vertices_uncompressed,
            std::mem::size_of::<UncompressedVertex>() as u32,
            storage,
        )? {
            backend.upload_buffer(handle, 0, bytemuck::cast_slice(&packed.uncompressed));
        }
        if let Some(handle) = ensure_buffer_exact(
            backend,
            &mut self.index16,
            "VctVoxelizer/IndexBuffer16",
            packed.counts.indices16 / 2,
            4,
            storage,
        )? {
            backend.upload_buffer(handle, 0, bytemuck::cast_slice(&packed.indices16));
        }
        if let Some(handle) = ensure_buffer_exact(
            backend,
            &mut self.index32,
            "VctVoxelizer/IndexBuffer32",
            packed.counts.indices32,
            4,
            storage,
        )? {
            backend.upload_buffer(handle, 0, bytemuck::cast_slice(&packed.indices32));
        }
        if let Some(handle) = ensure_buffer_exact(
            backend,
            &mut self.partition_table,
            "VctVoxelizer/Partitions",
            packed.counts.partitions,
            std::mem::size_of::<PartitionRecord>() as u32,
            storage,
        )? {
            backend.upload_buffer(handle, 0, bytemuck::cast_slice(&packed.partitions));
        }
        ensure_buffer_exact(
            backend,
            &mut self.partition_aabbs,
            "VctVoxelizer/PartitionAabbs",
            packed.counts.partitions,
            std::mem::size_of::<PartitionAabb>() as u32,
            BufferUsages::STORAGE,
        )?;

        log::info!(
            "[GeometryBufferPacker] packed {} meshes: {} + {} vertices, {} + {} indices, {} partitions",
            self.meshes.len(),
            packed.counts.vertices_uncompressed,
            packed.counts.vertices_compressed,
            packed.counts.indices16,
            packed.counts.indices32,
            packed.counts.partitions
        );

        self.counts = packed.counts;
        self.variant_ranges = packed.ranges;
        self.dirty = false;
        Ok(true)
    }

    /// Dispatch one AABB kernel per non-empty variant over its partitions
    pub fn compute_mesh_aabbs<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> VoxelizerResult<()> {
        let (Some(partition_table), Some(partition_aabbs)) =
            (self.partition_table, self.partition_aabbs)
        else {
            return Ok(());
        };

        for variant in 0..kernels::NUM_AABB_VARIANTS as u32 {
            let range = self.variant_ranges[variant as usize];
            if range.count == 0 {
                continue;
            }
            let index_32bit = variant & variant_bits::INDEX_32BIT != 0;
            let compressed = variant & variant_bits::COMPRESSED_VERTEX != 0;
            let (Some(vertex_buffer), Some(index_buffer)) =
                (self.vertex_buffer(compressed), self.index_buffer(index_32bit))
            else {
                continue;
            };

            let kernel = self.aabb_kernels.get_or_create(backend, variant)?;
            backend.set_param(kernel, params::PARTITION_START, ParamValue::UInt(range.start));
            backend.set_param(kernel, params::NUM_PARTITIONS, ParamValue::UInt(range.count));

            let bindings = KernelBindings::new(kernel)
                .with_buffer(0, vertex_buffer, ResourceAccess::Read)
                .with_buffer(1, index_buffer, ResourceAccess::Read)
                .with_buffer(2, partition_table.handle, ResourceAccess::Read)
                .with_buffer(3, partition_aabbs.handle, ResourceAccess::Write);
            dispatch_with_barriers(
                backend,
                &bindings,
                [range.count.div_ceil(threads::AABB_CALCULATOR), 1, 1],
            );
        }
        Ok(())
    }

    pub fn destroy<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        release_buffer(backend, &mut self.vertex_compressed);
        release_buffer(backend, &mut self.vertex_uncompressed);
        release_buffer(backend, &mut self.index16);
        release_buffer(backend, &mut self.index32);
        release_buffer(backend, &mut self.partition_table);
        release_buffer(backend, &mut self.partition_aabbs);
        self.dirty = !self.meshes.is_empty();
    }
}
