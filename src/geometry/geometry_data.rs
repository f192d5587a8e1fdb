//! Geometry Path Data - Pure DOP
//!
//! NO METHODS. Just data.
//! Packing happens in buffer_packer.rs, bucketing in bucket_classifier.rs

use crate::scene::MeshGeometry;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::sync::Arc;

/// Full precision vertex
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UncompressedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Vertex with snorm16 position (relative to the mesh AABB) and normal
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CompressedVertex {
    /// xyz in [-1, 1] over the mesh AABB, w unused
    pub position: [i16; 4],
    /// xyz unit normal, w unused
    pub normal: [i16; 4],
    pub uv: [f32; 2],
}

/// Per-partition entry read by the AABB and voxelizer kernels
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PartitionRecord {
    pub vertex_start: u32,
    pub index_start: u32,
    pub index_count: u32,
    /// Bit 0: first index is padding from 16-bit alignment
    pub flags: u32,
    /// Mesh-space position is `stored * position_scale + position_offset`
    pub position_offset: [f32; 3],
    pub _padding0: f32,
    pub position_scale: [f32; 3],
    pub _padding1: f32,
}

/// Local-space partition bounds written by the AABB kernels
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PartitionAabb {
    pub center: [f32; 3],
    pub _padding0: f32,
    pub half_size: [f32; 3],
    pub _padding1: f32,
}

const_assert_eq!(std::mem::size_of::<UncompressedVertex>(), 32);
const_assert_eq!(std::mem::size_of::<CompressedVertex>(), 24);
const_assert_eq!(std::mem::size_of::<PartitionRecord>(), 48);
const_assert_eq!(std::mem::size_of::<PartitionAabb>(), 32);

pub const PARTITION_FLAG_ADJUSTED_START: u32 = 1;

/// Maps stored vertex positions back to mesh space
///
/// Identity for uncompressed meshes, the mesh AABB centre and half extent
/// for snorm16 positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionDecode {
    pub offset: [f32; 3],
    pub scale: [f32; 3],
}

pub const IDENTITY_POSITION_DECODE: PositionDecode = PositionDecode {
    offset: [0.0; 3],
    scale: [1.0; 3],
};

/// Index range of one submesh broad-phase chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubMeshPartition {
    /// First vertex in the shared vertex buffer of the mesh's format
    pub vertex_start: u32,
    /// First index in the shared index buffer of the submesh's width
    pub index_start: u32,
    pub index_count: u32,
    /// Slot in the shared partition AABB buffer
    pub partition_idx: u32,
    /// `index_start` was moved one earlier to land on an even 16-bit offset
    pub adjusted_start: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartitionedSubMesh {
    pub index_32bit: bool,
    pub partitions: Vec<SubMeshPartition>,
}

/// Per-unique-mesh packing state
#[derive(Debug, Clone)]
pub struct QueuedMesh {
    pub mesh: Arc<MeshGeometry>,
    /// Number of instances referencing the mesh
    pub num_items: u32,
    pub compressed: bool,
    pub position_decode: PositionDecode,
    /// Resolved split threshold, `u32::MAX` disables partitioning
    pub index_count_split: u32,
    /// Filled by the last buffer build
    pub submeshes: Vec<PartitionedSubMesh>,
}

/// Element totals of the shared geometry buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedGeometryCounts {
    pub vertices_compressed: u32,
    pub vertices_uncompressed: u32,
    /// 16-bit indices including per-submesh even padding
    pub indices16: u32,
    pub indices32: u32,
    pub partitions: u32,
}

/// Partition range for one AABB kernel variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionRange {
    pub start: u32,
    pub count: u32,
}
