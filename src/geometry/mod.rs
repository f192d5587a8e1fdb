/// Geometry voxelizer inputs
///
/// Shared vertex/index packing, broad-phase partitions and material buckets.
pub mod bucket_classifier;
pub mod buffer_packer;
pub mod geometry_data;

pub use bucket_classifier::{
    classify_instances, BucketKey, GpuMaterial, MaterialTable, QueuedInstance, VariantKey,
    VoxelizerBucket,
};
pub use buffer_packer::{
    adjust_index_offsets16, decode_stored_position, partition_index_ranges, position_decode,
    resolve_index_count_split, GeometryBufferPacker,
};
pub use geometry_data::{
    CompressedVertex, PackedGeometryCounts, PartitionAabb, PartitionRange, PartitionRecord,
    PartitionedSubMesh, PositionDecode, QueuedMesh, SubMeshPartition, UncompressedVertex,
    IDENTITY_POSITION_DECODE,
};
