/// Voxelizer constants
///
/// Kernel names, shader parameter names and heuristic values shared by both
/// voxelizer pipelines.

pub mod kernels {
    /// Geometry voxelizer, variants are suffixed with "/{mask}"
    pub const VOXELIZER: &str = "VCT/Voxelizer";
    pub const IMAGE_VOXELIZER: &str = "VCT/ImageVoxelizer";
    pub const PARTIAL_CLEAR: &str = "VCT/VoxelPartialClear";
    /// Per-partition local AABB, variants are suffixed with "/{mask}"
    pub const AABB_CALCULATOR: &str = "VCT/AabbCalculator";
    pub const AABB_WORLD_SPACE: &str = "VCT/AabbWorldSpace";

    pub const NUM_VOXELIZER_VARIANTS: usize = 16;
    pub const NUM_AABB_VARIANTS: usize = 4;
}

pub mod params {
    pub const INSTANCE_RANGE: &str = "instanceStart_instanceEnd";
    pub const VOXEL_ORIGIN: &str = "voxelOrigin";
    pub const VOXEL_CELL_SIZE: &str = "voxelCellSize";
    pub const VOXEL_PIXEL_ORIGIN: &str = "voxelPixelOrigin";
    pub const START_OFFSET: &str = "startOffset";
    pub const PIXELS_TO_CLEAR: &str = "pixelsToClear";
    pub const PARTITION_START: &str = "partitionStart";
    pub const NUM_PARTITIONS: &str = "numPartitions";
    pub const NUM_INSTANCES: &str = "numInstances";
}

pub mod properties {
    /// Texture units the image voxelizer kernel declares
    pub const NUM_TEX_UNITS: &str = "num_tex_units";
}

pub mod variant_bits {
    pub const INDEX_32BIT: u32 = 1 << 0;
    pub const COMPRESSED_VERTEX: u32 = 1 << 1;
    pub const HAS_DIFFUSE_TEX: u32 = 1 << 2;
    pub const HAS_EMISSIVE_TEX: u32 = 1 << 3;
}

pub mod slots {
    /// Slot 0 holds the instance buffer
    pub const RESERVED_TEX_SLOTS: u32 = 1;
    /// Texture slot start on APIs where read-only buffers occupy texture units
    pub const TEX_BUFFER_SLOT_START: u32 = 4;
    /// Hard cap on texture units considered per dispatch
    pub const MAX_TEXTURE_UNITS: u32 = 255;
    /// Each mesh binds albedo, normal and emissive
    pub const TEXTURES_PER_MESH: u32 = 3;
    /// Discretization table for the per-dispatch texture budget
    pub const DEFAULT_SLOT_TABLE: [u32; 4] = [30, 15, 12, 9];
}

pub mod threads {
    /// Threads per group used by full builds
    pub const FULL_BUILD: [u32; 3] = [4, 4, 4];
    /// Partial clear threads per group, indexed by shell axis (Z, Y, X)
    pub const PARTIAL_CLEAR: [[u32; 3]; 3] = [[8, 8, 1], [8, 1, 8], [1, 8, 8]];
    pub const AABB_CALCULATOR: u32 = 64;
}

pub mod lod {
    /// Bias applied to the raw LOD to reduce blocky artifacts
    pub const LOD_BIAS: f32 = -0.5;
    /// Lowest raw LOD considered when sharpening alpha
    pub const RAW_LOD_FLOOR: f32 = -5.0;
    pub const ALPHA_EXPONENT_SCALE: f32 = 3.0;
    pub const MIN_ALPHA_EXPONENT: f32 = 1.0;
    /// Fixed point scale of the alpha exponent packed above the texture index
    pub const ALPHA_EXPONENT_PACK_SCALE: f32 = 10000.0;
}

pub mod mesh_cache {
    /// Base per-axis resolution of a baked mesh volume
    pub const DEFAULT_RESOLUTION: u32 = 64;
    pub const DEFAULT_MAX_RESOLUTION: u32 = 64;
    /// World units covered by one texel at the base resolution
    pub const DEFAULT_DIMENSION_PER_PIXEL: f32 = 2.0;
}

/// Index count above which a submesh is split into partitions
pub const DEFAULT_INDEX_COUNT_SPLIT: u32 = 6144;

/// Materials packed per constant buffer on the geometry path
pub const MATERIALS_PER_CONST_BUFFER: usize = 256;

/// Normals clear to a zero vector in unorm encoding
pub const NORMAL_CLEAR_VALUE: [f32; 4] = [0.5, 0.5, 0.5, 0.0];
