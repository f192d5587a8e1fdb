/// Per-octant instance culling and packing
pub mod records;
pub mod stream_builder;

pub use records::{
    lod_and_alpha_exponent, pack_texture_idx_alpha_exponent, GeometryInstanceRecord,
    ImageInstanceRecord, INSTANCE_FLAG_ADJUSTED_START, INSTANCE_FLAG_NEEDS_AABB_UPDATE,
};
pub use stream_builder::{InstanceRange, InstanceStream};
