/// Texture-space voxelizer inputs
///
/// Baked per-mesh volumes and their batching under the texture budget.
pub mod batch_builder;
pub mod mesh_cache;

pub use batch_builder::{Batch, BatchBuilder, BatchSlot, TextureSlotBudget};
pub use mesh_cache::{
    calculate_mesh_resolution, has_emissive, MeshCacheSettings, MeshTextureCache, VoxelizedMesh,
};
