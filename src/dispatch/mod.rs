/// Build orchestration
///
/// Voxel volume lifetime, full and incremental builds for both pipelines
/// and the camera-following window that drives them.
pub mod geometry_voxelizer;
pub mod image_voxelizer;
pub mod sliding_window;
pub mod texture_ring;
pub mod voxel_volumes;
pub mod voxelizer_state;

pub use geometry_voxelizer::GeometryVoxelizer;
pub use image_voxelizer::ImageVoxelizer;
pub use sliding_window::{
    auto_calculate_step_sizes, quantize_position, quantized_to_world, SlidingWindow,
    SlidingWindowSettings, WindowUpdate,
};
pub use texture_ring::{ColourVolumes, TextureRing};
pub use voxel_volumes::VoxelVolumes;
pub use voxelizer_state::{voxelize_dispatch_size, BuildMode, VoxelizerState};
