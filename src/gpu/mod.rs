/// GPU collaborator layer
///
/// Handles, collaborator traits and the barrier-wrapped helpers every
/// voxelizer operation goes through.
pub mod backend;
pub mod buffer_operations;
pub mod dispatch_operations;
pub mod gpu_data;
pub mod kernel_variants;

pub use backend::{BarrierSolver, ComputeExecutor, GpuBackend, ResourceAllocator};
pub use buffer_operations::{
    ensure_buffer_capacity, ensure_buffer_exact, release_buffer, AllocatedBuffer,
};
pub use dispatch_operations::{
    clear_float_with_barrier, clear_uint_with_barrier, copy_with_barriers,
    dispatch_with_barriers, thread_groups_exact, thread_groups_rounded_up, KernelBindings,
};
pub use gpu_data::{
    BufferDesc, BufferHandle, GpuCapabilities, GpuResource, KernelHandle, ParamValue,
    Residency, ResourceAccess, ResourceLayout, ResourceTransition, TextureDesc, TextureHandle,
    TransitionList,
};
pub use kernel_variants::KernelVariantTable;
