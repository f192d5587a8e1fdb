//! Collaborator contracts
//!
//! Kernel execution, barrier resolution and resource allocation live in the
//! host renderer. Kernels obtained through `ComputeExecutor` are shared and
//! their bindings are overwritten on every use, so two voxelizers driving one
//! backend must be serialized by the caller. Taking `&mut` on every call
//! enforces that at compile time.

use super::gpu_data::{
    BufferDesc, BufferHandle, GpuCapabilities, GpuResource, KernelHandle, ParamValue,
    Residency, ResourceAccess, ResourceLayout, TextureDesc, TextureHandle, TransitionList,
};
use crate::error::VoxelizerResult;
use crate::region::TextureCopyRegion;
use wgpu::ShaderStages;

pub trait ComputeExecutor {
    fn find_kernel(&self, name: &str) -> Option<KernelHandle>;

    /// Clone `base` under `name` with preprocessor-style constant overrides
    fn create_kernel_variant(
        &mut self,
        base: KernelHandle,
        name: &str,
        constants: &[(&'static str, i32)],
    ) -> VoxelizerResult<KernelHandle>;

    fn threads_per_group(&self, kernel: KernelHandle) -> [u32; 3];
    fn set_threads_per_group(&mut self, kernel: KernelHandle, threads: [u32; 3]);

    /// Compile-time property such as the number of bound textures
    fn set_property(&mut self, kernel: KernelHandle, name: &'static str, value: i32);
    fn set_param(&mut self, kernel: KernelHandle, name: &'static str, value: ParamValue);

    fn bind_texture(&mut self, kernel: KernelHandle, slot: u32, texture: TextureHandle);
    fn bind_uav_texture(
        &mut self,
        kernel: KernelHandle,
        slot: u32,
        texture: TextureHandle,
        access: ResourceAccess,
    );
    fn bind_buffer(
        &mut self,
        kernel: KernelHandle,
        slot: u32,
        buffer: BufferHandle,
        access: ResourceAccess,
    );

    fn dispatch(&mut self, kernel: KernelHandle, thread_groups: [u32; 3]);

    fn clear_uav_float(&mut self, texture: TextureHandle, value: [f32; 4]);
    fn clear_uav_uint(&mut self, texture: TextureHandle, value: [u32; 4]);
}

pub trait BarrierSolver {
    /// Append whatever transition `resource` needs to reach `layout`/`access`
    fn resolve_transition(
        &mut self,
        list: &mut TransitionList,
        resource: GpuResource,
        layout: ResourceLayout,
        access: ResourceAccess,
        stages: ShaderStages,
    );

    /// Submit `list` to the render system
    fn execute(&mut self, list: &TransitionList);
}

pub trait ResourceAllocator {
    fn create_texture_3d(&mut self, desc: &TextureDesc) -> VoxelizerResult<TextureHandle>;
    fn destroy_texture(&mut self, texture: TextureHandle);
    fn set_residency(&mut self, texture: TextureHandle, residency: Residency);
    fn texture_resolution(&self, texture: TextureHandle) -> [u32; 3];

    fn create_buffer(&mut self, desc: &BufferDesc) -> VoxelizerResult<BufferHandle>;
    fn destroy_buffer(&mut self, buffer: BufferHandle);
    fn upload_buffer(&mut self, buffer: BufferHandle, offset_bytes: u64, data: &[u8]);

    fn copy_texture_region(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        region: &TextureCopyRegion,
    );
    fn generate_mipmaps(&mut self, texture: TextureHandle);
}

/// Everything a voxelizer needs from the host renderer
pub trait GpuBackend: ComputeExecutor + BarrierSolver + ResourceAllocator {
    fn capabilities(&self) -> GpuCapabilities;
}
