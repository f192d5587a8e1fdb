//! Barrier-wrapped GPU operations
//!
//! Every dispatch, clear and copy resolves the transitions for exactly the
//! resources it touches and executes them right before the work is issued.
//! Transitions are never carried over to a later operation.

use super::backend::GpuBackend;
use super::gpu_data::{
    BufferHandle, GpuResource, KernelHandle, ResourceAccess, ResourceLayout, TextureHandle,
    TransitionList,
};
use crate::region::TextureCopyRegion;
use wgpu::ShaderStages;

/// Resources bound to one kernel for one dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct KernelBindings {
    pub kernel: KernelHandle,
    pub textures: Vec<(u32, TextureHandle)>,
    pub uav_textures: Vec<(u32, TextureHandle, ResourceAccess)>,
    pub buffers: Vec<(u32, BufferHandle, ResourceAccess)>,
}

impl KernelBindings {
    pub fn new(kernel: KernelHandle) -> Self {
        Self {
            kernel,
            textures: Vec::new(),
            uav_textures: Vec::new(),
            buffers: Vec::new(),
        }
    }

    pub fn with_texture(mut self, slot: u32, texture: TextureHandle) -> Self {
        self.textures.push((slot, texture));
        self
    }

    pub fn with_uav(mut self, slot: u32, texture: TextureHandle, access: ResourceAccess) -> Self {
        self.uav_textures.push((slot, texture, access));
        self
    }

    pub fn with_buffer(mut self, slot: u32, buffer: BufferHandle, access: ResourceAccess) -> Self {
        self.buffers.push((slot, buffer, access));
        self
    }
}

/// Bind, transition, then dispatch
pub fn dispatch_with_barriers<B: GpuBackend + ?Sized>(
    backend: &mut B,
    bindings: &KernelBindings,
    thread_groups: [u32; 3],
) {
    let kernel = bindings.kernel;
    let mut transitions = TransitionList::new();

    for &(slot, texture) in &bindings.textures {
        backend.bind_texture(kernel, slot, texture);
        backend.resolve_transition(
            &mut transitions,
            GpuResource::Texture(texture),
            ResourceLayout::Texture,
            ResourceAccess::Read,
            ShaderStages::COMPUTE,
        );
    }
    for &(slot, texture, access) in &bindings.uav_textures {
        backend.bind_uav_texture(kernel, slot, texture, access);
        backend.resolve_transition(
            &mut transitions,
            GpuResource::Texture(texture),
            ResourceLayout::Uav,
            access,
            ShaderStages::COMPUTE,
        );
    }
    for &(slot, buffer, access) in &bindings.buffers {
        backend.bind_buffer(kernel, slot, buffer, access);
        let layout = if access == ResourceAccess::Read {
            ResourceLayout::ReadOnlyBuffer
        } else {
            ResourceLayout::Uav
        };
        backend.resolve_transition(
            &mut transitions,
            GpuResource::Buffer(buffer),
            layout,
            access,
            ShaderStages::COMPUTE,
        );
    }

    backend.execute(&transitions);
    log::debug!(
        "[GpuDispatch] kernel {:?} groups {:?} ({} transitions)",
        kernel,
        thread_groups,
        transitions.len()
    );
    backend.dispatch(kernel, thread_groups);
}

/// Clear a float UAV texture to `value`
pub fn clear_float_with_barrier<B: GpuBackend + ?Sized>(
    backend: &mut B,
    texture: TextureHandle,
    value: [f32; 4],
) {
    let mut transitions = TransitionList::new();
    backend.resolve_transition(
        &mut transitions,
        GpuResource::Texture(texture),
        ResourceLayout::Clear,
        ResourceAccess::Write,
        ShaderStages::COMPUTE,
    );
    backend.execute(&transitions);
    backend.clear_uav_float(texture, value);
}

/// Clear an integer UAV texture to `value`
pub fn clear_uint_with_barrier<B: GpuBackend + ?Sized>(
    backend: &mut B,
    texture: TextureHandle,
    value: [u32; 4],
) {
    let mut transitions = TransitionList::new();
    backend.resolve_transition(
        &mut transitions,
        GpuResource::Texture(texture),
        ResourceLayout::Clear,
        ResourceAccess::Write,
        ShaderStages::COMPUTE,
    );
    backend.execute(&transitions);
    backend.clear_uav_uint(texture, value);
}

pub fn copy_with_barriers<B: GpuBackend + ?Sized>(
    backend: &mut B,
    src: TextureHandle,
    dst: TextureHandle,
    region: &TextureCopyRegion,
) {
    let mut transitions = TransitionList::new();
    backend.resolve_transition(
        &mut transitions,
        GpuResource::Texture(src),
        ResourceLayout::CopySrc,
        ResourceAccess::Read,
        ShaderStages::empty(),
    );
    backend.resolve_transition(
        &mut transitions,
        GpuResource::Texture(dst),
        ResourceLayout::CopyDst,
        ResourceAccess::Write,
        ShaderStages::empty(),
    );
    backend.execute(&transitions);
    backend.copy_texture_region(src, dst, region);
}

/// Thread groups covering `extent` when it is a multiple of the group size
pub fn thread_groups_exact(extent: [u32; 3], threads_per_group: [u32; 3]) -> [u32; 3] {
    debug_assert!(
        (0..3).all(|i| extent[i] % threads_per_group[i] == 0),
        "extent {:?} not aligned to {:?}",
        extent,
        threads_per_group
    );
    [
        extent[0] / threads_per_group[0],
        extent[1] / threads_per_group[1],
        extent[2] / threads_per_group[2],
    ]
}

/// Thread groups covering `extent`, last group partially idle
pub fn thread_groups_rounded_up(extent: [u32; 3], threads_per_group: [u32; 3]) -> [u32; 3] {
    [
        extent[0].div_ceil(threads_per_group[0]),
        extent[1].div_ceil(threads_per_group[1]),
        extent[2].div_ceil(threads_per_group[2]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BackendEvent, RecordingBackend};

    #[test]
    fn test_thread_group_rounding() {
        assert_eq!(thread_groups_exact([32, 32, 32], [4, 4, 4]), [8, 8, 8]);
        assert_eq!(thread_groups_rounded_up([64, 64, 3], [8, 8, 1]), [8, 8, 3]);
        assert_eq!(thread_groups_rounded_up([5, 64, 64], [1, 8, 8]), [5, 8, 8]);
        assert_eq!(thread_groups_rounded_up([9, 1, 1], [8, 8, 8]), [2, 1, 1]);
    }

    #[test]
    fn test_transitions_execute_before_dispatch() {
        let mut backend = RecordingBackend::new();
        let kernel = KernelHandle(3);
        let bindings = KernelBindings::new(kernel)
            .with_texture(1, TextureHandle(10))
            .with_uav(0, TextureHandle(11), ResourceAccess::ReadWrite)
            .with_buffer(0, BufferHandle(12), ResourceAccess::Read);

        dispatch_with_barriers(&mut backend, &bindings, [1, 2, 3]);

        let events = backend.events();
        let execute_at = events
            .iter()
            .position(|e| matches!(e, BackendEvent::Execute(list) if list.len() == 3))
            .expect("transitions executed");
        let dispatch_at = events
            .iter()
            .position(|e| matches!(e, BackendEvent::Dispatch { groups: [1, 2, 3], .. }))
            .expect("dispatched");
        assert_eq!(dispatch_at, execute_at + 1);

        let BackendEvent::Execute(list) = &events[execute_at] else {
            unreachable!()
        };
        assert!(list.iter().any(|t| t.resource == GpuResource::Buffer(BufferHandle(12))
            && t.layout == ResourceLayout::ReadOnlyBuffer));
        assert!(list.iter().any(|t| t.resource == GpuResource::Texture(TextureHandle(11))
            && t.layout == ResourceLayout::Uav
            && t.access == ResourceAccess::ReadWrite));
    }

    #[test]
    fn test_copy_transitions_precede_copy() {
        let mut backend = RecordingBackend::new();
        let region = TextureCopyRegion {
            src_origin: [0, 0, 4],
            dst_origin: [0; 3],
            extent: [8, 8, 4],
        };
        copy_with_barriers(&mut backend, TextureHandle(1), TextureHandle(2), &region);

        let events = backend.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], BackendEvent::Execute(list) if list.len() == 2));
        assert!(matches!(events[1], BackendEvent::Copy { region: r, .. } if r == region));
    }
}
