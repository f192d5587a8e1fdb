//! Buffer lifetime helpers
//!
//! Buffers live in `Option<AllocatedBuffer>` slots owned by the caller and are
//! only recreated when the requested size forces it.

use super::backend::ResourceAllocator;
use super::gpu_data::{BufferDesc, BufferHandle};
use crate::error::VoxelizerResult;
use wgpu::BufferUsages;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedBuffer {
    pub handle: BufferHandle,
    pub element_count: u32,
    pub stride: u32,
}

pub fn release_buffer<A: ResourceAllocator + ?Sized>(
    allocator: &mut A,
    slot: &mut Option<AllocatedBuffer>,
) {
    if let Some(buffer) = slot.take() {
        allocator.destroy_buffer(buffer.handle);
    }
}

fn allocate<A: ResourceAllocator + ?Sized>(
    allocator: &mut A,
    slot: &mut Option<AllocatedBuffer>,
    label: &str,
    element_count: u32,
    stride: u32,
    usage: BufferUsages,
) -> VoxelizerResult<BufferHandle> {
    release_buffer(allocator, slot);
    let handle = allocator.create_buffer(&BufferDesc {
        label: label.to_string(),
        element_count,
        stride,
        usage,
    })?;
    *slot = Some(AllocatedBuffer {
        handle,
        element_count,
        stride,
    });
    Ok(handle)
}

/// Keep the buffer only if it holds exactly `element_count` elements
///
/// A count of zero frees the slot and returns `None`.
pub fn ensure_buffer_exact<A: ResourceAllocator + ?Sized>(
    allocator: &mut A,
    slot: &mut Option<AllocatedBuffer>,
    label: &str,
    element_count: u32,
    stride: u32,
    usage: BufferUsages,
) -> VoxelizerResult<Option<BufferHandle>> {
    if element_count == 0 {
        release_buffer(allocator, slot);
        return Ok(None);
    }
    match slot {
        Some(buffer) if buffer.element_count == element_count && buffer.stride == stride => {
            Ok(Some(buffer.handle))
        }
        _ => allocate(allocator, slot, label, element_count, stride, usage).map(Some),
    }
}

/// Keep the buffer while it can hold `element_count` elements
pub fn ensure_buffer_capacity<A: ResourceAllocator + ?Sized>(
    allocator: &mut A,
    slot: &mut Option<AllocatedBuffer>,
    label: &str,
    element_count: u32,
    stride: u32,
    usage: BufferUsages,
) -> VoxelizerResult<BufferHandle> {
    let element_count = element_count.max(1);
    match slot {
        Some(buffer) if buffer.element_count >= element_count && buffer.stride == stride => {
            Ok(buffer.handle)
        }
        _ => {
            log::debug!("[BufferOperations] growing {} to {} elements", label, element_count);
            allocate(allocator, slot, label, element_count, stride, usage)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;

    #[test]
    fn test_exact_reuses_matching_buffer() {
        let mut backend = RecordingBackend::new();
        let mut slot = None;
        let usage = BufferUsages::STORAGE;

        let first = ensure_buffer_exact(&mut backend, &mut slot, "idx", 10, 4, usage).unwrap();
        let second = ensure_buffer_exact(&mut backend, &mut slot, "idx", 10, 4, usage).unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.buffers_created(), 1);

        let shrunk = ensure_buffer_exact(&mut backend, &mut slot, "idx", 6, 4, usage).unwrap();
        assert_ne!(first, shrunk);
        assert_eq!(backend.live_buffers(), 1);

        assert_eq!(ensure_buffer_exact(&mut backend, &mut slot, "idx", 0, 4, usage).unwrap(), None);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_capacity_only_grows() {
        let mut backend = RecordingBackend::new();
        let mut slot = None;
        let usage = BufferUsages::STORAGE;

        let a = ensure_buffer_capacity(&mut backend, &mut slot, "inst", 64, 96, usage).unwrap();
        let b = ensure_buffer_capacity(&mut backend, &mut slot, "inst", 16, 96, usage).unwrap();
        assert_eq!(a, b);
        let c = ensure_buffer_capacity(&mut backend, &mut slot, "inst", 65, 96, usage).unwrap();
        assert_ne!(a, c);
        assert_eq!(backend.buffers_created(), 2);
        assert_eq!(backend.live_buffers(), 1);
    }
}
