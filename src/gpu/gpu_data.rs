//! GPU collaborator data
//!
//! Opaque handles and descriptors exchanged with the host renderer. The
//! voxelizers never own GPU memory directly; they hold handles issued by a
//! `ResourceAllocator`.

use wgpu::{BufferUsages, ShaderStages, TextureFormat, TextureUsages};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelHandle(pub u64);

/// Anything a barrier can be resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResource {
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

/// Layout a resource must be in before it is touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceLayout {
    /// Sampled texture
    Texture,
    /// Storage image or storage buffer
    Uav,
    /// Read-only structured buffer
    ReadOnlyBuffer,
    Clear,
    CopySrc,
    CopyDst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceAccess {
    Read,
    Write,
    ReadWrite,
}

/// One transition requested from the barrier solver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTransition {
    pub resource: GpuResource,
    pub layout: ResourceLayout,
    pub access: ResourceAccess,
    pub stages: ShaderStages,
}

/// Transitions accumulated for one dispatch, clear or copy
pub type TransitionList = Vec<ResourceTransition>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Resident,
    /// Contents discarded, memory released until made resident again
    OnStorage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub resolution: [u32; 3],
    pub format: TextureFormat,
    pub usage: TextureUsages,
    pub mip_level_count: u32,
    /// Storage view may alias the texture with an integer format
    pub reinterpretable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    pub label: String,
    pub element_count: u32,
    pub stride: u32,
    pub usage: BufferUsages,
}

/// Kernel parameter values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    UInt(u32),
    UInt2([u32; 2]),
    UInt3([u32; 3]),
    Float3([f32; 3]),
}

/// Values resolved once from the device at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuCapabilities {
    pub compute_shaders: bool,
    pub typed_uav_loads: bool,
    /// Texture units usable by one compute dispatch
    pub texture_units: u32,
    /// Read-only buffers consume texture units on this API
    pub read_only_buffer_is_tex_buffer: bool,
}

impl Default for GpuCapabilities {
    fn default() -> Self {
        Self {
            compute_shaders: true,
            typed_uav_loads: true,
            texture_units: 32,
            read_only_buffer_is_tex_buffer: false,
        }
    }
}
