//! Test support
//!
//! A recording backend standing in for the host renderer, plus mesh and
//! instance fixtures.

use crate::constants::kernels;
use crate::error::{VoxelizerError, VoxelizerResult};
use crate::gpu::{
    BarrierSolver, BufferDesc, BufferHandle, ComputeExecutor, GpuBackend, GpuCapabilities,
    GpuResource, KernelHandle, ParamValue, Residency, ResourceAccess, ResourceAllocator,
    ResourceLayout, ResourceTransition, TextureDesc, TextureHandle, TransitionList,
};
use crate::math::{aabb_from_center_half_extents, create_aabb, InstanceTransform};
use crate::region::TextureCopyRegion;
use crate::scene::{
    IndexData, InstanceId, MaterialDescriptor, MeshGeometry, MeshId, SceneInstance, SourceVertex,
    SubMeshGeometry,
};
use cgmath::{Point3, Vector3};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use wgpu::ShaderStages;

/// Everything a voxelizer asked the backend to do, in order
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    CreateVariant {
        name: String,
        constants: Vec<(&'static str, i32)>,
    },
    SetThreads {
        kernel: KernelHandle,
        threads: [u32; 3],
    },
    SetProperty {
        kernel: KernelHandle,
        name: &'static str,
        value: i32,
    },
    SetParam {
        kernel: KernelHandle,
        name: &'static str,
        value: ParamValue,
    },
    BindTexture {
        kernel: KernelHandle,
        slot: u32,
        texture: TextureHandle,
    },
    BindUav {
        kernel: KernelHandle,
        slot: u32,
        texture: TextureHandle,
        access: ResourceAccess,
    },
    BindBuffer {
        kernel: KernelHandle,
        slot: u32,
        buffer: BufferHandle,
        access: ResourceAccess,
    },
    Dispatch {
        kernel: KernelHandle,
        groups: [u32; 3],
    },
    ClearFloat {
        texture: TextureHandle,
        value: [f32; 4],
    },
    ClearUint {
        texture: TextureHandle,
        value: [u32; 4],
    },
    Execute(TransitionList),
    Copy {
        src: TextureHandle,
        dst: TextureHandle,
        region: TextureCopyRegion,
    },
    Mipmaps(TextureHandle),
    CreateTexture {
        texture: TextureHandle,
        desc: TextureDesc,
    },
    DestroyTexture(TextureHandle),
    Residency {
        texture: TextureHandle,
        residency: Residency,
    },
    CreateBuffer {
        buffer: BufferHandle,
        desc: BufferDesc,
    },
    DestroyBuffer(BufferHandle),
    Upload {
        buffer: BufferHandle,
        offset: u64,
        len: usize,
    },
}

pub struct RecordingBackend {
    capabilities: GpuCapabilities,
    kernels: FxHashMap<String, KernelHandle>,
    threads: FxHashMap<KernelHandle, [u32; 3]>,
    textures: FxHashMap<TextureHandle, TextureDesc>,
    live_buffers: FxHashSet<BufferHandle>,
    texture_descs: Vec<TextureDesc>,
    textures_created: usize,
    buffers_created: usize,
    next_handle: u64,
    events: Vec<BackendEvent>,
}

impl RecordingBackend {
    /// Backend shipping every base kernel
    pub fn new() -> Self {
        Self::with_capabilities(GpuCapabilities::default())
    }

    pub fn with_capabilities(capabilities: GpuCapabilities) -> Self {
        let mut backend = Self::without_kernels();
        backend.capabilities = capabilities;
        for name in [
            kernels::VOXELIZER,
            kernels::IMAGE_VOXELIZER,
            kernels::PARTIAL_CLEAR,
            kernels::AABB_CALCULATOR,
            kernels::AABB_WORLD_SPACE,
        ] {
            let kernel = KernelHandle(backend.allocate_handle());
            backend.kernels.insert(name.to_string(), kernel);
        }
        backend
    }

    pub fn without_kernels() -> Self {
        Self {
            capabilities: GpuCapabilities::default(),
            kernels: FxHashMap::default(),
            threads: FxHashMap::default(),
            textures: FxHashMap::default(),
            live_buffers: FxHashSet::default(),
            texture_descs: Vec::new(),
            textures_created: 0,
            buffers_created: 0,
            next_handle: 1000,
            events: Vec::new(),
        }
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    pub fn events(&self) -> &[BackendEvent] {
        &self.events
    }

    /// Drops recorded events, allocation counters are kept
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn textures_created(&self) -> usize {
        self.textures_created
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn buffers_created(&self) -> usize {
        self.buffers_created
    }

    pub fn live_buffers(&self) -> usize {
        self.live_buffers.len()
    }

    /// Every texture ever created, in creation order
    pub fn texture_descs(&self) -> Vec<TextureDesc> {
        self.texture_descs.clone()
    }

    /// Thread groups of every recorded dispatch, any kernel
    pub fn dispatches(&self) -> Vec<[u32; 3]> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BackendEvent::Dispatch { groups, .. } => Some(*groups),
                _ => None,
            })
            .collect()
    }

    pub fn find_kernel_handle(&self, name: &str) -> KernelHandle {
        match self.kernels.get(name) {
            Some(&kernel) => kernel,
            None => panic!("kernel {} was never registered", name),
        }
    }
}

impl ComputeExecutor for RecordingBackend {
    fn find_kernel(&self, name: &str) -> Option<KernelHandle> {
        self.kernels.get(name).copied()
    }

    fn create_kernel_variant(
        &mut self,
        _base: KernelHandle,
        name: &str,
        constants: &[(&'static str, i32)],
    ) -> VoxelizerResult<KernelHandle> {
        let kernel = KernelHandle(self.allocate_handle());
        self.kernels.insert(name.to_string(), kernel);
        self.events.push(BackendEvent::CreateVariant {
            name: name.to_string(),
            constants: constants.to_vec(),
        });
        Ok(kernel)
    }

    fn threads_per_group(&self, kernel: KernelHandle) -> [u32; 3] {
        self.threads.get(&kernel).copied().unwrap_or([1, 1, 1])
    }

    fn set_threads_per_group(&mut self, kernel: KernelHandle, threads: [u32; 3]) {
        self.threads.insert(kernel, threads);
        self.events.push(BackendEvent::SetThreads { kernel, threads });
    }

    fn set_property(&mut self, kernel: KernelHandle, name: &'static str, value: i32) {
        self.events
            .push(BackendEvent::SetProperty { kernel, name, value });
    }

    fn set_param(&mut self, kernel: KernelHandle, name: &'static str, value: ParamValue) {
        self.events.push(BackendEvent::SetParam { kernel, name, value });
    }

    fn bind_texture(&mut self, kernel: KernelHandle, slot: u32, texture: TextureHandle) {
        self.events.push(BackendEvent::BindTexture {
            kernel,
            slot,
            texture,
        });
    }

    fn bind_uav_texture(
        &mut self,
        kernel: KernelHandle,
        slot: u32,
        texture: TextureHandle,
        access: ResourceAccess,
    ) {
        self.events.push(BackendEvent::BindUav {
            kernel,
            slot,
            texture,
            access,
        });
    }

    fn bind_buffer(
        &mut self,
        kernel: KernelHandle,
        slot: u32,
        buffer: BufferHandle,
        access: ResourceAccess,
    ) {
        self.events.push(BackendEvent::BindBuffer {
            kernel,
            slot,
            buffer,
            access,
        });
    }

    fn dispatch(&mut self, kernel: KernelHandle, thread_groups: [u32; 3]) {
        self.events.push(BackendEvent::Dispatch {
            kernel,
            groups: thread_groups,
        });
    }

    fn clear_uav_float(&mut self, texture: TextureHandle, value: [f32; 4]) {
        self.events.push(BackendEvent::ClearFloat { texture, value });
    }

    fn clear_uav_uint(&mut self, texture: TextureHandle, value: [u32; 4]) {
        self.events.push(BackendEvent::ClearUint { texture, value });
    }
}

impl BarrierSolver for RecordingBackend {
    fn resolve_transition(
        &mut self,
        list: &mut TransitionList,
        resource: GpuResource,
        layout: ResourceLayout,
        access: ResourceAccess,
        stages: ShaderStages,
    ) {
        list.push(ResourceTransition {
            resource,
            layout,
            access,
            stages,
        });
    }

    fn execute(&mut self, list: &TransitionList) {
        self.events.push(BackendEvent::Execute(list.clone()));
    }
}

impl ResourceAllocator for RecordingBackend {
    fn create_texture_3d(&mut self, desc: &TextureDesc) -> VoxelizerResult<TextureHandle> {
        if desc.resolution.contains(&0) {
            return Err(VoxelizerError::ResourceCreationFailed {
                resource: desc.label.clone(),
                reason: "zero-sized texture".to_string(),
            });
        }
        let texture = TextureHandle(self.allocate_handle());
        self.textures.insert(texture, desc.clone());
        self.texture_descs.push(desc.clone());
        self.textures_created += 1;
        self.events.push(BackendEvent::CreateTexture {
            texture,
            desc: desc.clone(),
        });
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        assert!(
            self.textures.remove(&texture).is_some(),
            "texture {:?} destroyed twice",
            texture
        );
        self.events.push(BackendEvent::DestroyTexture(texture));
    }

    fn set_residency(&mut self, texture: TextureHandle, residency: Residency) {
        self.events
            .push(BackendEvent::Residency { texture, residency });
    }

    fn texture_resolution(&self, texture: TextureHandle) -> [u32; 3] {
        self.textures
            .get(&texture)
            .map(|desc| desc.resolution)
            .unwrap_or([0, 0, 0])
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> VoxelizerResult<BufferHandle> {
        let buffer = BufferHandle(self.allocate_handle());
        self.live_buffers.insert(buffer);
        self.buffers_created += 1;
        self.events.push(BackendEvent::CreateBuffer {
            buffer,
            desc: desc.clone(),
        });
        Ok(buffer)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        assert!(
            self.live_buffers.remove(&buffer),
            "buffer {:?} destroyed twice",
            buffer
        );
        self.events.push(BackendEvent::DestroyBuffer(buffer));
    }

    fn upload_buffer(&mut self, buffer: BufferHandle, offset_bytes: u64, data: &[u8]) {
        self.events.push(BackendEvent::Upload {
            buffer,
            offset: offset_bytes,
            len: data.len(),
        });
    }

    fn copy_texture_region(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        region: &TextureCopyRegion,
    ) {
        self.events.push(BackendEvent::Copy {
            src,
            dst,
            region: *region,
        });
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) {
        self.events.push(BackendEvent::Mipmaps(texture));
    }
}

impl GpuBackend for RecordingBackend {
    fn capabilities(&self) -> GpuCapabilities {
        self.capabilities
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn quad_vertices() -> Vec<SourceVertex> {
    [[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0]]
        .into_iter()
        .map(|position| SourceVertex {
            position,
            normal: [0.0, 0.0, 1.0],
            uv: [0.0, 0.0],
        })
        .collect()
}

fn mesh(id: u64, indices: Option<IndexData>, material: MaterialDescriptor) -> Arc<MeshGeometry> {
    Arc::new(MeshGeometry {
        id: MeshId(id),
        name: format!("mesh{}", id),
        content_hash: Some([id, 0]),
        local_aabb: create_aabb(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)),
        submeshes: vec![SubMeshGeometry {
            vertices: quad_vertices(),
            indices,
            material,
        }],
    })
}

/// Four vertices, `count` 16-bit indices cycling over them
pub fn mesh_with_indices16(id: u64, count: u32) -> Arc<MeshGeometry> {
    let indices = (0..count).map(|i| (i % 4) as u16).collect();
    mesh(id, Some(IndexData::U16(indices)), MaterialDescriptor::default())
}

pub fn mesh_with_indices32(id: u64, count: u32) -> Arc<MeshGeometry> {
    let indices = (0..count).map(|i| i % 4).collect();
    mesh(id, Some(IndexData::U32(indices)), MaterialDescriptor::default())
}

pub fn mesh_without_indices(id: u64) -> Arc<MeshGeometry> {
    mesh(id, None, MaterialDescriptor::default())
}

pub fn textured_mesh(
    id: u64,
    count: u32,
    diffuse: TextureHandle,
    emissive: Option<TextureHandle>,
) -> Arc<MeshGeometry> {
    let indices = (0..count).map(|i| (i % 4) as u16).collect();
    mesh(
        id,
        Some(IndexData::U16(indices)),
        MaterialDescriptor {
            diffuse_texture: Some(diffuse),
            emissive_texture: emissive,
            ..Default::default()
        },
    )
}

/// Instance scaling the unit mesh box by `half` around `center`
pub fn instance_of(id: u64, mesh: &Arc<MeshGeometry>, center: [f32; 3], half: f32) -> SceneInstance {
    SceneInstance {
        id: InstanceId(id),
        mesh: Arc::clone(mesh),
        world_aabb: aabb_from_center_half_extents(
            Point3::from(center),
            Vector3::new(half, half, half),
        ),
        local_aabb: mesh.local_aabb,
        transform: InstanceTransform {
            position: Vector3::from(center),
            scale: Vector3::new(half, half, half),
            ..Default::default()
        },
    }
}
