//! Geometry voxelizer
//!
//! Rasterizes packed triangle data of every registered instance into the
//! scene volumes, one dispatch per bucket per octant.

use super::voxel_volumes::VoxelVolumes;
use super::voxelizer_state::{voxelize_dispatch_size, BuildMode, VoxelizerState};
use crate::constants::{kernels, params, threads};
use crate::error::{ErrorContext, OptionExt, VoxelizerError, VoxelizerResult};
use crate::geometry::{
    classify_instances, GeometryBufferPacker, MaterialTable, QueuedInstance, VoxelizerBucket,
};
use crate::gpu::{
    dispatch_with_barriers, GpuBackend, KernelBindings, KernelHandle, KernelVariantTable,
    ParamValue, ResourceAccess, TextureHandle,
};
use crate::instance_stream::{
    GeometryInstanceRecord, InstanceStream, INSTANCE_FLAG_ADJUSTED_START,
    INSTANCE_FLAG_NEEDS_AABB_UPDATE,
};
use crate::math::{aabb_center, aabb_half_extents, matrix_rows_3x4, world_matrix, Aabb};
use crate::region::{relative_copy_region, shift, Octant};
use crate::scene::{
    add_instance, remove_all_instances, remove_instance, InstanceId, SceneInstance,
};
use crate::VoxelizerConfig;

/// Constant names for the voxelizer variant bits, lowest bit first
const VOXELIZER_VARIANT_PROPERTIES: &[&str] = &[
    "index_32bit",
    "compressed_vertex_format",
    "has_diffuse_tex",
    "has_emissive_tex",
];

fn geometry_record(instance: &SceneInstance, queued: &QueuedInstance) -> GeometryInstanceRecord {
    let mut flags = 0;
    if queued.needs_aabb_update {
        flags |= INSTANCE_FLAG_NEEDS_AABB_UPDATE;
    }
    if queued.adjusted_start {
        flags |= INSTANCE_FLAG_ADJUSTED_START;
    }
    GeometryInstanceRecord {
        world_matrix: matrix_rows_3x4(&world_matrix(&instance.transform)),
        aabb_center: aabb_center(&instance.world_aabb).into(),
        vertex_start: queued.vertex_start,
        aabb_half_size: aabb_half_extents(&instance.world_aabb).into(),
        index_start: queued.index_start,
        index_count: queued.index_count,
        partition_idx: queued.partition_idx,
        material_idx: queued.material_idx,
        flags,
    }
}

pub struct GeometryVoxelizer {
    config: VoxelizerConfig,
    state: VoxelizerState,
    volumes: VoxelVolumes,
    packer: GeometryBufferPacker,
    materials: MaterialTable,
    stream: InstanceStream<GeometryInstanceRecord>,
    voxelizer_kernels: KernelVariantTable<{ kernels::NUM_VOXELIZER_VARIANTS }>,
    world_aabb_kernel: KernelHandle,
    partial_clear_kernel: KernelHandle,
}

impl GeometryVoxelizer {
    /// Fails when compute is unsupported or a kernel was not shipped
    pub fn new<B: GpuBackend + ?Sized>(backend: &B, config: VoxelizerConfig) -> VoxelizerResult<Self> {
        let caps = backend.capabilities();
        if !caps.compute_shaders {
            return Err(VoxelizerError::FeatureDisabled(
                "compute shaders are required for voxelization".to_string(),
            ));
        }
        config.validate()?;

        let find = |name: &'static str| {
            backend
                .find_kernel(name)
                .ok_or_voxelizer(|| VoxelizerError::KernelNotFound {
                    name: name.to_string(),
                })
        };

        Ok(Self {
            state: VoxelizerState::new(config.resolution),
            volumes: VoxelVolumes::new(
                "VctVoxelizer",
                config.resolution,
                caps.typed_uav_loads,
                config.needs_albedo_mipmaps,
                config.needs_all_mipmaps,
            ),
            packer: GeometryBufferPacker::new(backend, config.default_index_count_split)?,
            materials: MaterialTable::default(),
            stream: InstanceStream::new("VctVoxelizer/InstanceBuffer"),
            voxelizer_kernels: KernelVariantTable::new(
                backend,
                kernels::VOXELIZER,
                VOXELIZER_VARIANT_PROPERTIES,
            )?,
            world_aabb_kernel: find(kernels::AABB_WORLD_SPACE)?,
            partial_clear_kernel: find(kernels::PARTIAL_CLEAR)?,
            config,
        })
    }

    /// Register an instance and take a reference on its mesh
    ///
    /// Returns `Ok(false)` when the mesh cannot be voxelized (a submesh has
    /// no index buffer); the instance is then not registered.
    pub fn add_instance(
        &mut self,
        instance: SceneInstance,
        compressed: bool,
        index_count_split: u32,
    ) -> VoxelizerResult<bool> {
        if self.state.registry.lookup.contains_key(&instance.id) {
            return Err(VoxelizerError::DuplicateInstance { id: instance.id.0 });
        }
        if !self
            .packer
            .register_mesh(&instance.mesh, compressed, index_count_split)
        {
            return Ok(false);
        }
        add_instance(&mut self.state.registry, instance)?;
        self.state.full_build_done = false;
        Ok(true)
    }

    pub fn remove_instance(&mut self, id: InstanceId) -> VoxelizerResult<()> {
        let removed = remove_instance(&mut self.state.registry, id)?;
        self.packer.unregister_mesh(removed.mesh.id);
        self.state.full_build_done = false;
        Ok(())
    }

    pub fn remove_all_instances(&mut self) {
        for instance in &self.state.registry.instances {
            self.packer.unregister_mesh(instance.mesh.id);
        }
        remove_all_instances(&mut self.state.registry);
        self.state.full_build_done = false;
    }

    pub fn num_instances(&self) -> usize {
        self.state.registry.instances.len()
    }

    pub fn set_region(&mut self, auto_region: bool, region: Aabb, max_region: Aabb) {
        self.state.set_region(auto_region, region, max_region);
    }

    pub fn auto_calculate_region(&mut self) {
        self.state.auto_calculate_region();
    }

    pub fn divide_octants(&mut self, count_x: u32, count_y: u32, count_z: u32) {
        self.state.divide_octants(count_x, count_y, count_z);
    }

    /// Destroys the volumes when the resolution changes
    pub fn set_resolution<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, resolution: [u32; 3]) {
        if self.state.set_resolution(resolution) {
            self.volumes.set_resolution(backend, resolution);
            self.config.resolution = resolution;
        }
    }

    /// Next `build_relative` rebuilds everything
    pub fn force_full_build(&mut self) {
        self.state.full_build_done = false;
    }

    pub fn octants(&self) -> &[Octant] {
        &self.state.octants
    }

    pub fn region(&self) -> Aabb {
        self.state.region
    }

    pub fn state(&self) -> &VoxelizerState {
        &self.state
    }

    pub fn volumes(&self) -> &VoxelVolumes {
        &self.volumes
    }

    pub fn albedo_volume(&self) -> Option<TextureHandle> {
        self.volumes.current().map(|v| v.albedo)
    }

    pub fn normal_volume(&self) -> Option<TextureHandle> {
        self.volumes.current().map(|v| v.normal)
    }

    pub fn emissive_volume(&self) -> Option<TextureHandle> {
        self.volumes.current().map(|v| v.emissive)
    }

    pub fn accumulation_volume(&self) -> Option<TextureHandle> {
        self.volumes.accumulation()
    }

    /// Pack geometry, bucket instances and stage one record per partition
    fn prepare_instances<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> VoxelizerResult<Vec<VoxelizerBucket>> {
        self.packer
            .build_buffers(backend)
            .context("packing voxelizer geometry")?;

        let buckets = classify_instances(
            &self.state.registry.instances,
            &self.packer,
            &mut self.materials,
        );
        self.materials.upload(backend)?;

        let num_candidates = buckets.iter().map(|b| b.instances.len()).sum();
        self.stream.reset(self.state.octants.len(), num_candidates);
        for bucket in &buckets {
            self.stream.begin_group();
            for queued in &bucket.instances {
                let instance = &self.state.registry.instances[queued.instance_idx];
                self.stream.push(
                    &self.state.octants,
                    &instance.world_aabb,
                    geometry_record(instance, queued),
                );
            }
        }
        self.stream.upload(backend)?;

        log::debug!(
            "[GeometryVoxelizer] {} buckets, {} records over {} octants",
            buckets.len(),
            self.stream.total_records(),
            self.state.octants.len()
        );
        Ok(buckets)
    }

    /// Local partition AABBs, then the world AABBs of split submeshes
    fn update_instance_aabbs<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> VoxelizerResult<()> {
        self.packer.compute_mesh_aabbs(backend)?;

        let (Some(instance_buffer), Some(partition_aabbs)) =
            (self.stream.gpu_buffer(), self.packer.partition_aabb_buffer())
        else {
            return Ok(());
        };
        let num_instances = self.stream.records().len() as u32;
        if num_instances == 0 {
            return Ok(());
        }

        backend.set_param(
            self.world_aabb_kernel,
            params::NUM_INSTANCES,
            ParamValue::UInt(num_instances),
        );
        let bindings = KernelBindings::new(self.world_aabb_kernel)
            .with_buffer(0, partition_aabbs, ResourceAccess::Read)
            .with_buffer(1, instance_buffer, ResourceAccess::ReadWrite);
        dispatch_with_barriers(
            backend,
            &bindings,
            [num_instances.div_ceil(threads::AABB_CALCULATOR), 1, 1],
        );
        Ok(())
    }

    fn voxelize<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        buckets: &[VoxelizerBucket],
        mode: BuildMode,
    ) -> VoxelizerResult<()> {
        let (Some(instance_buffer), Some(partition_table)) =
            (self.stream.gpu_buffer(), self.packer.partition_table_buffer())
        else {
            return Ok(());
        };
        let cell_size: [f32; 3] = self.state.voxel_cell_size().into();

        for (group, bucket) in buckets.iter().enumerate() {
            let kernel = self
                .voxelizer_kernels
                .get_or_create(backend, bucket.key.variant.0)?;
            let material_buffer = self
                .materials
                .buffer(bucket.key.material_slot)
                .ok_or_voxelizer(|| VoxelizerError::Internal {
                    message: format!("material buffer {} missing", bucket.key.material_slot),
                })?;

            for (octant_idx, octant) in self.state.octants.iter().enumerate() {
                let range = self.stream.range(group, octant_idx);
                if range.count == 0 {
                    continue;
                }

                let (threads_per_group, groups) = voxelize_dispatch_size(octant, mode);
                backend.set_threads_per_group(kernel, threads_per_group);
                backend.set_param(
                    kernel,
                    params::INSTANCE_RANGE,
                    ParamValue::UInt2([range.offset, range.count]),
                );
                backend.set_param(
                    kernel,
                    params::VOXEL_ORIGIN,
                    ParamValue::Float3(octant.region.min.into()),
                );
                backend.set_param(kernel, params::VOXEL_CELL_SIZE, ParamValue::Float3(cell_size));
                backend.set_param(
                    kernel,
                    params::VOXEL_PIXEL_ORIGIN,
                    ParamValue::UInt3([octant.x, octant.y, octant.z]),
                );

                let mut bindings = KernelBindings::new(kernel)
                    .with_buffer(0, bucket.key.vertex_buffer, ResourceAccess::Read)
                    .with_buffer(1, bucket.key.index_buffer, ResourceAccess::Read)
                    .with_buffer(2, material_buffer, ResourceAccess::Read)
                    .with_buffer(3, instance_buffer, ResourceAccess::Read)
                    .with_buffer(4, partition_table, ResourceAccess::Read);
                if bucket.key.needs_texture_pool {
                    for (slot, &texture) in self.materials.texture_pool().iter().enumerate() {
                        bindings = bindings.with_texture(slot as u32, texture);
                    }
                }
                let bindings = self.volumes.bind_uavs(bindings);
                dispatch_with_barriers(backend, &bindings, groups);
            }
        }
        Ok(())
    }

    /// Voxelize the whole region
    ///
    /// An empty scene still creates and clears the volumes.
    pub fn build<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> VoxelizerResult<()> {
        self.build_whole(backend, BuildMode::Full)
    }

    /// Full build of a per-mesh volume whose resolution need not align to
    /// thread groups
    pub(crate) fn build_baked<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> VoxelizerResult<()> {
        self.build_whole(backend, BuildMode::Bake)
    }

    fn build_whole<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        mode: BuildMode,
    ) -> VoxelizerResult<()> {
        self.state.ensure_octants(self.config.octant_subdivision);
        self.volumes.ensure_created(backend)?;

        if self.state.registry.instances.is_empty() {
            self.volumes.clear_full(backend);
            self.volumes.finalize(backend);
            log::info!("[GeometryVoxelizer] Empty scene, volumes cleared");
            return Ok(());
        }

        let buckets = self.prepare_instances(backend)?;
        self.volumes.clear_full(backend);
        self.update_instance_aabbs(backend)?;
        self.voxelize(backend, &buckets, mode)?;
        self.volumes.finalize(backend);
        self.state.full_build_done = true;

        log::info!(
            "[GeometryVoxelizer] Built {} instances into {:?} over {} octants",
            self.state.registry.instances.len(),
            self.state.resolution,
            self.state.octants.len()
        );
        Ok(())
    }

    /// Voxelize only what a window move of `diff` voxels exposed
    ///
    /// The region must already be the moved one. Falls back to a full build
    /// divided by `subdivision` when no full build has happened yet.
    pub fn build_relative<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        diff: [i32; 3],
        subdivision: [u32; 3],
    ) -> VoxelizerResult<()> {
        if !self.state.full_build_done {
            self.state
                .divide_octants(subdivision[0], subdivision[1], subdivision[2]);
            return self.build(backend);
        }

        self.volumes.ensure_created(backend)?;
        self.volumes.ensure_alternate_created(backend)?;
        let copy = relative_copy_region(self.state.resolution, diff);
        self.volumes.flip_and_copy(backend, copy.as_ref());

        self.state.octants = shift(&self.state.voxel_region(), diff[0], diff[1], diff[2]);
        self.volumes
            .clear_shells(backend, self.partial_clear_kernel, &self.state.octants);

        if !self.state.registry.instances.is_empty() && !self.state.octants.is_empty() {
            let buckets = self.prepare_instances(backend)?;
            self.update_instance_aabbs(backend)?;
            self.voxelize(backend, &buckets, BuildMode::Relative)?;
        }
        self.volumes.finalize(backend);

        log::debug!(
            "[GeometryVoxelizer] Relative build {:?}, {} shells",
            diff,
            self.state.octants.len()
        );
        self.state
            .divide_octants(subdivision[0], subdivision[1], subdivision[2]);
        Ok(())
    }

    pub fn destroy<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        self.volumes.destroy(backend);
        self.packer.destroy(backend);
        self.materials.destroy(backend);
        self.stream.destroy(backend);
    }
}
