//! Texture-space voxelizer
//!
//! Samples the baked volume of each instance's mesh through its world to
//! UVW transform. Meshes are batched so one dispatch binds at most the
//! texture budget resolved from the device.

use super::sliding_window::WindowUpdate;
use super::voxel_volumes::VoxelVolumes;
use super::voxelizer_state::{voxelize_dispatch_size, BuildMode, VoxelizerState};
use crate::constants::{kernels, params, properties};
use crate::error::{OptionExt, VoxelizerError, VoxelizerResult};
use crate::gpu::{
    dispatch_with_barriers, GpuBackend, KernelBindings, KernelHandle, ParamValue, ResourceAccess,
    TextureHandle,
};
use crate::instance_stream::{
    lod_and_alpha_exponent, pack_texture_idx_alpha_exponent, ImageInstanceRecord, InstanceStream,
};
use crate::math::{aabb_center, aabb_half_extents, aabb_size, matrix_rows_3x4, world_to_uvw, Aabb};
use crate::region::{relative_copy_region, shift, Octant};
use crate::scene::{
    add_instance, remove_all_instances, remove_instance, sort_by_mesh_if_dirty, InstanceId,
    MeshId, SceneInstance,
};
use crate::texture_space::{BatchBuilder, MeshCacheSettings, MeshTextureCache, TextureSlotBudget};
use crate::VoxelizerConfig;
use cgmath::Vector3;

pub struct ImageVoxelizer {
    config: VoxelizerConfig,
    state: VoxelizerState,
    volumes: VoxelVolumes,
    cache: MeshTextureCache,
    batches: BatchBuilder,
    stream: InstanceStream<ImageInstanceRecord>,
    kernel: KernelHandle,
    partial_clear_kernel: KernelHandle,
    /// Texture units last declared on the kernel, only grows
    num_tex_units: u32,
}

impl ImageVoxelizer {
    /// Fails when compute is unsupported or a kernel was not shipped
    ///
    /// The texture budget is resolved here, once.
    pub fn new<B: GpuBackend + ?Sized>(
        backend: &B,
        config: VoxelizerConfig,
        cache_settings: MeshCacheSettings,
    ) -> VoxelizerResult<Self> {
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

        let budget = TextureSlotBudget::from_capabilities(
            &caps,
            &config.texture_slot_table,
            config.reserved_texture_slots,
        );
        log::info!(
            "[ImageVoxelizer] {} texture units per batch, {} meshes",
            budget.0,
            budget.meshes_per_batch()
        );

        Ok(Self {
            state: VoxelizerState::new(config.resolution),
            volumes: VoxelVolumes::new(
                "VctImageVoxelizer",
                config.resolution,
                caps.typed_uav_loads,
                config.needs_albedo_mipmaps,
                config.needs_all_mipmaps,
            ),
            cache: MeshTextureCache::new(cache_settings, &config),
            batches: BatchBuilder::new(budget),
            stream: InstanceStream::new("VctImageVoxelizer/InstanceBuffer"),
            kernel: find(kernels::IMAGE_VOXELIZER)?,
            partial_clear_kernel: find(kernels::PARTIAL_CLEAR)?,
            num_tex_units: 0,
            config,
        })
    }

    /// Register an instance; its mesh is baked on the next build
    ///
    /// Returns `Ok(false)` for meshes with a submesh lacking indices.
    pub fn add_instance(&mut self, instance: SceneInstance) -> VoxelizerResult<bool> {
        if instance
            .mesh
            .submeshes
            .iter()
            .any(|submesh| submesh.indices.is_none())
        {
            log::warn!(
                "[ImageVoxelizer] mesh '{}' has a submesh without index buffer; it will not be voxelized",
                instance.mesh.name
            );
            return Ok(false);
        }
        add_instance(&mut self.state.registry, instance)?;
        self.state.full_build_done = false;
        Ok(true)
    }

    pub fn remove_instance(&mut self, id: InstanceId) -> VoxelizerResult<()> {
        remove_instance(&mut self.state.registry, id)?;
        self.state.full_build_done = false;
        Ok(())
    }

    /// Baked meshes stay cached
    pub fn remove_all_instances(&mut self) {
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

    pub fn set_resolution<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, resolution: [u32; 3]) {
        if self.state.set_resolution(resolution) {
            self.volumes.set_resolution(backend, resolution);
            self.config.resolution = resolution;
        }
    }

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

    pub fn texture_budget(&self) -> TextureSlotBudget {
        self.batches.budget()
    }

    pub fn mesh_cache(&self) -> &MeshTextureCache {
        &self.cache
    }

    /// Applies to meshes baked from now on
    pub fn set_mesh_cache_settings(&mut self, settings: MeshCacheSettings) {
        self.cache.set_settings(settings);
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

    /// Bake missing meshes, batch them and stage one record per instance
    ///
    /// Instances are sorted by mesh first so a mesh occupies one batch slot.
    fn fill_instances<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> VoxelizerResult<()> {
        sort_by_mesh_if_dirty(&mut self.state.registry);

        let num_instances = self.state.registry.instances.len();
        self.batches.reset();
        self.stream.reset(self.state.octants.len(), num_instances);

        let budget = self.batches.budget().0;
        let cell_size = self.state.voxel_cell_size();
        let mut current: Option<(MeshId, u32, Vector3<f32>)> = None;

        for instance in &self.state.registry.instances {
            let (texture_idx, mesh_resolution) = match current {
                Some((mesh, texture_idx, resolution)) if mesh == instance.mesh.id => {
                    (texture_idx, resolution)
                }
                _ => {
                    let baked = self.cache.get_or_bake(backend, &instance.mesh)?;
                    let slot = self.batches.push_mesh(instance.mesh.id, baked.textures());
                    if slot.new_batch {
                        self.stream.begin_group();
                    }
                    let resolution = Vector3::new(
                        baked.resolution[0] as f32,
                        baked.resolution[1] as f32,
                        baked.resolution[2] as f32,
                    );
                    current = Some((instance.mesh.id, slot.texture_idx, resolution));
                    (slot.texture_idx, resolution)
                }
            };

            let (lod_level, alpha_exponent) = lod_and_alpha_exponent(
                cell_size,
                mesh_resolution,
                aabb_size(&instance.world_aabb),
            );
            let record = ImageInstanceRecord {
                world_to_uvw: matrix_rows_3x4(&world_to_uvw(
                    &instance.transform,
                    &instance.local_aabb,
                )),
                aabb_center: aabb_center(&instance.world_aabb).into(),
                texture_idx_alpha_exponent: pack_texture_idx_alpha_exponent(
                    texture_idx,
                    budget,
                    alpha_exponent,
                ),
                aabb_half_size: aabb_half_extents(&instance.world_aabb).into(),
                lod_level,
                _padding: [0.0; 4],
            };
            self.stream
                .push(&self.state.octants, &instance.world_aabb, record);
        }
        self.stream.upload(backend)?;

        let needed = self.batches.max_textures_bound() + self.config.reserved_texture_slots;
        if needed > self.num_tex_units {
            self.num_tex_units = needed;
            backend.set_property(self.kernel, properties::NUM_TEX_UNITS, needed as i32);
        }

        log::debug!(
            "[ImageVoxelizer] {} batches, {} records over {} octants",
            self.batches.batches().len(),
            self.stream.total_records(),
            self.state.octants.len()
        );
        Ok(())
    }

    fn voxelize<B: GpuBackend + ?Sized>(&self, backend: &mut B, mode: BuildMode) {
        let Some(instance_buffer) = self.stream.gpu_buffer() else {
            return;
        };
        let kernel = self.kernel;
        let cell_size: [f32; 3] = self.state.voxel_cell_size().into();
        let first_texture_slot = self.config.reserved_texture_slots;

        for (group, batch) in self.batches.batches().iter().enumerate() {
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

                let mut bindings = KernelBindings::new(kernel).with_buffer(
                    0,
                    instance_buffer,
                    ResourceAccess::Read,
                );
                for (i, &texture) in batch.textures.iter().enumerate() {
                    bindings = bindings.with_texture(first_texture_slot + i as u32, texture);
                }
                let bindings = self.volumes.bind_uavs(bindings);
                dispatch_with_barriers(backend, &bindings, groups);
            }
        }
    }

    /// Voxelize the whole region
    pub fn build<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> VoxelizerResult<()> {
        self.state.ensure_octants(self.config.octant_subdivision);
        self.volumes.ensure_created(backend)?;

        if self.state.registry.instances.is_empty() {
            self.volumes.clear_full(backend);
            self.volumes.finalize(backend);
            log::info!("[ImageVoxelizer] Empty scene, volumes cleared");
            return Ok(());
        }

        self.fill_instances(backend)?;
        self.volumes.clear_full(backend);
        self.voxelize(backend, BuildMode::Full);
        self.volumes.finalize(backend);
        self.state.full_build_done = true;

        log::info!(
            "[ImageVoxelizer] Built {} instances in {} batches over {} octants",
            self.state.registry.instances.len(),
            self.batches.batches().len(),
            self.state.octants.len()
        );
        Ok(())
    }

    /// Voxelize only what a window move of `diff` voxels exposed
    ///
    /// Same contract as the geometry path.
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
            self.fill_instances(backend)?;
            self.voxelize(backend, BuildMode::Relative);
        }
        self.volumes.finalize(backend);

        log::debug!(
            "[ImageVoxelizer] Relative build {:?}, {} shells",
            diff,
            self.state.octants.len()
        );
        self.state
            .divide_octants(subdivision[0], subdivision[1], subdivision[2]);
        Ok(())
    }

    /// Move to a sliding window's new region and rebuild what it exposed
    pub fn follow_window<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        update: &WindowUpdate,
    ) -> VoxelizerResult<()> {
        if update.full_rebuild {
            self.force_full_build();
        }
        self.state.set_region(false, update.region, Aabb::INFINITE);
        self.build_relative(backend, update.diff, update.octant_subdivision)
    }

    /// Releases the volumes, the instance buffer and every baked mesh
    pub fn destroy<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        self.volumes.destroy(backend);
        self.stream.destroy(backend);
        self.cache.destroy(backend);
    }
}
