//! Baked mesh volume cache
//!
//! Each mesh is voxelized once, alone, at a resolution derived from its
//! local size. The texture-space voxelizer then samples those volumes per
//! instance instead of rasterizing triangles again.

use crate::constants::mesh_cache;
use crate::dispatch::voxel_volumes::{max_mip_count, ALBEDO_FORMAT, EMISSIVE_FORMAT, NORMAL_FORMAT};
use crate::dispatch::GeometryVoxelizer;
use crate::error::{OptionExt, VoxelizerError, VoxelizerResult};
use crate::gpu::{clear_float_with_barrier, copy_with_barriers, GpuBackend, TextureDesc, TextureHandle};
use crate::math::{aabb_size, Aabb, InstanceTransform};
use crate::region::TextureCopyRegion;
use crate::scene::{InstanceId, MeshGeometry, SceneInstance};
use crate::VoxelizerConfig;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wgpu::{TextureFormat, TextureUsages};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshCacheSettings {
    /// Resolution of a mesh whose size equals `dimension_per_pixel`
    pub resolution: [u32; 3],
    pub max_resolution: [u32; 3],
    pub dimension_per_pixel: [f32; 3],
}

impl Default for MeshCacheSettings {
    fn default() -> Self {
        Self {
            resolution: [mesh_cache::DEFAULT_RESOLUTION; 3],
            max_resolution: [mesh_cache::DEFAULT_MAX_RESOLUTION; 3],
            dimension_per_pixel: [mesh_cache::DEFAULT_DIMENSION_PER_PIXEL; 3],
        }
    }
}

/// Baked volumes of one mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelizedMesh {
    pub hash: Option<[u64; 2]>,
    pub albedo: TextureHandle,
    pub normal: TextureHandle,
    /// Shared blank texture when the mesh emits nothing
    pub emissive: TextureHandle,
    pub resolution: [u32; 3],
}

impl VoxelizedMesh {
    pub fn textures(&self) -> [TextureHandle; 3] {
        [self.albedo, self.normal, self.emissive]
    }
}

/// Scale `base` by `actual / reference`, round up to a power of two and clamp
pub fn calculate_mesh_resolution(base: u32, actual_length: f32, reference_length: f32, max: u32) -> u32 {
    let scaled = (base as f32 * actual_length / reference_length).round() as u32;
    scaled.next_power_of_two().min(max).max(1)
}

/// Any submesh with an emissive texture or a non-black emissive colour
///
/// An all-black emissive texture still counts.
pub fn has_emissive(mesh: &MeshGeometry) -> bool {
    mesh.submeshes.iter().any(|submesh| {
        submesh.material.emissive_texture.is_some()
            || submesh.material.emissive != [0.0, 0.0, 0.0]
    })
}

#[derive(Debug)]
pub struct MeshTextureCache {
    settings: MeshCacheSettings,
    /// Configuration of the throwaway voxelizer used for baking
    bake_config: VoxelizerConfig,
    entries: FxHashMap<String, VoxelizedMesh>,
    blank_emissive: Option<TextureHandle>,
}

impl MeshTextureCache {
    pub fn new(settings: MeshCacheSettings, base_config: &VoxelizerConfig) -> Self {
        Self {
            settings,
            bake_config: VoxelizerConfig {
                octant_subdivision: [1, 1, 1],
                needs_albedo_mipmaps: true,
                needs_all_mipmaps: true,
                ..base_config.clone()
            },
            entries: FxHashMap::default(),
            blank_emissive: None,
        }
    }

    pub fn settings(&self) -> MeshCacheSettings {
        self.settings
    }

    /// New settings only apply to meshes baked afterwards
    pub fn set_settings(&mut self, settings: MeshCacheSettings) {
        self.settings = settings;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&VoxelizedMesh> {
        self.entries.get(name)
    }

    pub fn blank_emissive(&self) -> Option<TextureHandle> {
        self.blank_emissive
    }

    pub fn mesh_resolution(&self, local_aabb: &Aabb) -> [u32; 3] {
        let size = aabb_size(local_aabb);
        let size = [size.x, size.y, size.z];
        std::array::from_fn(|axis| {
            calculate_mesh_resolution(
                self.settings.resolution[axis],
                size[axis],
                self.settings.dimension_per_pixel[axis],
                self.settings.max_resolution[axis],
            )
        })
    }

    fn ensure_blank_emissive<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> VoxelizerResult<TextureHandle> {
        if let Some(blank) = self.blank_emissive {
            return Ok(blank);
        }
        let blank = backend.create_texture_3d(&TextureDesc {
            label: "VctImage/BlankEmissive".to_string(),
            resolution: [1, 1, 1],
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::STORAGE_BINDING,
            mip_level_count: 1,
            reinterpretable: false,
        })?;
        clear_float_with_barrier(backend, blank, [0.0, 0.0, 0.0, 1.0]);
        self.blank_emissive = Some(blank);
        Ok(blank)
    }

    fn destroy_entry<B: GpuBackend + ?Sized>(&self, backend: &mut B, entry: &VoxelizedMesh) {
        backend.destroy_texture(entry.albedo);
        backend.destroy_texture(entry.normal);
        if Some(entry.emissive) != self.blank_emissive {
            backend.destroy_texture(entry.emissive);
        }
    }

    /// Entry for `mesh`, baking it when missing or stale
    ///
    /// Staleness is decided by the content hash. A mesh without a hash can
    /// only reuse an entry that was baked without one.
    pub fn get_or_bake<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        mesh: &Arc<MeshGeometry>,
    ) -> VoxelizerResult<VoxelizedMesh> {
        if let Some(entry) = self.entries.get(&mesh.name).copied() {
            let up_to_date = match (mesh.content_hash, entry.hash) {
                (None, None) => {
                    log::warn!(
                        "[MeshTextureCache] mesh '{}' has no content hash; assuming its cache entry is not stale",
                        mesh.name
                    );
                    true
                }
                (None, Some(_)) => {
                    log::warn!(
                        "[MeshTextureCache] mesh '{}' has no content hash; rebaking",
                        mesh.name
                    );
                    false
                }
                (Some(hash), Some(cached)) => hash == cached,
                (Some(_), None) => false,
            };
            if up_to_date {
                return Ok(entry);
            }
            self.destroy_entry(backend, &entry);
            self.entries.remove(&mesh.name);
        }

        let baked = self.bake(backend, mesh)?;
        self.entries.insert(mesh.name.clone(), baked);
        Ok(baked)
    }

    fn bake<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        mesh: &Arc<MeshGeometry>,
    ) -> VoxelizerResult<VoxelizedMesh> {
        let resolution = self.mesh_resolution(&mesh.local_aabb);
        let mut voxelizer = GeometryVoxelizer::new(
            backend,
            VoxelizerConfig {
                resolution,
                ..self.bake_config.clone()
            },
        )?;

        let instance = SceneInstance {
            id: InstanceId(0),
            mesh: Arc::clone(mesh),
            world_aabb: mesh.local_aabb,
            local_aabb: mesh.local_aabb,
            transform: InstanceTransform::default(),
        };
        if !voxelizer.add_instance(instance, false, 0)? {
            return Err(VoxelizerError::StateError {
                expected: "indexed submeshes".to_string(),
                actual: format!("mesh '{}' has a submesh without indices", mesh.name),
            });
        }
        voxelizer.auto_calculate_region();
        voxelizer.divide_octants(1, 1, 1);
        voxelizer.build_baked(backend)?;

        let source = voxelizer
            .volumes()
            .current()
            .ok_or_voxelizer(|| VoxelizerError::StateError {
                expected: "baked volumes".to_string(),
                actual: "none".to_string(),
            })?;

        let full = TextureCopyRegion {
            src_origin: [0; 3],
            dst_origin: [0; 3],
            extent: resolution,
        };
        let sampled = |name: &str, format: TextureFormat| TextureDesc {
            label: format!("VctImage/{}/{}", mesh.name, name),
            resolution,
            format,
            usage: TextureUsages::TEXTURE_BINDING
                | TextureUsages::COPY_DST
                | TextureUsages::RENDER_ATTACHMENT,
            mip_level_count: max_mip_count(resolution),
            reinterpretable: false,
        };

        let albedo = backend.create_texture_3d(&sampled("Albedo", ALBEDO_FORMAT))?;
        copy_with_barriers(backend, source.albedo, albedo, &full);
        backend.generate_mipmaps(albedo);

        let normal = backend.create_texture_3d(&sampled("Normal", NORMAL_FORMAT))?;
        copy_with_barriers(backend, source.normal, normal, &full);
        backend.generate_mipmaps(normal);

        let emissive = if has_emissive(mesh) {
            let emissive = backend.create_texture_3d(&sampled("Emissive", EMISSIVE_FORMAT))?;
            copy_with_barriers(backend, source.emissive, emissive, &full);
            backend.generate_mipmaps(emissive);
            emissive
        } else {
            self.ensure_blank_emissive(backend)?
        };

        voxelizer.destroy(backend);
        log::info!(
            "[MeshTextureCache] baked '{}' at {:?}",
            mesh.name,
            resolution
        );

        Ok(VoxelizedMesh {
            hash: mesh.content_hash,
            albedo,
            normal,
            emissive,
            resolution,
        })
    }

    pub fn destroy<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        for entry in self.entries.values() {
            self.destroy_entry(backend, entry);
        }
        self.entries.clear();
        if let Some(blank) = self.blank_emissive.take() {
            backend.destroy_texture(blank);
        }
    }
}
