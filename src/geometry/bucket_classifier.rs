//! Material bucket classification for the geometry voxelizer
//!
//! Instances are grouped by the traits that pick a kernel variant plus the
//! buffers the kernel binds, so one bucket is one set of bindings.

use super::buffer_packer::GeometryBufferPacker;
use crate::constants::{variant_bits, MATERIALS_PER_CONST_BUFFER};
use crate::error::VoxelizerResult;
use crate::gpu::{
    ensure_buffer_exact, release_buffer, AllocatedBuffer, BufferHandle, GpuBackend,
    TextureHandle,
};
use crate::scene::{MaterialDescriptor, SceneInstance};
use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;
use static_assertions::const_assert_eq;
use std::collections::BTreeMap;
use wgpu::BufferUsages;

/// Kernel variant selector, one bit per trait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey(pub u32);

impl VariantKey {
    pub fn new(index_32bit: bool, compressed: bool, has_diffuse: bool, has_emissive: bool) -> Self {
        let mut bits = 0;
        if index_32bit {
            bits |= variant_bits::INDEX_32BIT;
        }
        if compressed {
            bits |= variant_bits::COMPRESSED_VERTEX;
        }
        if has_diffuse {
            bits |= variant_bits::HAS_DIFFUSE_TEX;
        }
        if has_emissive {
            bits |= variant_bits::HAS_EMISSIVE_TEX;
        }
        Self(bits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub variant: VariantKey,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    /// Material constant buffer the instances index into
    pub material_slot: u32,
    pub needs_texture_pool: bool,
}

/// One submesh partition of one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedInstance {
    /// Position in the scene registry
    pub instance_idx: usize,
    pub vertex_start: u32,
    pub index_start: u32,
    pub index_count: u32,
    pub partition_idx: u32,
    /// Index inside the bucket's material buffer
    pub material_idx: u32,
    /// The submesh spans several partitions so its world AABB must be refreshed
    pub needs_aabb_update: bool,
    pub adjusted_start: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoxelizerBucket {
    pub key: BucketKey,
    pub instances: Vec<QueuedInstance>,
}

/// Material as read by the voxelizer kernels
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub diffuse: [f32; 4],
    pub emissive: [f32; 3],
    /// Texture pool indices, diffuse in the low 16 bits, emissive in the high
    pub texture_indices: u32,
}

const_assert_eq!(std::mem::size_of::<GpuMaterial>(), 32);

pub const NO_POOL_TEXTURE: u32 = 0xFFFF;

type MaterialKey = ([u32; 4], [u32; 3], Option<TextureHandle>, Option<TextureHandle>);

fn material_key(material: &MaterialDescriptor) -> MaterialKey {
    (
        material.diffuse.map(f32::to_bits),
        material.emissive.map(f32::to_bits),
        material.diffuse_texture,
        material.emissive_texture,
    )
}

/// Unique materials of the current build, split into constant buffers
#[derive(Debug, Default)]
pub struct MaterialTable {
    lookup: FxHashMap<MaterialKey, u32>,
    materials: Vec<GpuMaterial>,
    texture_pool: Vec<TextureHandle>,
    texture_lookup: FxHashMap<TextureHandle, u32>,
    buffers: Vec<Option<AllocatedBuffer>>,
}

impl MaterialTable {
    pub fn clear(&mut self) {
        self.lookup.clear();
        self.materials.clear();
        self.texture_pool.clear();
        self.texture_lookup.clear();
    }

    fn pool_index(&mut self, texture: Option<TextureHandle>) -> u32 {
        let Some(texture) = texture else {
            return NO_POOL_TEXTURE;
        };
        let pool = &mut self.texture_pool;
        *self.texture_lookup.entry(texture).or_insert_with(|| {
            pool.push(texture);
            pool.len() as u32 - 1
        })
    }

    /// Global index of `material`, adding it on first sight
    pub fn add(&mut self, material: &MaterialDescriptor) -> u32 {
        let key = material_key(material);
        if let Some(&idx) = self.lookup.get(&key) {
            return idx;
        }

        let diffuse_idx = self.pool_index(material.diffuse_texture);
        let emissive_idx = self.pool_index(material.emissive_texture);
        let idx = self.materials.len() as u32;
        self.materials.push(GpuMaterial {
            diffuse: material.diffuse,
            emissive: material.emissive,
            texture_indices: (diffuse_idx & 0xFFFF) | (emissive_idx << 16),
        });
        self.lookup.insert(key, idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn texture_pool(&self) -> &[TextureHandle] {
        &self.texture_pool
    }

    pub fn buffer(&self, slot: u32) -> Option<BufferHandle> {
        self.buffers
            .get(slot as usize)
            .and_then(|b| b.as_ref())
            .map(|b| b.handle)
    }

    /// Upload every constant buffer, resizing only those whose count changed
    pub fn upload<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> VoxelizerResult<()> {
        let chunks: Vec<&[GpuMaterial]> = self.materials.chunks(MATERIALS_PER_CONST_BUFFER).collect();

        while self.buffers.len() > chunks.len() {
            if let Some(mut slot) = self.buffers.pop() {
                release_buffer(backend, &mut slot);
            }
        }
        self.buffers.resize(chunks.len(), None);

        for (slot, chunk) in self.buffers.iter_mut().zip(chunks) {
            if let Some(handle) = ensure_buffer_exact(
                backend,
                slot,
                "VctVoxelizer/Materials",
                chunk.len() as u32,
                std::mem::size_of::<GpuMaterial>() as u32,
                BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            )? {
                backend.upload_buffer(handle, 0, bytemuck::cast_slice(chunk));
            }
        }
        Ok(())
    }

    pub fn destroy<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        for slot in self.buffers.iter_mut() {
            release_buffer(backend, slot);
        }
        self.buffers.clear();
        self.clear();
    }
}

/// Group every packed submesh partition of `instances` into buckets
///
/// Instances whose mesh is not packed (rejected at registration) are skipped.
/// Buckets come out in key order; instances keep registration order inside
/// each bucket.
pub fn classify_instances(
    instances: &[SceneInstance],
    packer: &GeometryBufferPacker,
    materials: &mut MaterialTable,
) -> Vec<VoxelizerBucket> {
    materials.clear();
    let mut buckets: BTreeMap<BucketKey, Vec<QueuedInstance>> = BTreeMap::new();

    for (instance_idx, instance) in instances.iter().enumerate() {
        let Some(queued) = packer.queued_mesh(instance.mesh.id) else {
            continue;
        };
        let Some(vertex_buffer) = packer.vertex_buffer(queued.compressed) else {
            continue;
        };

        for (partitioned, submesh) in queued.submeshes.iter().zip(&instance.mesh.submeshes) {
            let Some(index_buffer) = packer.index_buffer(partitioned.index_32bit) else {
                continue;
            };
            let material = &submesh.material;
            let material_idx = materials.add(material);
            let has_diffuse = material.diffuse_texture.is_some();
            let has_emissive = material.emissive_texture.is_some();

            let key = BucketKey {
                variant: VariantKey::new(
                    partitioned.index_32bit,
                    queued.compressed,
                    has_diffuse,
                    has_emissive,
                ),
                vertex_buffer,
                index_buffer,
                material_slot: material_idx / MATERIALS_PER_CONST_BUFFER as u32,
                needs_texture_pool: has_diffuse || has_emissive,
            };

            let needs_aabb_update = partitioned.partitions.len() > 1;
            let bucket = buckets.entry(key).or_default();
            for partition in &partitioned.partitions {
                bucket.push(QueuedInstance {
                    instance_idx,
                    vertex_start: partition.vertex_start,
                    index_start: partition.index_start,
                    index_count: partition.index_count,
                    partition_idx: partition.partition_idx,
                    material_idx: material_idx % MATERIALS_PER_CONST_BUFFER as u32,
                    needs_aabb_update,
                    adjusted_start: partition.adjusted_start,
                });
            }
        }
    }

    log::debug!("[MaterialBucketClassifier] {} buckets", buckets.len());
    buckets
        .into_iter()
        .map(|(key, instances)| VoxelizerBucket { key, instances })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{instance_of, mesh_with_indices16, mesh_with_indices32, textured_mesh, RecordingBackend};

    #[test]
    fn test_variant_bits() {
        assert_eq!(VariantKey::new(false, false, false, false).0, 0);
        assert_eq!(VariantKey::new(true, false, false, false).0, 1);
        assert_eq!(VariantKey::new(false, true, false, false).0, 2);
        assert_eq!(VariantKey::new(true, true, true, true).0, 15);
    }

    #[test]
    fn test_instances_sharing_traits_share_bucket() {
        let mut backend = RecordingBackend::new();
        let mut packer = GeometryBufferPacker::new(&backend, 6144).unwrap();
        let plain16 = mesh_with_indices16(1, 6);
        let plain32 = mesh_with_indices32(2, 6);
        let textured = textured_mesh(3, 6, TextureHandle(500), None);

        let instances = vec![
            instance_of(1, &plain16, [0.0; 3], 1.0),
            instance_of(2, &plain32, [0.0; 3], 1.0),
            instance_of(3, &plain16, [4.0; 3], 1.0),
            instance_of(4, &textured, [8.0; 3], 1.0),
        ];
        for instance in &instances {
            packer.register_mesh(&instance.mesh, false, 0);
        }
        packer.build_buffers(&mut backend).unwrap();

        let mut materials = MaterialTable::default();
        let buckets = classify_instances(&instances, &packer, &mut materials);

        assert_eq!(buckets.len(), 3);
        let total: usize = buckets.iter().map(|b| b.instances.len()).sum();
        assert_eq!(total, 4);

        let plain = buckets.iter().find(|b| b.key.variant.0 == 0).unwrap();
        let order: Vec<usize> = plain.instances.iter().map(|q| q.instance_idx).collect();
        assert_eq!(order, vec![0, 2]);

        let tex = buckets
            .iter()
            .find(|b| b.key.variant.0 & variant_bits::HAS_DIFFUSE_TEX != 0)
            .unwrap();
        assert!(tex.key.needs_texture_pool);
        assert_eq!(materials.texture_pool(), &[TextureHandle(500)]);
        assert_eq!(materials.len(), 2);
    }

    #[test]
    fn test_multi_partition_submesh_needs_aabb_update() {
        let mut backend = RecordingBackend::new();
        let mut packer = GeometryBufferPacker::new(&backend, 6144).unwrap();
        let mesh = mesh_with_indices32(1, 12);
        let instances = vec![instance_of(1, &mesh, [0.0; 3], 1.0)];
        packer.register_mesh(&mesh, false, 6);
        packer.build_buffers(&mut backend).unwrap();

        let mut materials = MaterialTable::default();
        let buckets = classify_instances(&instances, &packer, &mut materials);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].instances.len(), 2);
        assert!(buckets[0].instances.iter().all(|q| q.needs_aabb_update));
        assert_eq!(buckets[0].instances[1].index_start, 6);
    }

    #[test]
    fn test_material_upload_reuses_buffers() {
        let mut backend = RecordingBackend::new();
        let mut table = MaterialTable::default();
        table.add(&MaterialDescriptor::default());
        table.upload(&mut backend).unwrap();
        table.upload(&mut backend).unwrap();
        assert_eq!(backend.buffers_created(), 1);
        assert!(table.buffer(0).is_some());
        assert!(table.buffer(1).is_none());
    }
}
