//! Scene Data - Pure DOP
//!
//! Meshes and instances handed to the voxelizers by the host scene.

use crate::gpu::TextureHandle;
use crate::math::{Aabb, InstanceTransform};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u64);

/// Vertex as read back from the source mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexData {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

/// Material inputs the voxelizers care about
///
/// Textures are host-owned and already resident.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialDescriptor {
    pub diffuse: [f32; 4],
    pub emissive: [f32; 3],
    pub diffuse_texture: Option<TextureHandle>,
    pub emissive_texture: Option<TextureHandle>,
}

impl Default for MaterialDescriptor {
    fn default() -> Self {
        Self {
            diffuse: [1.0, 1.0, 1.0, 1.0],
            emissive: [0.0, 0.0, 0.0],
            diffuse_texture: None,
            emissive_texture: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubMeshGeometry {
    pub vertices: Vec<SourceVertex>,
    /// Meshes with a submesh lacking indices cannot be voxelized
    pub indices: Option<IndexData>,
    pub material: MaterialDescriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshGeometry {
    pub id: MeshId,
    pub name: String,
    /// Content hash used to detect stale cache entries, `None` when unknown
    pub content_hash: Option<[u64; 2]>,
    pub local_aabb: Aabb,
    pub submeshes: Vec<SubMeshGeometry>,
}

/// Placed mesh as seen by the voxelizers
#[derive(Debug, Clone)]
pub struct SceneInstance {
    pub id: InstanceId,
    pub mesh: Arc<MeshGeometry>,
    pub world_aabb: Aabb,
    pub local_aabb: Aabb,
    pub transform: InstanceTransform,
}
