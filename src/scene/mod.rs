/// Scene-facing types
///
/// Meshes and instances are owned by the host; voxelizers keep `Arc` handles.
pub mod scene_data;
pub mod scene_operations;

pub use scene_data::{
    IndexData, InstanceId, MaterialDescriptor, MeshGeometry, MeshId, SceneInstance,
    SourceVertex, SubMeshGeometry,
};
pub use scene_operations::{
    add_instance, merged_world_aabb, remove_all_instances, remove_instance,
    sort_by_mesh_if_dirty, SceneRegistry,
};
