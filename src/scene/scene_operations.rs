//! Scene Registry Operations - Pure DOP Functions
//!
//! Instance bookkeeping shared by both voxelizers.

use super::scene_data::{InstanceId, SceneInstance};
use crate::error::{VoxelizerError, VoxelizerResult};
use crate::math::{aabb_merge, Aabb};
use rustc_hash::FxHashMap;

/// Instances registered with one voxelizer, in dispatch order
#[derive(Debug, Default)]
pub struct SceneRegistry {
    pub instances: Vec<SceneInstance>,
    pub lookup: FxHashMap<InstanceId, usize>,
    /// Set when instances of one mesh may no longer be contiguous
    pub order_dirty: bool,
}

fn rebuild_lookup(registry: &mut SceneRegistry) {
    registry.lookup.clear();
    for (idx, instance) in registry.instances.iter().enumerate() {
        registry.lookup.insert(instance.id, idx);
    }
}

pub fn add_instance(registry: &mut SceneRegistry, instance: SceneInstance) -> VoxelizerResult<()> {
    if registry.lookup.contains_key(&instance.id) {
        return Err(VoxelizerError::DuplicateInstance { id: instance.id.0 });
    }

    if let Some(last) = registry.instances.last() {
        if last.mesh.id != instance.mesh.id {
            registry.order_dirty = true;
        }
    }

    registry.lookup.insert(instance.id, registry.instances.len());
    registry.instances.push(instance);
    Ok(())
}

/// Remove one instance, keeping the order unless it is already dirty
pub fn remove_instance(
    registry: &mut SceneRegistry,
    id: InstanceId,
) -> VoxelizerResult<SceneInstance> {
    let idx = registry
        .lookup
        .remove(&id)
        .ok_or(VoxelizerError::InstanceNotFound { id: id.0 })?;

    let removed = if registry.order_dirty {
        let removed = registry.instances.swap_remove(idx);
        if let Some(moved) = registry.instances.get(idx) {
            registry.lookup.insert(moved.id, idx);
        }
        removed
    } else {
        let removed = registry.instances.remove(idx);
        rebuild_lookup(registry);
        removed
    };

    Ok(removed)
}

pub fn remove_all_instances(registry: &mut SceneRegistry) {
    registry.instances.clear();
    registry.lookup.clear();
    registry.order_dirty = false;
}

/// Group instances by mesh so each mesh occupies one contiguous run
pub fn sort_by_mesh_if_dirty(registry: &mut SceneRegistry) {
    if !registry.order_dirty {
        return;
    }
    registry.instances.sort_by_key(|instance| instance.mesh.id);
    rebuild_lookup(registry);
    registry.order_dirty = false;
}

/// Union of all instance world boxes, `Aabb::NULL` when empty
pub fn merged_world_aabb(registry: &SceneRegistry) -> Aabb {
    registry
        .instances
        .iter()
        .fold(Aabb::NULL, |acc, instance| aabb_merge(&acc, &instance.world_aabb))
}
