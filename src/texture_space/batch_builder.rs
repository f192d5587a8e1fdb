//! Texture-space batch builder
//!
//! Every mesh binds three baked volumes (albedo, normal, emissive). A batch
//! is the set of meshes whose textures fit in the units one dispatch can bind.

use crate::constants::slots;
use crate::gpu::{GpuCapabilities, TextureHandle};
use crate::scene::MeshId;

/// Texture units available to mesh volumes in one dispatch, multiple of 3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSlotBudget(pub u32);

impl TextureSlotBudget {
    /// Resolve the budget once from the device
    ///
    /// The raw unit count minus reserved slots is discretized down to the
    /// largest table entry that fits. When none fits, the raw count rounded
    /// down to whole meshes is used.
    pub fn from_capabilities(caps: &GpuCapabilities, table: &[u32], reserved_slots: u32) -> Self {
        let slot_start = if caps.read_only_buffer_is_tex_buffer {
            slots::TEX_BUFFER_SLOT_START
        } else {
            0
        };
        let available = caps
            .texture_units
            .min(slots::MAX_TEXTURE_UNITS)
            .saturating_sub(reserved_slots + slot_start);

        let per_mesh = slots::TEXTURES_PER_MESH;
        let budget = match table.iter().copied().filter(|&entry| entry <= available).max() {
            Some(entry) => entry - entry % per_mesh,
            None => {
                let fallback = (available - available % per_mesh).max(per_mesh);
                log::warn!(
                    "[TextureSlotBudget] only {} texture units available, below every table entry; using {}",
                    available,
                    fallback
                );
                fallback
            }
        };

        log::debug!(
            "[TextureSlotBudget] {} units, {} available, budget {}",
            caps.texture_units,
            available,
            budget
        );
        Self(budget.max(per_mesh))
    }

    pub fn meshes_per_batch(&self) -> u32 {
        self.0 / slots::TEXTURES_PER_MESH
    }
}

/// Meshes sharing one set of texture bindings
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    /// Albedo, normal, emissive per mesh, in mesh order
    pub textures: Vec<TextureHandle>,
    pub meshes: Vec<MeshId>,
}

/// Where a mesh landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSlot {
    pub batch: usize,
    /// Binding index of the mesh's albedo inside the batch
    pub texture_idx: u32,
    /// The mesh opened a new batch
    pub new_batch: bool,
}

#[derive(Debug)]
pub struct BatchBuilder {
    budget: TextureSlotBudget,
    batches: Vec<Batch>,
}

impl BatchBuilder {
    pub fn new(budget: TextureSlotBudget) -> Self {
        Self {
            budget,
            batches: Vec::new(),
        }
    }

    pub fn budget(&self) -> TextureSlotBudget {
        self.budget
    }

    pub fn reset(&mut self) {
        self.batches.clear();
    }

    /// Append one mesh, opening a new batch when its textures do not fit
    pub fn push_mesh(&mut self, mesh: MeshId, textures: [TextureHandle; 3]) -> BatchSlot {
        let fits = self
            .batches
            .last()
            .is_some_and(|batch| batch.textures.len() as u32 + slots::TEXTURES_PER_MESH <= self.budget.0);

        if !fits {
            self.batches.push(Batch::default());
        }

        let batch_idx = self.batches.len() - 1;
        let batch = &mut self.batches[batch_idx];
        let texture_idx = batch.textures.len() as u32;
        batch.textures.extend_from_slice(&textures);
        batch.meshes.push(mesh);

        BatchSlot {
            batch: batch_idx,
            texture_idx,
            new_batch: !fits,
        }
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Texture units the widest batch binds
    pub fn max_textures_bound(&self) -> u32 {
        self.batches
            .iter()
            .map(|batch| batch.textures.len() as u32)
            .max()
            .unwrap_or(0)
    }
}
