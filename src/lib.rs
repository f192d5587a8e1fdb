// Hearth VCT - scene voxelization for voxel cone tracing
//
// Data-oriented layout: `*_data` modules hold plain data, `*_operations`
// modules hold the pure functions that transform it. GPU work goes through
// the collaborator traits in `gpu`, the host renderer implements them.
//
// Pipelines:
// - dispatch::GeometryVoxelizer rasterizes packed triangle data
// - dispatch::ImageVoxelizer samples per-mesh baked volumes

// Constants module
pub mod constants;

// Core modules
pub mod error;
pub mod math;

// Voxelization building blocks
pub mod geometry;
pub mod gpu;
pub mod instance_stream;
pub mod region;
pub mod scene;
pub mod texture_space;

// Orchestration
pub mod dispatch;

#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};

pub use dispatch::{
    GeometryVoxelizer, ImageVoxelizer, SlidingWindow, SlidingWindowSettings, VoxelVolumes,
    WindowUpdate,
};
pub use error::{ErrorContext, OptionExt, VoxelizerError, VoxelizerResult};
pub use gpu::{GpuBackend, GpuCapabilities};
pub use math::Aabb;
pub use region::{Octant, VoxelRegion};
pub use scene::{InstanceId, MeshGeometry, MeshId, SceneInstance};

// Re-export wgpu for hosts implementing the collaborator traits
pub use wgpu;

/// Voxelizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelizerConfig {
    /// Scene volume resolution in voxels
    pub resolution: [u32; 3],
    /// Octants per axis for full builds
    pub octant_subdivision: [u32; 3],
    /// Submesh index count above which it is split into partitions
    pub default_index_count_split: u32,
    /// Per-dispatch texture budgets, the largest that fits is used
    pub texture_slot_table: Vec<u32>,
    /// Texture slots kept for non-mesh bindings
    pub reserved_texture_slots: u32,
    pub needs_albedo_mipmaps: bool,
    /// Mipmap normal and emissive too
    pub needs_all_mipmaps: bool,
}

impl Default for VoxelizerConfig {
    fn default() -> Self {
        Self {
            resolution: [128, 128, 128],
            octant_subdivision: [1, 1, 1],
            default_index_count_split: constants::DEFAULT_INDEX_COUNT_SPLIT,
            texture_slot_table: constants::slots::DEFAULT_SLOT_TABLE.to_vec(),
            reserved_texture_slots: constants::slots::RESERVED_TEX_SLOTS,
            needs_albedo_mipmaps: true,
            needs_all_mipmaps: false,
        }
    }
}

fn invalid_config(field: &str, value: impl std::fmt::Debug, reason: &str) -> VoxelizerError {
    VoxelizerError::InvalidConfig {
        field: field.to_string(),
        value: format!("{:?}", value),
        reason: reason.to_string(),
    }
}

impl VoxelizerConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> VoxelizerResult<()> {
        if self.resolution.contains(&0) {
            return Err(invalid_config(
                "resolution",
                self.resolution,
                "every axis must be non-zero",
            ));
        }

        if self.octant_subdivision.contains(&0) {
            return Err(invalid_config(
                "octant_subdivision",
                self.octant_subdivision,
                "every axis must be non-zero",
            ));
        }

        if (0..3).any(|i| self.resolution[i] % self.octant_subdivision[i] != 0) {
            return Err(invalid_config(
                "octant_subdivision",
                self.octant_subdivision,
                "resolution must be divisible by the subdivision",
            ));
        }

        if self.default_index_count_split < 3 {
            return Err(invalid_config(
                "default_index_count_split",
                self.default_index_count_split,
                "must hold at least one triangle",
            ));
        }

        if self.texture_slot_table.is_empty() || self.texture_slot_table.contains(&0) {
            return Err(invalid_config(
                "texture_slot_table",
                &self.texture_slot_table,
                "must be non-empty with non-zero entries",
            ));
        }

        log::info!(
            "[VoxelizerConfig] Validated: resolution {:?}, subdivision {:?}, split {}",
            self.resolution,
            self.octant_subdivision,
            self.default_index_count_split
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(VoxelizerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_indivisible_subdivision_rejected() {
        let config = VoxelizerConfig {
            resolution: [64, 64, 60],
            octant_subdivision: [2, 2, 8],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VoxelizerError::InvalidConfig { field, .. }) if field == "octant_subdivision"
        ));
    }

    #[test]
    fn test_degenerate_values_rejected() {
        let zero_res = VoxelizerConfig {
            resolution: [0, 64, 64],
            ..Default::default()
        };
        assert!(zero_res.validate().is_err());

        let tiny_split = VoxelizerConfig {
            default_index_count_split: 2,
            ..Default::default()
        };
        assert!(tiny_split.validate().is_err());

        let empty_table = VoxelizerConfig {
            texture_slot_table: Vec::new(),
            ..Default::default()
        };
        assert!(empty_table.validate().is_err());
    }

    #[test]
    fn test_config_serde_shape() {
        let config = VoxelizerConfig::default();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["resolution"], serde_json::json!([128, 128, 128]));
        assert_eq!(value["texture_slot_table"], serde_json::json!([30, 15, 12, 9]));
    }
}
