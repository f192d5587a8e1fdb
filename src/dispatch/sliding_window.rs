//! Camera-centred sliding window
//!
//! Keeps a voxel region centred on the camera, snapped to whole cells, and
//! reports when and by how many cells it has to move. Several windows of
//! growing cell size form cascades.

use crate::error::{VoxelizerError, VoxelizerResult};
use crate::math::{aabb_from_center_half_extents, Aabb};
use cgmath::{Point3, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlidingWindowSettings {
    pub resolution: [u32; 3],
    /// Half extent of the region around the camera
    pub area_half_size: [f32; 3],
    /// Octants used when the window needs a full rebuild
    pub octant_subdivision: [u32; 3],
    /// Cells the camera may travel before the window follows, at least 1
    pub camera_step_size: [f32; 3],
}

impl Default for SlidingWindowSettings {
    fn default() -> Self {
        Self {
            resolution: [16, 16, 16],
            area_half_size: [16.0, 16.0, 16.0],
            octant_subdivision: [1, 1, 1],
            camera_step_size: [1.0, 1.0, 1.0],
        }
    }
}

impl SlidingWindowSettings {
    /// Derived from the settings rather than the region so every cascade
    /// sees the same value
    pub fn voxel_cell_size(&self) -> Vector3<f32> {
        Vector3::new(
            2.0 * self.area_half_size[0] / self.resolution[0] as f32,
            2.0 * self.area_half_size[1] / self.resolution[1] as f32,
            2.0 * self.area_half_size[2] / self.resolution[2] as f32,
        )
    }

    pub fn validate(&self) -> VoxelizerResult<()> {
        let invalid = |field: &str, value: String, reason: &str| VoxelizerError::InvalidConfig {
            field: field.to_string(),
            value,
            reason: reason.to_string(),
        };

        if self.resolution.contains(&0) {
            return Err(invalid(
                "resolution",
                format!("{:?}", self.resolution),
                "every axis must be non-zero",
            ));
        }
        if self.area_half_size.iter().any(|&h| h <= 0.0) {
            return Err(invalid(
                "area_half_size",
                format!("{:?}", self.area_half_size),
                "every axis must be positive",
            ));
        }
        if (0..3).any(|i| self.octant_subdivision[i] == 0 || self.resolution[i] % self.octant_subdivision[i] != 0) {
            return Err(invalid(
                "octant_subdivision",
                format!("{:?}", self.octant_subdivision),
                "resolution must be divisible by the subdivision",
            ));
        }
        if self.camera_step_size.iter().any(|&s| s < 1.0) {
            return Err(invalid(
                "camera_step_size",
                format!("{:?}", self.camera_step_size),
                "must be at least one cell",
            ));
        }
        Ok(())
    }
}

/// Cell containing `position`
pub fn quantize_position(position: Point3<f32>, cell_size: Vector3<f32>) -> [i32; 3] {
    [
        (position.x / cell_size.x).floor() as i32,
        (position.y / cell_size.y).floor() as i32,
        (position.z / cell_size.z).floor() as i32,
    ]
}

pub fn quantized_to_world(cell: [i32; 3], cell_size: Vector3<f32>) -> Point3<f32> {
    Point3::new(
        cell[0] as f32 * cell_size.x,
        cell[1] as f32 * cell_size.y,
        cell[2] as f32 * cell_size.z,
    )
}

/// A window move to apply to a voxelizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowUpdate {
    pub region: Aabb,
    /// Cells moved since the last update, positive towards +axis
    pub diff: [i32; 3],
    pub octant_subdivision: [u32; 3],
    /// Previous contents must not be reused
    pub full_rebuild: bool,
}

#[derive(Debug, Clone)]
pub struct SlidingWindow {
    settings: SlidingWindowSettings,
    last_camera_position: Point3<f32>,
    first_build: bool,
    consistent_steps: bool,
}

impl SlidingWindow {
    pub fn new(settings: SlidingWindowSettings) -> VoxelizerResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            last_camera_position: Point3::new(0.0, 0.0, 0.0),
            first_build: true,
            consistent_steps: false,
        })
    }

    pub fn settings(&self) -> &SlidingWindowSettings {
        &self.settings
    }

    pub fn last_camera_position(&self) -> Point3<f32> {
        self.last_camera_position
    }

    /// Quantize in steps of `cell * camera_step_size` instead of measuring
    /// travelled cells
    ///
    /// Turning it on forces the next update to be a full rebuild.
    pub fn set_consistent_steps(&mut self, consistent_steps: bool) {
        self.consistent_steps = consistent_steps;
        if consistent_steps {
            self.first_build = true;
        }
    }

    pub fn consistent_steps(&self) -> bool {
        self.consistent_steps
    }

    /// Next update is a full rebuild, e.g. after instances changed
    pub fn force_full_rebuild(&mut self) {
        self.first_build = true;
    }

    /// Region centred on the cell containing `camera`
    pub fn region_around(&self, camera: Point3<f32>) -> Aabb {
        let cell_size = self.settings.voxel_cell_size();
        aabb_from_center_half_extents(
            quantized_to_world(quantize_position(camera, cell_size), cell_size),
            Vector3::from(self.settings.area_half_size),
        )
    }

    pub fn needs_rebuild(&self, camera: Point3<f32>) -> bool {
        let cell_size = self.settings.voxel_cell_size();
        let step = Vector3::from(self.settings.camera_step_size);

        if self.consistent_steps {
            let step_size = Vector3::new(
                cell_size.x * step.x,
                cell_size.y * step.y,
                cell_size.z * step.z,
            );
            quantize_position(camera, step_size)
                != quantize_position(self.last_camera_position, step_size)
        } else {
            let new_cell = quantize_position(camera, cell_size);
            let old_cell = quantize_position(self.last_camera_position, cell_size);
            (0..3).any(|i| (new_cell[i] - old_cell[i]).abs() as f32 >= step[i])
        }
    }

    /// Move the window if the camera went far enough, or on the first call
    pub fn update(&mut self, camera: Point3<f32>) -> Option<WindowUpdate> {
        let full_rebuild = self.first_build;
        if !full_rebuild && !self.needs_rebuild(camera) {
            return None;
        }

        let cell_size = self.settings.voxel_cell_size();
        let new_cell = quantize_position(camera, cell_size);
        let old_cell = quantize_position(self.last_camera_position, cell_size);
        let update = WindowUpdate {
            region: self.region_around(camera),
            diff: [
                new_cell[0] - old_cell[0],
                new_cell[1] - old_cell[1],
                new_cell[2] - old_cell[2],
            ],
            octant_subdivision: self.settings.octant_subdivision,
            full_rebuild,
        };

        log::debug!(
            "[SlidingWindow] moved {:?} cells (full rebuild: {})",
            update.diff,
            full_rebuild
        );
        self.last_camera_position = camera;
        self.first_build = false;
        Some(update)
    }
}

/// Derive every window's step from the last (coarsest) one
///
/// The last window gets `step_size`; finer windows scale it by their cell
/// ratio so all windows move together, rounded up to whole cells and capped
/// at half their resolution.
pub fn auto_calculate_step_sizes(windows: &mut [SlidingWindowSettings], step_size: [f32; 3]) {
    let Some(last) = windows.last_mut() else {
        return;
    };
    last.camera_step_size = step_size;
    let last_cell_size = last.voxel_cell_size();

    let num_finer = windows.len() - 1;
    for window in &mut windows[..num_finer] {
        let cell_size = window.voxel_cell_size();
        let factor = [
            last_cell_size.x / cell_size.x,
            last_cell_size.y / cell_size.y,
            last_cell_size.z / cell_size.z,
        ];
        for axis in 0..3 {
            let step = (step_size[axis] * factor[axis]).ceil().max(1.0);
            window.camera_step_size[axis] = step.min(window.resolution[axis] as f32 * 0.5);
        }
    }
}
