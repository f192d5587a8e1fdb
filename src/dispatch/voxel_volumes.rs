//! Voxel volumes
//!
//! Owns the colour ring and the coverage accumulation volume of one
//! voxelizer, and every clear/copy/finalize step applied to them.

use super::texture_ring::{ColourVolumes, TextureRing};
use crate::constants::{params, threads, NORMAL_CLEAR_VALUE};
use crate::error::VoxelizerResult;
use crate::gpu::{
    clear_float_with_barrier, clear_uint_with_barrier, copy_with_barriers,
    dispatch_with_barriers, thread_groups_rounded_up, GpuBackend, KernelBindings, KernelHandle,
    ParamValue, Residency, ResourceAccess, TextureDesc, TextureHandle,
};
use crate::region::{Octant, TextureCopyRegion};
use wgpu::{TextureFormat, TextureUsages};

pub const ALBEDO_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
pub const NORMAL_FORMAT: TextureFormat = TextureFormat::Rgb10a2Unorm;
pub const EMISSIVE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Full mip chain length for a 3D resolution
pub fn max_mip_count(resolution: [u32; 3]) -> u32 {
    let largest = resolution.iter().copied().max().unwrap_or(1).max(1);
    32 - largest.leading_zeros()
}

/// Accumulation format and resolution for the device
///
/// Without typed UAV loads two 16-bit counters share one 32-bit texel.
pub fn accumulation_layout(resolution: [u32; 3], typed_uav_loads: bool) -> (TextureFormat, [u32; 3]) {
    if typed_uav_loads {
        (TextureFormat::R16Uint, resolution)
    } else {
        (
            TextureFormat::R32Uint,
            [(resolution[0] >> 1).max(1), resolution[1], resolution[2]],
        )
    }
}

#[derive(Debug)]
pub struct VoxelVolumes {
    label: String,
    resolution: [u32; 3],
    typed_uav_loads: bool,
    needs_albedo_mipmaps: bool,
    needs_all_mipmaps: bool,
    ring: TextureRing,
    accumulation: Option<TextureHandle>,
}

impl VoxelVolumes {
    pub fn new(
        label: &str,
        resolution: [u32; 3],
        typed_uav_loads: bool,
        needs_albedo_mipmaps: bool,
        needs_all_mipmaps: bool,
    ) -> Self {
        Self {
            label: label.to_string(),
            resolution,
            typed_uav_loads,
            needs_albedo_mipmaps,
            needs_all_mipmaps,
            ring: TextureRing::default(),
            accumulation: None,
        }
    }

    pub fn resolution(&self) -> [u32; 3] {
        self.resolution
    }

    pub fn current(&self) -> Option<ColourVolumes> {
        self.ring.current()
    }

    pub fn accumulation(&self) -> Option<TextureHandle> {
        self.accumulation
    }

    pub fn is_created(&self) -> bool {
        self.ring.current().is_some()
    }

    pub fn set_needs_all_mipmaps(&mut self, needs_all_mipmaps: bool) {
        self.needs_all_mipmaps = needs_all_mipmaps;
    }

    /// Destroy every volume and adopt `resolution` for the next creation
    pub fn set_resolution<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, resolution: [u32; 3]) {
        self.destroy(backend);
        self.resolution = resolution;
    }

    fn colour_desc(&self, name: &str, format: TextureFormat, mipmapped: bool) -> TextureDesc {
        let mut usage = TextureUsages::STORAGE_BINDING
            | TextureUsages::TEXTURE_BINDING
            | TextureUsages::COPY_SRC
            | TextureUsages::COPY_DST;
        if mipmapped {
            usage |= TextureUsages::RENDER_ATTACHMENT;
        }
        TextureDesc {
            label: format!("{}/{}", self.label, name),
            resolution: self.resolution,
            format,
            usage,
            mip_level_count: if mipmapped {
                max_mip_count(self.resolution)
            } else {
                1
            },
            reinterpretable: !self.typed_uav_loads,
        }
    }

    fn create_colour_set<B: GpuBackend + ?Sized>(
        &self,
        backend: &mut B,
        suffix: &str,
    ) -> VoxelizerResult<ColourVolumes> {
        let all = self.needs_all_mipmaps;
        Ok(ColourVolumes {
            albedo: backend.create_texture_3d(&self.colour_desc(
                &format!("Albedo{}", suffix),
                ALBEDO_FORMAT,
                self.needs_albedo_mipmaps || all,
            ))?,
            normal: backend.create_texture_3d(&self.colour_desc(
                &format!("Normal{}", suffix),
                NORMAL_FORMAT,
                all,
            ))?,
            emissive: backend.create_texture_3d(&self.colour_desc(
                &format!("Emissive{}", suffix),
                EMISSIVE_FORMAT,
                all,
            ))?,
        })
    }

    /// Create the current colour set and the accumulation volume
    ///
    /// When they already exist the accumulation volume is only made resident
    /// again, its contents are undefined until the next clear.
    pub fn ensure_created<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> VoxelizerResult<()> {
        if self.is_created() {
            if let Some(accumulation) = self.accumulation {
                backend.set_residency(accumulation, Residency::Resident);
            }
            return Ok(());
        }

        let colour = self.create_colour_set(backend, "")?;
        self.ring.set_current(colour);

        let (format, resolution) = accumulation_layout(self.resolution, self.typed_uav_loads);
        self.accumulation = Some(backend.create_texture_3d(&TextureDesc {
            label: format!("{}/AccumVal", self.label),
            resolution,
            format,
            usage: TextureUsages::STORAGE_BINDING,
            mip_level_count: 1,
            reinterpretable: false,
        })?);

        log::info!(
            "[VoxelVolumes] Created {} volumes at {:?} (accumulation {:?})",
            self.label,
            self.resolution,
            format
        );
        Ok(())
    }

    /// Create the second colour set used by incremental builds
    pub fn ensure_alternate_created<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> VoxelizerResult<()> {
        if self.ring.alternate().is_none() {
            let colour = self.create_colour_set(backend, "ALT")?;
            self.ring.set_alternate(colour);
        }
        Ok(())
    }

    /// Make the alternate set current and carry the overlap over from the previous one
    pub fn flip_and_copy<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        copy: Option<&TextureCopyRegion>,
    ) {
        self.ring.flip();
        let (Some(current), Some(previous)) = (self.ring.current(), self.ring.alternate()) else {
            return;
        };
        let Some(copy) = copy else {
            return;
        };
        for (src, dst) in previous.all().into_iter().zip(current.all()) {
            copy_with_barriers(backend, src, dst, copy);
        }
    }

    /// UAV bindings every voxelizer kernel shares
    pub fn bind_uavs(&self, bindings: KernelBindings) -> KernelBindings {
        let mut bindings = bindings;
        if let Some(colour) = self.ring.current() {
            bindings = bindings
                .with_uav(0, colour.albedo, ResourceAccess::ReadWrite)
                .with_uav(1, colour.normal, ResourceAccess::ReadWrite)
                .with_uav(2, colour.emissive, ResourceAccess::ReadWrite);
        }
        if let Some(accumulation) = self.accumulation {
            bindings = bindings.with_uav(3, accumulation, ResourceAccess::ReadWrite);
        }
        bindings
    }

    /// Clear every volume in full
    pub fn clear_full<B: GpuBackend + ?Sized>(&self, backend: &mut B) {
        if let Some(colour) = self.ring.current() {
            clear_float_with_barrier(backend, colour.albedo, [0.0; 4]);
            clear_float_with_barrier(backend, colour.emissive, [0.0; 4]);
            clear_float_with_barrier(backend, colour.normal, NORMAL_CLEAR_VALUE);
        }
        if let Some(accumulation) = self.accumulation {
            clear_uint_with_barrier(backend, accumulation, [0; 4]);
        }
    }

    /// Clear only the shell octants of the colour volumes
    ///
    /// The accumulation volume is cleared in full since it is not kept
    /// between builds.
    pub fn clear_shells<B: GpuBackend + ?Sized>(
        &self,
        backend: &mut B,
        partial_clear: KernelHandle,
        shells: &[Octant],
    ) {
        if let Some(colour) = self.ring.current() {
            for octant in shells {
                let Some(axis) = octant.diff_axis else {
                    continue;
                };
                let threads_per_group = threads::PARTIAL_CLEAR[axis as usize];
                backend.set_threads_per_group(partial_clear, threads_per_group);
                backend.set_param(
                    partial_clear,
                    params::START_OFFSET,
                    ParamValue::UInt3([octant.x, octant.y, octant.z]),
                );
                backend.set_param(
                    partial_clear,
                    params::PIXELS_TO_CLEAR,
                    ParamValue::UInt3([octant.width, octant.height, octant.depth]),
                );

                let bindings = KernelBindings::new(partial_clear)
                    .with_uav(0, colour.albedo, ResourceAccess::Write)
                    .with_uav(1, colour.emissive, ResourceAccess::Write)
                    .with_uav(2, colour.normal, ResourceAccess::Write);
                dispatch_with_barriers(
                    backend,
                    &bindings,
                    thread_groups_rounded_up(
                        [octant.width, octant.height, octant.depth],
                        threads_per_group,
                    ),
                );
            }
        }
        if let Some(accumulation) = self.accumulation {
            clear_uint_with_barrier(backend, accumulation, [0; 4]);
        }
    }

    /// Release the accumulation volume and regenerate mipmaps
    pub fn finalize<B: GpuBackend + ?Sized>(&self, backend: &mut B) {
        if let Some(accumulation) = self.accumulation {
            backend.set_residency(accumulation, Residency::OnStorage);
        }
        let Some(colour) = self.ring.current() else {
            return;
        };
        if self.needs_all_mipmaps {
            for texture in colour.all() {
                backend.generate_mipmaps(texture);
            }
        } else if self.needs_albedo_mipmaps {
            backend.generate_mipmaps(colour.albedo);
        }
    }

    pub fn destroy<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        for colour in self.ring.take_all() {
            for texture in colour.all() {
                backend.destroy_texture(texture);
            }
        }
        if let Some(accumulation) = self.accumulation.take() {
            backend.destroy_texture(accumulation);
        }
    }
}
