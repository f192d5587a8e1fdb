//! Kernel variant table
//!
//! Specialized kernels keyed by a small bitmask. Each slot is filled on first
//! use, either by a variant already registered under "{base}/{mask}" or by
//! cloning the canonical kernel with one constant per bit.

use super::backend::ComputeExecutor;
use super::gpu_data::KernelHandle;
use crate::error::{OptionExt, VoxelizerError, VoxelizerResult};

#[derive(Debug, Clone)]
pub struct KernelVariantTable<const N: usize> {
    base_name: &'static str,
    base: KernelHandle,
    /// Constant name for each mask bit, lowest bit first
    properties: &'static [&'static str],
    slots: [Option<KernelHandle>; N],
}

impl<const N: usize> KernelVariantTable<N> {
    /// Look up the canonical kernel, failing when it was not shipped
    pub fn new<E: ComputeExecutor + ?Sized>(
        executor: &E,
        base_name: &'static str,
        properties: &'static [&'static str],
    ) -> VoxelizerResult<Self> {
        debug_assert_eq!(1usize << properties.len(), N);
        let base = executor
            .find_kernel(base_name)
            .ok_or_voxelizer(|| VoxelizerError::KernelNotFound {
                name: base_name.to_string(),
            })?;

        Ok(Self {
            base_name,
            base,
            properties,
            slots: [None; N],
        })
    }

    pub fn base(&self) -> KernelHandle {
        self.base
    }

    pub fn get_or_create<E: ComputeExecutor + ?Sized>(
        &mut self,
        executor: &mut E,
        mask: u32,
    ) -> VoxelizerResult<KernelHandle> {
        let idx = mask as usize;
        if idx >= N {
            return Err(VoxelizerError::Internal {
                message: format!("variant mask {} out of range for {}", mask, self.base_name),
            });
        }
        if let Some(kernel) = self.slots[idx] {
            return Ok(kernel);
        }

        let name = format!("{}/{}", self.base_name, mask);
        let kernel = match executor.find_kernel(&name) {
            Some(kernel) => kernel,
            None => {
                let constants: Vec<(&'static str, i32)> = self
                    .properties
                    .iter()
                    .enumerate()
                    .map(|(bit, &property)| (property, ((mask >> bit) & 1) as i32))
                    .collect();
                log::debug!("[KernelVariantTable] creating {}", name);
                executor.create_kernel_variant(self.base, &name, &constants)?
            }
        };

        self.slots[idx] = Some(kernel);
        Ok(kernel)
    }
}
