//! Two-slot ring of colour volumes
//!
//! Incremental builds write into the slot that is not current, then flip so
//! the previous window stays readable for the overlap copy.

use crate::gpu::TextureHandle;

/// Albedo, normal and emissive volumes of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColourVolumes {
    pub albedo: TextureHandle,
    pub normal: TextureHandle,
    pub emissive: TextureHandle,
}

impl ColourVolumes {
    pub fn all(&self) -> [TextureHandle; 3] {
        [self.albedo, self.normal, self.emissive]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureRing {
    slots: [Option<ColourVolumes>; 2],
    current: usize,
}

impl TextureRing {
    pub fn current(&self) -> Option<ColourVolumes> {
        self.slots[self.current]
    }

    /// The slot that becomes current on the next flip
    pub fn alternate(&self) -> Option<ColourVolumes> {
        self.slots[1 - self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn set_current(&mut self, volumes: ColourVolumes) {
        self.slots[self.current] = Some(volumes);
    }

    pub fn set_alternate(&mut self, volumes: ColourVolumes) {
        self.slots[1 - self.current] = Some(volumes);
    }

    pub fn flip(&mut self) {
        self.current = 1 - self.current;
    }

    /// Empty both slots, returning whatever they held
    pub fn take_all(&mut self) -> Vec<ColourVolumes> {
        self.current = 0;
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volumes(base: u64) -> ColourVolumes {
        ColourVolumes {
            albedo: TextureHandle(base),
            normal: TextureHandle(base + 1),
            emissive: TextureHandle(base + 2),
        }
    }

    #[test]
    fn test_flip_swaps_current_and_alternate() {
        let mut ring = TextureRing::default();
        ring.set_current(volumes(10));
        ring.set_alternate(volumes(20));

        ring.flip();
        assert_eq!(ring.current(), Some(volumes(20)));
        assert_eq!(ring.alternate(), Some(volumes(10)));
        assert_eq!(ring.current_index(), 1);

        ring.flip();
        assert_eq!(ring.current(), Some(volumes(10)));
    }

    #[test]
    fn test_take_all_empties_ring() {
        let mut ring = TextureRing::default();
        ring.set_current(volumes(10));
        ring.flip();
        ring.set_current(volumes(20));

        let taken = ring.take_all();
        assert_eq!(taken.len(), 2);
        assert_eq!(ring.current(), None);
        assert_eq!(ring.alternate(), None);
        assert_eq!(ring.current_index(), 0);
    }
}
