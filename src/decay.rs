//! Decay pass - the leak of the leaky integrator.
//!
//! Once per cycle every cell moves one quantum toward the baseline. Cells
//! within a quantum of the baseline snap onto it, so a map left alone reaches
//! rest in `ceil(|v - baseline| / quantum)` cycles and then stays there.

use crate::config::BASELINE;
use crate::grid::{ByteGrid, StereoMaps};

/// Linear relaxation toward a baseline value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecayPass {
    baseline: u8,
    quantum: u8,
}

impl DecayPass {
    pub fn new(quantum: u8) -> Self {
        Self::with_baseline(BASELINE, quantum)
    }

    pub fn with_baseline(baseline: u8, quantum: u8) -> Self {
        Self { baseline, quantum }
    }

    pub fn quantum(&self) -> u8 {
        self.quantum
    }

    /// One relaxation step for a single value.
    #[inline]
    pub fn relax(&self, value: u8) -> u8 {
        let b = self.baseline as i16;
        let q = self.quantum as i16;
        let v = value as i16;
        if v > b + q {
            (v - q) as u8
        } else if v < b - q {
            (v + q) as u8
        } else {
            self.baseline
        }
    }

    /// Number of passes until `value` reaches the baseline.
    pub fn passes_to_rest(&self, value: u8) -> usize {
        if self.quantum == 0 {
            return if value == self.baseline { 0 } else { usize::MAX };
        }
        (value.abs_diff(self.baseline) as usize).div_ceil(self.quantum as usize)
    }

    pub fn apply(&self, grid: &mut ByteGrid) {
        grid.map_in_place(|v| self.relax(v));
    }

    /// Relax all four maps.
    pub fn apply_all(&self, maps: &mut StereoMaps) {
        for grid in maps.iter_mut() {
            self.apply(grid);
        }
    }
}

impl Default for DecayPass {
    fn default() -> Self {
        Self::new(1)
    }
}
