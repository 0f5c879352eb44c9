//! Byte Grid - bounds-checked single-channel 8-bit image
//!
//! The storage unit behind every activity and feature map. Cells are stored
//! row-major in a flat buffer whose row stride may exceed the width (row
//! padding, as image transports align rows). All stride arithmetic lives here;
//! callers only ever index by `(row, col)`.

use crate::codec::Camera;
use crate::config::BASELINE;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Single-channel 8-bit grid indexed by `(row, col)`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ByteGrid {
    cells: Vec<u8>,
    width: usize,
    height: usize,
    stride: usize,
}

impl ByteGrid {
    /// Create a tightly packed grid with every cell set to `fill`.
    pub fn new(width: usize, height: usize, fill: u8) -> Self {
        Self::with_row_alignment(width, height, 1, fill)
    }

    /// Create a grid whose rows are padded to a multiple of `align` bytes.
    ///
    /// Padding bytes are zero and never visible through the cell accessors.
    pub fn with_row_alignment(width: usize, height: usize, align: usize, fill: u8) -> Self {
        let align = align.max(1);
        let stride = width.div_ceil(align) * align;
        let mut cells = vec![0; stride * height];
        for row in cells.chunks_exact_mut(stride.max(1)).take(height) {
            row[..width].fill(fill);
        }
        Self {
            cells,
            width,
            height,
            stride,
        }
    }

    /// Square grid, the shape of every map in the extractor.
    pub fn square(size: usize, fill: u8) -> Self {
        Self::new(size, size, fill)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes per row including padding.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Padding bytes at the end of each row.
    #[inline]
    pub fn padding(&self) -> usize {
        self.stride - self.width
    }

    #[inline]
    fn offset(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.height && col < self.width).then(|| row * self.stride + col)
    }

    /// Get cell value, `None` outside the grid.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        self.offset(row, col).map(|i| self.cells[i])
    }

    /// Set cell value. Returns `false` (and writes nothing) outside the grid.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: u8) -> bool {
        match self.offset(row, col) {
            Some(i) => {
                self.cells[i] = value;
                true
            }
            None => false,
        }
    }

    /// Add `amount`, clamping at 255. Returns the new value.
    #[inline]
    pub fn saturating_add(&mut self, row: usize, col: usize, amount: u8) -> Option<u8> {
        let i = self.offset(row, col)?;
        self.cells[i] = self.cells[i].saturating_add(amount);
        Some(self.cells[i])
    }

    /// Subtract `amount`, clamping at 0. Returns the new value.
    #[inline]
    pub fn saturating_sub(&mut self, row: usize, col: usize, amount: u8) -> Option<u8> {
        let i = self.offset(row, col)?;
        self.cells[i] = self.cells[i].saturating_sub(amount);
        Some(self.cells[i])
    }

    /// Apply `f` to every visible cell, skipping row padding.
    pub fn map_in_place(&mut self, mut f: impl FnMut(u8) -> u8) {
        let width = self.width;
        for row in self.rows_mut() {
            for v in &mut row[..width] {
                *v = f(*v);
            }
        }
    }

    /// Set every visible cell to `value`.
    pub fn fill(&mut self, value: u8) {
        self.map_in_place(|_| value);
    }

    fn rows_mut(&mut self) -> impl Iterator<Item = &mut [u8]> {
        let height = self.height;
        self.cells.chunks_exact_mut(self.stride.max(1)).take(height)
    }

    /// Iterate visible rows (padding stripped).
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let width = self.width;
        self.cells
            .chunks_exact(self.stride.max(1))
            .take(self.height)
            .map(move |row| &row[..width])
    }

    /// Iterate all visible cell values, row-major.
    pub fn values(&self) -> impl Iterator<Item = u8> + '_ {
        self.rows().flat_map(|row| row.iter().copied())
    }

    /// Raw storage including row padding.
    pub fn as_raw(&self) -> &[u8] {
        &self.cells
    }

    /// Copy of the visible cells with padding removed.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width * self.height);
        for row in self.rows() {
            out.extend_from_slice(row);
        }
        out
    }

    /// Overwrite this grid with `other`, reusing the allocation.
    ///
    /// Both grids must share a shape; mismatched shapes fall back to a clone.
    pub fn copy_from(&mut self, other: &ByteGrid) {
        if self.width == other.width && self.height == other.height && self.stride == other.stride {
            self.cells.copy_from_slice(&other.cells);
        } else {
            *self = other.clone();
        }
    }

    /// Count cells that differ from `baseline`.
    pub fn count_not(&self, baseline: u8) -> usize {
        self.values().filter(|&v| v != baseline).count()
    }

    /// Largest distance of any cell from `baseline`.
    pub fn max_deviation(&self, baseline: u8) -> u8 {
        self.values().map(|v| v.abs_diff(baseline)).max().unwrap_or(0)
    }

    /// Check if every cell equals `value`.
    pub fn is_uniform(&self, value: u8) -> bool {
        self.values().all(|v| v == value)
    }
}

/// The four maps owned by an extractor: one activity and one feature map per
/// camera.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StereoMaps {
    activity: [ByteGrid; 2],
    features: [ByteGrid; 2],
}

impl StereoMaps {
    /// All maps at [`BASELINE`].
    pub fn new(retina_size: usize, feature_size: usize) -> Self {
        Self {
            activity: [
                ByteGrid::square(retina_size, BASELINE),
                ByteGrid::square(retina_size, BASELINE),
            ],
            features: [
                ByteGrid::square(feature_size, BASELINE),
                ByteGrid::square(feature_size, BASELINE),
            ],
        }
    }

    pub fn activity(&self, camera: Camera) -> &ByteGrid {
        &self.activity[camera.index()]
    }

    pub fn activity_mut(&mut self, camera: Camera) -> &mut ByteGrid {
        &mut self.activity[camera.index()]
    }

    pub fn features(&self, camera: Camera) -> &ByteGrid {
        &self.features[camera.index()]
    }

    pub fn features_mut(&mut self, camera: Camera) -> &mut ByteGrid {
        &mut self.features[camera.index()]
    }

    /// Every map, activity first.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ByteGrid> {
        self.activity.iter_mut().chain(self.features.iter_mut())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ByteGrid> {
        self.activity.iter().chain(self.features.iter())
    }

    /// Overwrite with `other`, reusing allocations.
    pub fn copy_from(&mut self, other: &StereoMaps) {
        for (dst, src) in self.iter_mut().zip(other.iter()) {
            dst.copy_from(src);
        }
    }

    /// Reset every map to [`BASELINE`].
    pub fn reset(&mut self) {
        for grid in self.iter_mut() {
            grid.fill(BASELINE);
        }
    }

    /// Check if every map sits at [`BASELINE`].
    pub fn at_rest(&self) -> bool {
        self.iter().all(|g| g.is_uniform(BASELINE))
    }
}
