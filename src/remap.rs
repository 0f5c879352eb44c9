//! Spatial remapper - retina coordinate → feature cells.

use crate::codec::{Camera, DecodedEvent};
use crate::lut::{LookupTable, LUT_SLOTS, UNMAPPED};

/// A feature-grid cell, `x` = column, `y` = row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FeatureCell {
    pub x: u16,
    pub y: u16,
}

/// Result of remapping one event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Remapping {
    /// Valid cells, one per mapped slot, in slot order.
    pub cells: [Option<FeatureCell>; LUT_SLOTS],
    /// Sentinel slots counted under the odd-x rule.
    pub unmapped_slots: u32,
    /// Every slot was a sentinel and the mirrored x was odd.
    pub unmapped_event: bool,
    /// Mapped slots whose decoded cell fell outside the feature grid.
    pub out_of_grid: u32,
    /// Mirrored coordinate fell outside the table; no slot was probed.
    pub off_table: bool,
}

impl Remapping {
    /// Iterate the valid cells in slot order.
    pub fn iter(&self) -> impl Iterator<Item = FeatureCell> + '_ {
        self.cells.iter().flatten().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }
}

/// Maps decoded events through a [`LookupTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Remapper {
    retina_size: usize,
    feature_size: usize,
}

impl Remapper {
    pub fn new(retina_size: usize, feature_size: usize) -> Self {
        Self {
            retina_size,
            feature_size,
        }
    }

    pub fn for_table(lut: &LookupTable) -> Self {
        Self::new(lut.retina_size(), lut.feature_size())
    }

    /// Split a feature linear index into a cell.
    ///
    /// With `q = pos / F` and `r = pos % F`:
    /// LEFT lands on column `r`, row `F - q`; RIGHT is transposed, column
    /// `F - q`, row `r`. Either way a `q = 0` index lands one past the grid
    /// edge and yields `None`.
    #[inline]
    pub fn decode_index(&self, camera: Camera, pos: usize) -> Option<FeatureCell> {
        let f = self.feature_size;
        let q = pos / f;
        let r = pos - q * f;
        let mirrored = f.checked_sub(q)?;
        let (col, row) = match camera {
            Camera::Left => (r, mirrored),
            Camera::Right => (mirrored, r),
        };
        (row < f && col < f).then_some(FeatureCell {
            x: col as u16,
            y: row as u16,
        })
    }

    /// Remap one event through every slot of `lut`.
    pub fn remap(&self, lut: &LookupTable, event: &DecodedEvent) -> Remapping {
        let mut out = Remapping::default();
        let (x, y) = event.camera.mirror(event.x, event.y, self.retina_size);

        let Some(slots) = lut.slots(x, y) else {
            out.off_table = true;
            return out;
        };

        let odd = x % 2 == 1;
        let mut sentinels = 0;
        for (slot, &entry) in slots.iter().enumerate() {
            if entry == UNMAPPED {
                sentinels += 1;
                if odd {
                    out.unmapped_slots += 1;
                }
                continue;
            }
            match self.decode_index(event.camera, entry as usize) {
                Some(cell) => out.cells[slot] = Some(cell),
                None => out.out_of_grid += 1,
            }
        }
        out.unmapped_event = odd && sentinels == LUT_SLOTS;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Polarity;

    fn event(x: u16, y: u16, camera: Camera) -> DecodedEvent {
        DecodedEvent {
            x,
            y,
            polarity: Polarity::On,
            camera,
            timestamp: 0x8000_0001,
        }
    }

    #[test]
    fn test_left_mirrors_x_and_feature_row() {
        let mut lut = LookupTable::unmapped(128, 32);
        // raw x = 10 → lookup x = 117
        lut.set(0, 117, 4, Some(32 * 3 + 7));
        lut.set(3, 117, 4, Some(5));
        let remapper = Remapper::for_table(&lut);

        let r = remapper.remap(&lut, &event(10, 4, Camera::Left));
        let cells: Vec<_> = r.iter().collect();
        assert_eq!(cells, vec![FeatureCell { x: 7, y: 29 }]);
        // slot 3 decodes to row 32, past the grid
        assert_eq!(r.out_of_grid, 1);
        // lookup x 117 is odd: three remaining sentinel slots counted
        assert_eq!(r.unmapped_slots, 3);
        assert!(!r.unmapped_event);
    }

    #[test]
    fn test_right_mirrors_both_axes() {
        let mut lut = LookupTable::unmapped(128, 32);
        // raw (10, 20) → lookup (118, 108)
        lut.set(1, 118, 108, Some(32 * 6 + 2));
        let remapper = Remapper::for_table(&lut);

        let r = remapper.remap(&lut, &event(10, 20, Camera::Right));
        // transposed: column 32 - 6, row 2
        assert_eq!(r.iter().collect::<Vec<_>>(), vec![FeatureCell { x: 26, y: 2 }]);
        // lookup x 118 is even: sentinels not counted
        assert_eq!(r.unmapped_slots, 0);
    }

    #[test]
    fn test_right_zero_coordinate_is_off_table() {
        let lut = LookupTable::unmapped(128, 32);
        let r = Remapper::for_table(&lut).remap(&lut, &event(0, 5, Camera::Right));
        assert!(r.off_table);
        assert!(r.is_empty());
    }

    #[test]
    fn test_all_sentinels_odd_x() {
        let lut = LookupTable::unmapped(128, 32);
        let remapper = Remapper::for_table(&lut);

        // LEFT raw x = 8 → lookup x = 119 (odd)
        let r = remapper.remap(&lut, &event(8, 0, Camera::Left));
        assert!(r.unmapped_event);
        assert_eq!(r.unmapped_slots, LUT_SLOTS as u32);
        assert!(r.is_empty());

        // LEFT raw x = 9 → lookup x = 118 (even)
        let r = remapper.remap(&lut, &event(9, 0, Camera::Left));
        assert!(!r.unmapped_event);
        assert_eq!(r.unmapped_slots, 0);
    }

    #[test]
    fn test_decode_index_bounds() {
        let remapper = Remapper::new(128, 32);
        assert_eq!(remapper.decode_index(Camera::Left, 0), None);
        assert_eq!(remapper.decode_index(Camera::Left, 32), Some(FeatureCell { x: 0, y: 31 }));
        assert_eq!(remapper.decode_index(Camera::Left, 1023), Some(FeatureCell { x: 31, y: 1 }));
        assert_eq!(remapper.decode_index(Camera::Right, 0), None);
        assert_eq!(remapper.decode_index(Camera::Right, 31), None);
        assert_eq!(remapper.decode_index(Camera::Right, 32 + 5), Some(FeatureCell { x: 31, y: 5 }));
        assert_eq!(remapper.decode_index(Camera::Right, 1023), Some(FeatureCell { x: 1, y: 31 }));
    }
}
