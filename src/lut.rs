//! Spatial lookup table (retina → feature grid).
//!
//! Layout is slot-major: entry `slot * R² + y * R + x` holds the feature-grid
//! linear index for slot `slot` of retina coordinate `(x, y)`, or
//! [`UNMAPPED`]. Every coordinate has [`LUT_SLOTS`] slots.

use std::io::Read;

use crate::error::LutError;

/// Candidate feature cells per retina coordinate.
pub const LUT_SLOTS: usize = 5;

/// Entry value for "no feature cell".
pub const UNMAPPED: i32 = -1;

/// Read-only retina → feature mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupTable {
    entries: Vec<i32>,
    retina_size: usize,
    feature_size: usize,
}

impl LookupTable {
    /// Number of entries a table for this geometry must hold.
    pub fn expected_len(retina_size: usize) -> usize {
        retina_size * retina_size * LUT_SLOTS
    }

    /// Table with every slot unmapped.
    pub fn unmapped(retina_size: usize, feature_size: usize) -> Self {
        Self {
            entries: vec![UNMAPPED; Self::expected_len(retina_size)],
            retina_size,
            feature_size,
        }
    }

    /// Validate and adopt a flat entry array.
    pub fn from_entries(
        entries: Vec<i32>,
        retina_size: usize,
        feature_size: usize,
    ) -> Result<Self, LutError> {
        let expected = Self::expected_len(retina_size);
        if entries.len() != expected {
            return Err(LutError::Length {
                got: entries.len(),
                expected,
            });
        }
        let limit = feature_size * feature_size;
        if let Some((index, &value)) = entries
            .iter()
            .enumerate()
            .find(|&(_, &v)| v != UNMAPPED && !(0..limit as i64).contains(&(v as i64)))
        {
            return Err(LutError::Entry {
                index,
                value,
                limit,
            });
        }
        Ok(Self {
            entries,
            retina_size,
            feature_size,
        })
    }

    /// Load a table stored as packed little-endian `i32`s.
    pub fn from_reader<R: Read>(
        mut reader: R,
        retina_size: usize,
        feature_size: usize,
    ) -> Result<Self, LutError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        if bytes.len() % 4 != 0 {
            return Err(LutError::Truncated(bytes.len()));
        }
        let entries = bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::from_entries(entries, retina_size, feature_size)
    }

    /// Serialize into the layout [`from_reader`](Self::from_reader) accepts.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.entries.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[inline]
    pub fn retina_size(&self) -> usize {
        self.retina_size
    }

    #[inline]
    pub fn feature_size(&self) -> usize {
        self.feature_size
    }

    /// Entry for `slot` at lookup-space coordinate `(x, y)`.
    ///
    /// `None` when the coordinate lies outside the table or the slot is
    /// [`UNMAPPED`].
    #[inline]
    pub fn get(&self, slot: usize, x: usize, y: usize) -> Option<usize> {
        let r = self.retina_size;
        if slot >= LUT_SLOTS || x >= r || y >= r {
            return None;
        }
        let v = self.entries[slot * r * r + y * r + x];
        (v != UNMAPPED).then_some(v as usize)
    }

    /// Raw entries of all slots at `(x, y)`, `None` outside the table.
    pub fn slots(&self, x: usize, y: usize) -> Option<[i32; LUT_SLOTS]> {
        let r = self.retina_size;
        if x >= r || y >= r {
            return None;
        }
        let mut out = [UNMAPPED; LUT_SLOTS];
        for (slot, v) in out.iter_mut().enumerate() {
            *v = self.entries[slot * r * r + y * r + x];
        }
        Some(out)
    }

    /// Point `slot` of `(x, y)` at feature index `target` (table construction).
    pub fn set(&mut self, slot: usize, x: usize, y: usize, target: Option<usize>) -> bool {
        let r = self.retina_size;
        if slot >= LUT_SLOTS || x >= r || y >= r {
            return false;
        }
        let value = match target {
            Some(t) if t < self.feature_size * self.feature_size => t as i32,
            Some(_) => return false,
            None => UNMAPPED,
        };
        self.entries[slot * r * r + y * r + x] = value;
        true
    }

    /// Count of mapped entries over all slots.
    pub fn mapped_count(&self) -> usize {
        self.entries.iter().filter(|&&v| v != UNMAPPED).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmapped_table() {
        let lut = LookupTable::unmapped(8, 4);
        assert_eq!(lut.mapped_count(), 0);
        assert_eq!(lut.get(0, 3, 3), None);
        assert_eq!(lut.slots(3, 3), Some([UNMAPPED; LUT_SLOTS]));
    }

    #[test]
    fn test_rejects_wrong_length() {
        let err = LookupTable::from_entries(vec![UNMAPPED; 10], 8, 4).unwrap_err();
        assert!(matches!(err, LutError::Length { got: 10, expected: 320 }));
    }

    #[test]
    fn test_rejects_out_of_range_entry() {
        let mut entries = vec![UNMAPPED; LookupTable::expected_len(8)];
        entries[7] = 16;
        let err = LookupTable::from_entries(entries.clone(), 8, 4).unwrap_err();
        assert!(matches!(err, LutError::Entry { index: 7, value: 16, limit: 16 }));

        entries[7] = -2;
        assert!(LookupTable::from_entries(entries.clone(), 8, 4).is_err());

        entries[7] = 15;
        assert!(LookupTable::from_entries(entries, 8, 4).is_ok());
    }

    #[test]
    fn test_slot_major_indexing() {
        let mut entries = vec![UNMAPPED; LookupTable::expected_len(8)];
        // slot 2, x = 5, y = 1
        entries[2 * 64 + 8 + 5] = 9;
        let lut = LookupTable::from_entries(entries, 8, 4).unwrap();
        assert_eq!(lut.get(2, 5, 1), Some(9));
        assert_eq!(lut.get(1, 5, 1), None);
        assert_eq!(lut.get(2, 8, 1), None);
    }

    #[test]
    fn test_reader_roundtrip() {
        let mut lut = LookupTable::unmapped(4, 2);
        assert!(lut.set(0, 1, 2, Some(3)));
        assert!(lut.set(4, 3, 3, Some(0)));
        assert!(!lut.set(0, 0, 0, Some(4)));

        let bytes = lut.to_le_bytes();
        let loaded = LookupTable::from_reader(bytes.as_slice(), 4, 2).unwrap();
        assert_eq!(loaded, lut);

        let err = LookupTable::from_reader(&bytes[..bytes.len() - 1], 4, 2).unwrap_err();
        assert!(matches!(err, LutError::Truncated(_)));
    }
}
