//! Feature accumulator - saturating integration of events into the maps.

use crate::codec::{DecodedEvent, Polarity};
use crate::filter::{EventFilter, SaturationThresholds, StagedEvent};
use crate::grid::{ByteGrid, StereoMaps};
use crate::remap::Remapping;

/// What one event did to the maps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Accumulation {
    /// Feature cells written.
    pub feature_writes: u32,
    /// Filtered events staged (accepted by the filter).
    pub staged: u32,
    /// Activity map cell was written.
    pub activity_written: bool,
}

/// Applies `±step` per event with saturation at 0 and 255.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureAccumulator {
    step: u8,
    thresholds: SaturationThresholds,
}

impl FeatureAccumulator {
    pub fn new(step: u8, thresholds: SaturationThresholds) -> Self {
        Self { step, thresholds }
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn thresholds(&self) -> SaturationThresholds {
        self.thresholds
    }

    /// Step one cell in the direction of `polarity`. Returns the new value.
    #[inline]
    pub fn apply(&self, grid: &mut ByteGrid, row: usize, col: usize, polarity: Polarity) -> Option<u8> {
        match polarity {
            Polarity::On => grid.saturating_add(row, col, self.step),
            Polarity::Off => grid.saturating_sub(row, col, self.step),
        }
    }

    /// Record raw activity at the event's unmirrored retina coordinate.
    pub fn record_activity(&self, maps: &mut StereoMaps, event: &DecodedEvent) -> bool {
        self.apply(
            maps.activity_mut(event.camera),
            event.y as usize,
            event.x as usize,
            event.polarity,
        )
        .is_some()
    }

    /// Integrate one event.
    ///
    /// The activity map is always updated. Feature cells from `remapping` are
    /// written only when `update_features` is set; every write that leaves a
    /// cell in a saturated band stages a filtered event.
    pub fn accumulate(
        &self,
        maps: &mut StereoMaps,
        event: &DecodedEvent,
        remapping: &Remapping,
        update_features: bool,
        filter: &mut EventFilter,
    ) -> Accumulation {
        let mut out = Accumulation {
            activity_written: self.record_activity(maps, event),
            ..Accumulation::default()
        };
        if !update_features {
            return out;
        }

        let features = maps.features_mut(event.camera);
        for cell in remapping.iter() {
            let Some(value) = self.apply(features, cell.y as usize, cell.x as usize, event.polarity)
            else {
                continue;
            };
            out.feature_writes += 1;
            if self.thresholds.crossed(value)
                && filter.stage(StagedEvent {
                    cell,
                    polarity: event.polarity,
                    camera: event.camera,
                    timestamp: event.timestamp,
                })
            {
                out.staged += 1;
            }
        }
        out
    }
}

impl Default for FeatureAccumulator {
    fn default() -> Self {
        Self::new(20, SaturationThresholds::default())
    }
}
