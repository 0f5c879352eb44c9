//! Output filter - saturation thresholds, staging and re-encoding.
//!
//! Dense per-event traffic is reduced to a sparse stream: a feature cell that
//! was just written to a value at or beyond a saturation threshold stages one
//! outgoing event. Staged events keep input order and are encoded only when
//! somebody is listening.

use tracing::warn;

use crate::codec::{AerWord, Camera, EventCodec, Polarity};
use crate::remap::FeatureCell;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// High/low saturation thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SaturationThresholds {
    pub low: u8,
    pub high: u8,
}

impl SaturationThresholds {
    pub fn new(low: u8, high: u8) -> Self {
        Self { low, high }
    }

    /// Check whether `value` sits in either saturated band.
    #[inline]
    pub fn crossed(&self, value: u8) -> bool {
        value >= self.high || value <= self.low
    }
}

impl Default for SaturationThresholds {
    fn default() -> Self {
        Self::new(10, 240)
    }
}

/// A feature write that crossed a threshold, not yet encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StagedEvent {
    pub cell: FeatureCell,
    pub polarity: Polarity,
    pub camera: Camera,
    pub timestamp: u32,
}

/// Encoded filtered event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FilteredEvent {
    pub spatial_code: u16,
    pub timestamp: u32,
}

impl FilteredEvent {
    pub fn to_word<C: EventCodec>(&self, codec: &C) -> AerWord {
        codec.to_word(self.spatial_code, self.timestamp)
    }
}

/// Bounded per-cycle staging buffer.
#[derive(Clone, Debug)]
pub struct EventFilter {
    staged: Vec<StagedEvent>,
    capacity: usize,
    overflow: usize,
}

impl EventFilter {
    pub fn new(capacity: usize) -> Self {
        Self {
            staged: Vec::with_capacity(capacity.min(4096)),
            capacity,
            overflow: 0,
        }
    }

    /// Stage an event. Returns `false` when the buffer is full.
    pub fn stage(&mut self, event: StagedEvent) -> bool {
        if self.staged.len() >= self.capacity {
            if self.overflow == 0 {
                warn!(capacity = self.capacity, "filtered event buffer full, dropping");
            }
            self.overflow += 1;
            return false;
        }
        self.staged.push(event);
        true
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Events dropped since the last [`clear`](Self::clear).
    pub fn overflow(&self) -> usize {
        self.overflow
    }

    pub fn staged(&self) -> &[StagedEvent] {
        &self.staged
    }

    pub fn clear(&mut self) {
        self.staged.clear();
        self.overflow = 0;
    }

    /// Encode staged events into spatial codes, input order preserved.
    pub fn encode<C: EventCodec>(&self, codec: &C) -> Vec<FilteredEvent> {
        self.staged
            .iter()
            .map(|s| FilteredEvent {
                spatial_code: codec.encode(s.cell.x, s.cell.y, s.polarity, s.camera),
                timestamp: s.timestamp,
            })
            .collect()
    }

    /// Encode staged events straight into outgoing wire records.
    pub fn encode_words<C: EventCodec>(&self, codec: &C) -> Vec<AerWord> {
        self.encode(codec).iter().map(|e| e.to_word(codec)).collect()
    }
}
