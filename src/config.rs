//! Extractor configuration

use std::time::Duration;

use crate::error::ConfigError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest grid the 7-bit AER coordinate fields can address.
pub const MAX_GRID_SIZE: usize = 128;

/// Neutral value every map relaxes toward.
pub const BASELINE: u8 = 127;

/// Configuration for a stereo feature extractor.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ExtractorConfig {
    /// Cycle rate in Hz.
    pub rate_hz: u32,

    /// Side of the square retina (activity map) grid.
    pub retina_size: usize,

    /// Side of the square feature grid.
    pub feature_size: usize,

    /// Saturating increment/decrement applied per event.
    pub step: u8,

    /// Amount every cell moves toward [`BASELINE`] per cycle.
    pub decay_quantum: u8,

    /// Feature cells at or above this value emit a filtered event.
    pub high_threshold: u8,

    /// Feature cells at or below this value emit a filtered event.
    pub low_threshold: u8,

    /// Timestamp splitting the first and second half-epoch.
    pub half_epoch_boundary: u32,

    /// Timestamp value the sensor sends as an explicit wraparound marker.
    pub wrap_marker: u32,

    /// Ingest capacity in (address, timestamp) records.
    pub buffer_events: usize,

    /// Capacity of the filtered event buffer per cycle.
    pub max_filtered_events: usize,

    /// Right shift applied to raw addresses before field extraction.
    pub address_shift: u8,

    /// Also accumulate the RIGHT feature map and stage its events.
    pub stereo_features: bool,

    /// Hold the extractor in IDLE.
    pub idle: bool,
}

impl ExtractorConfig {
    /// Create the standard 128 → 32 configuration running at `rate_hz`.
    pub fn new(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            retina_size: 128,
            feature_size: 32,
            step: 20,
            decay_quantum: 1,
            high_threshold: 240,
            low_threshold: 10,
            half_epoch_boundary: 0x8000_F000,
            wrap_marker: 0x8800_0000,
            buffer_events: 2048,
            max_filtered_events: 4096,
            address_shift: 0,
            stereo_features: false,
            idle: false,
        }
    }

    pub fn with_grid(mut self, retina_size: usize, feature_size: usize) -> Self {
        self.retina_size = retina_size;
        self.feature_size = feature_size;
        self
    }

    pub fn with_step(mut self, step: u8) -> Self {
        self.step = step;
        self
    }

    pub fn with_decay_quantum(mut self, quantum: u8) -> Self {
        self.decay_quantum = quantum;
        self
    }

    pub fn with_thresholds(mut self, low: u8, high: u8) -> Self {
        self.low_threshold = low;
        self.high_threshold = high;
        self
    }

    pub fn with_stereo_features(mut self, enabled: bool) -> Self {
        self.stereo_features = enabled;
        self
    }

    pub fn with_idle(mut self, idle: bool) -> Self {
        self.idle = idle;
        self
    }

    /// Duration of one cycle.
    pub fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.rate_hz.max(1) as u64)
    }

    /// Ingest capacity in bytes (8 bytes per record).
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_events * 8
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_hz == 0 {
            return Err(ConfigError::ZeroRate);
        }
        if self.retina_size == 0 || self.retina_size > MAX_GRID_SIZE {
            return Err(ConfigError::RetinaSize {
                got: self.retina_size,
                max: MAX_GRID_SIZE,
            });
        }
        if self.feature_size == 0 || self.feature_size > MAX_GRID_SIZE {
            return Err(ConfigError::FeatureSize {
                got: self.feature_size,
                max: MAX_GRID_SIZE,
            });
        }
        if self.step == 0 {
            return Err(ConfigError::ZeroStep);
        }
        if self.decay_quantum == 0 {
            return Err(ConfigError::ZeroQuantum);
        }
        if self.low_threshold >= self.high_threshold {
            return Err(ConfigError::Thresholds {
                low: self.low_threshold,
                high: self.high_threshold,
            });
        }
        if self.buffer_events == 0 {
            return Err(ConfigError::ZeroBuffer);
        }
        if self.address_shift > 16 {
            return Err(ConfigError::AddressShift(self.address_shift));
        }
        Ok(())
    }
}

impl Default for ExtractorConfig {
    /// 20 ms cycle, the sensor driver's native rate.
    fn default() -> Self {
        Self::new(50)
    }
}
