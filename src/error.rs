//! Error types
//!
//! Only startup-time faults are errors. Everything that can go wrong with a
//! single event (stale timestamp, undecodable word, unmapped pixel) is counted
//! in [`CycleStats`](crate::CycleStats) instead.

use thiserror::Error;

/// Rejected configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("rate_hz must be > 0")]
    ZeroRate,

    #[error("retina_size must be in 1..={max}, got {got}")]
    RetinaSize { got: usize, max: usize },

    #[error("feature_size must be in 1..={max}, got {got}")]
    FeatureSize { got: usize, max: usize },

    #[error("step must be > 0")]
    ZeroStep,

    #[error("decay_quantum must be > 0")]
    ZeroQuantum,

    #[error("low_threshold ({low}) must be below high_threshold ({high})")]
    Thresholds { low: u8, high: u8 },

    #[error("buffer_events must be > 0")]
    ZeroBuffer,

    #[error("address_shift {0} leaves no room for a 16-bit spatial code")]
    AddressShift(u8),
}

/// Lookup table rejected at load time.
#[derive(Debug, Error)]
pub enum LutError {
    #[error("lookup table has {got} entries, expected {expected}")]
    Length { got: usize, expected: usize },

    #[error("lookup table entry {index} = {value} is neither -1 nor in [0, {limit})")]
    Entry { index: usize, value: i32, limit: usize },

    #[error("lookup table byte length {0} is not a multiple of 4")]
    Truncated(usize),

    #[error("lookup table read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to bring an extractor up. Prevents the ACTIVE state.
#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lut(#[from] LutError),

    #[error("lookup table built for retina {lut_retina}/feature {lut_feature}, config wants {retina}/{feature}")]
    LutMismatch {
        lut_retina: usize,
        lut_feature: usize,
        retina: usize,
        feature: usize,
    },
}

/// Runner lifecycle failure.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("cycle runner already running")]
    AlreadyRunning,

    #[error("failed to spawn cycle thread: {0}")]
    Spawn(#[from] std::io::Error),
}
