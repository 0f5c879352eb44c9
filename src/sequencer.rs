//! Timestamp sequencer - per-camera ordering and wraparound resolution.
//!
//! The sensor stamps events with a 32-bit counter whose top bit flags a valid
//! stamp. The stamp range is split at a boundary into two half-epochs; while
//! in the first half only stamps below the boundary are accepted, while in the
//! second half only stamps strictly above it. A stamp that falls back below
//! the boundary during the second half is a wraparound the sensor never
//! announced; the state returns to the first half but keeps `last_accepted`,
//! so ordering resumes only once stamps pass it or a marker resets it.

use tracing::{info, trace, warn};

use crate::codec::{AerWord, EventCodec};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stamps at or below this value carry no valid timestamp.
pub const TIMESTAMP_FLAG: u32 = 0x8000_0000;

/// Per-camera sequencing state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimestampState {
    /// Last timestamp accepted for this camera.
    pub last_accepted: u32,
    /// True while in the first half-epoch.
    pub half_epoch: bool,
}

impl TimestampState {
    pub const fn new() -> Self {
        Self {
            last_accepted: 0,
            half_epoch: true,
        }
    }
}

impl Default for TimestampState {
    fn default() -> Self {
        Self::new()
    }
}

/// What the sequencer decided for one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Newer than anything seen this half-epoch; forwarded.
    Accepted,
    /// Tie or older than `last_accepted`, or the boundary stamp itself in
    /// the second half; dropped.
    Stale,
    /// Timestamp flag not set; not a sensor event.
    Unstamped,
    /// Explicit wraparound marker; state reset.
    WrapMarker,
    /// First stamp past the boundary; switched to the second half-epoch.
    SecondHalf,
    /// Stamp fell below the boundary in the second half; back to the first.
    UndetectedWrap,
}

/// Counters for one sequencing pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceReport {
    pub accepted: usize,
    pub stale: usize,
    pub unstamped: usize,
    pub wraparounds: usize,
    pub undetected_wraparounds: usize,
    pub half_switches: usize,
}

/// Wraparound state machine, parameterized by the sensor's stamp layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sequencer {
    boundary: u32,
    wrap_marker: u32,
}

impl Sequencer {
    pub fn new(boundary: u32, wrap_marker: u32) -> Self {
        Self {
            boundary,
            wrap_marker,
        }
    }

    pub fn boundary(&self) -> u32 {
        self.boundary
    }

    /// Run one timestamp through `state`.
    pub fn admit(&self, state: &mut TimestampState, timestamp: u32) -> Admission {
        if timestamp <= TIMESTAMP_FLAG {
            return Admission::Unstamped;
        }
        if timestamp == self.wrap_marker {
            state.last_accepted = 0;
            state.half_epoch = true;
            return Admission::WrapMarker;
        }

        if state.half_epoch {
            if timestamp >= self.boundary {
                state.half_epoch = false;
                return Admission::SecondHalf;
            }
        } else if timestamp < self.boundary {
            // back to the first half; last_accepted is kept
            state.half_epoch = true;
            return Admission::UndetectedWrap;
        }

        let in_half = state.half_epoch || timestamp > self.boundary;
        if in_half && timestamp > state.last_accepted {
            state.last_accepted = timestamp;
            Admission::Accepted
        } else {
            Admission::Stale
        }
    }

    /// Filter `words` into `out` in arrival order.
    ///
    /// Each record is sequenced against the state of the camera `codec`
    /// reads from its address. Accepted records are appended verbatim.
    pub fn sequence<C: EventCodec>(
        &self,
        codec: &C,
        words: &[AerWord],
        states: &mut [TimestampState; 2],
        out: &mut Vec<AerWord>,
    ) -> SequenceReport {
        let mut report = SequenceReport::default();

        for &word in words {
            let camera = codec.camera(word);
            let state = &mut states[camera.index()];
            match self.admit(state, word.timestamp) {
                Admission::Accepted => {
                    out.push(word);
                    report.accepted += 1;
                }
                Admission::Stale => {
                    trace!(camera = camera.name(), ts = word.timestamp, "stale event dropped");
                    report.stale += 1;
                }
                Admission::Unstamped => report.unstamped += 1,
                Admission::WrapMarker => {
                    info!(camera = camera.name(), "wraparound marker, timestamp reset");
                    report.wraparounds += 1;
                }
                Admission::SecondHalf => {
                    trace!(camera = camera.name(), ts = word.timestamp, "entering second half-epoch");
                    report.half_switches += 1;
                }
                Admission::UndetectedWrap => {
                    warn!(
                        camera = camera.name(),
                        ts = word.timestamp,
                        "undetected wraparound, back to first half-epoch"
                    );
                    report.undetected_wraparounds += 1;
                }
            }
        }

        report
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(0x8000_F000, 0x8800_0000)
    }
}

/// Convenience for tests and tools: both cameras at their initial state.
pub fn initial_states() -> [TimestampState; 2] {
    [TimestampState::new(); 2]
}
