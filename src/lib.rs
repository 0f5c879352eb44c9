//! Event Feature Extractor - stereo AER decoding into decaying feature maps
//!
//! Two event cameras emit address-event records. Each cycle the extractor
//! turns the records of the last period into four decaying maps and a
//! stream of "saturated" events.
//!
//! # Core Types
//!
//! - **AerWord**: One raw record, 32-bit address plus 32-bit timestamp
//! - **ByteGrid**: A 2-D `u8` map resting at the baseline 127
//! - **LookupTable**: Retina pixel → up to five feature cells
//! - **FeatureExtractor**: The per-cycle orchestrator
//!
//! # Pipeline
//!
//! ```text
//! raw buffer ─▶ Sequencer ─▶ Codec ─▶ Remapper ─▶ Accumulator ─▶ Decay ─▶ publish
//!                 (order)    (decode)   (LUT)     (±step, stage)
//! ```
//!
//! 1. **Sequencer** - per-camera monotonic ordering across timestamp wraparound
//! 2. **Codec** - address bits → `(x, y, polarity, camera)` and back
//! 3. **Remapper** - camera-specific mirroring and table lookup
//! 4. **Accumulator** - saturating `±step` on the activity and feature maps
//! 5. **Decay** - every cell relaxes one quantum toward the baseline
//! 6. **Observers** - maps and filtered events go out at the cycle boundary
//!
//! # Core Concepts
//!
//! - **Leaky integration**: maps are short-term memory of recent activity
//! - **Baseline 127**: a map at rest is uniformly 127
//! - **Saturation filter**: feature writes landing in `[0, 10]` or `[240, 255]`
//!   are re-emitted as events in the output address space
//! - **Whole cycles**: observers only ever see committed state
//!
//! # Example
//!
//! ```rust
//! use event_feature_extractor::{
//!     records_to_bytes, AerWord, Camera, ExtractorConfig, FeatureExtractor, LookupTable,
//! };
//!
//! // LEFT camera pixel (10, 4) pools into feature cell (7, 29).
//! // LEFT mirrors x before the lookup: 127 - 10 = 117.
//! let mut lut = LookupTable::unmapped(128, 32);
//! lut.set(0, 117, 4, Some(3 * 32 + 7));
//!
//! let mut extractor = FeatureExtractor::new(ExtractorConfig::default(), lut).unwrap();
//!
//! // ON event, LEFT camera: polarity | x << 1 | y << 8 | camera << 15
//! let address = 1 | (10 << 1) | (4 << 8) | (1 << 15);
//! let raw = records_to_bytes(&[AerWord::new(address, 0x8000_0001)]);
//!
//! let outcome = extractor.run_cycle(&raw);
//! assert_eq!(outcome.stats().map(|s| s.accepted), Some(1));
//!
//! // 127 + 20, then one decay step
//! assert_eq!(extractor.feature_map(Camera::Left).get(29, 7), Some(146));
//! assert_eq!(extractor.activity_map(Camera::Left).get(4, 10), Some(146));
//! ```

mod accumulator;
mod codec;
mod config;
mod decay;
mod error;
mod extractor;
mod filter;
mod grid;
mod lut;
mod observer;
mod remap;
mod runner;
mod sequencer;
mod stats;

pub use accumulator::{Accumulation, FeatureAccumulator};
pub use codec::{
    parse_records, records_to_bytes, AerCodec, AerWord, Camera, DecodedEvent, EventCodec,
    Polarity, RECORD_BYTES,
};
pub use config::{ExtractorConfig, BASELINE, MAX_GRID_SIZE};
pub use decay::DecayPass;
pub use error::{ConfigError, ExtractorError, LutError, RunnerError};
pub use extractor::{CycleOutcome, ExtractorState, FeatureExtractor};
pub use filter::{EventFilter, FilteredEvent, SaturationThresholds, StagedEvent};
pub use grid::{ByteGrid, StereoMaps};
pub use lut::{LookupTable, LUT_SLOTS, UNMAPPED};
pub use observer::{
    ChannelObserver, ExtractorEvent, ExtractorObserver, FnObserver, ObserverSet, OutputKind,
};
pub use remap::{FeatureCell, Remapper, Remapping};
pub use runner::{CycleRunner, IngestSlot};
pub use sequencer::{
    initial_states, Admission, SequenceReport, Sequencer, TimestampState, TIMESTAMP_FLAG,
};
pub use stats::{CycleStats, ExtractorStats};
