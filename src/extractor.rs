//! Feature Extractor - the cycle orchestrator.
//!
//! One call to [`FeatureExtractor::run_cycle`] is one tick:
//!
//! 1. Ingest: parse the raw buffer into records
//! 2. Sequence: per-camera ordering and wraparound resolution
//! 3. Decode, remap and accumulate every accepted record
//! 4. Decay all four maps
//! 5. Commit, then publish filtered events and the maps
//!
//! Steps 2-4 run against scratch copies of the maps and timestamp state. A
//! cancelled cycle simply never commits, so published state is always the
//! result of whole cycles.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::accumulator::FeatureAccumulator;
use crate::codec::{parse_records, AerCodec, AerWord, Camera, EventCodec};
use crate::config::ExtractorConfig;
use crate::decay::DecayPass;
use crate::error::ExtractorError;
use crate::filter::{EventFilter, SaturationThresholds};
use crate::grid::{ByteGrid, StereoMaps};
use crate::lut::LookupTable;
use crate::observer::{ExtractorEvent, ExtractorObserver, ObserverSet, OutputKind};
use crate::remap::Remapper;
use crate::sequencer::{Sequencer, TimestampState};
use crate::stats::{CycleStats, ExtractorStats};

/// Orchestrator state, switched by the idle flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractorState {
    /// Ticks are no-ops; maps are held.
    Idle,
    /// Ticks run the full pipeline.
    Active,
}

/// What a tick did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Extractor idle; nothing processed or published.
    Idle,
    /// Cycle committed and published.
    Completed(CycleStats),
    /// Cycle abandoned; committed state unchanged.
    Cancelled,
}

impl CycleOutcome {
    pub fn stats(&self) -> Option<&CycleStats> {
        match self {
            CycleOutcome::Completed(stats) => Some(stats),
            _ => None,
        }
    }
}

/// Stereo AER feature extractor.
pub struct FeatureExtractor<C: EventCodec = AerCodec> {
    config: ExtractorConfig,
    codec: C,
    lut: LookupTable,

    sequencer: Sequencer,
    remapper: Remapper,
    accumulator: FeatureAccumulator,
    decay: DecayPass,

    /// Committed state, what observers have seen.
    maps: StereoMaps,
    timestamps: [TimestampState; 2],

    /// Per-cycle working buffers.
    scratch: StereoMaps,
    ordered: Vec<AerWord>,
    filter: EventFilter,

    observers: ObserverSet,
    state: ExtractorState,
    cycle: u64,
    totals: ExtractorStats,
    last: Option<CycleStats>,
}

impl FeatureExtractor<AerCodec> {
    /// Create an extractor with the standard codec.
    pub fn new(config: ExtractorConfig, lut: LookupTable) -> Result<Self, ExtractorError> {
        let codec = AerCodec::new(config.retina_size, config.address_shift);
        Self::with_codec(config, lut, codec)
    }
}

impl<C: EventCodec> FeatureExtractor<C> {
    /// Create an extractor with a custom codec.
    ///
    /// Fails if the configuration is invalid or the table was built for a
    /// different geometry; the extractor never becomes active in that case.
    pub fn with_codec(
        config: ExtractorConfig,
        lut: LookupTable,
        codec: C,
    ) -> Result<Self, ExtractorError> {
        config.validate()?;
        if lut.retina_size() != config.retina_size || lut.feature_size() != config.feature_size {
            return Err(ExtractorError::LutMismatch {
                lut_retina: lut.retina_size(),
                lut_feature: lut.feature_size(),
                retina: config.retina_size,
                feature: config.feature_size,
            });
        }

        let maps = StereoMaps::new(config.retina_size, config.feature_size);
        let state = if config.idle {
            ExtractorState::Idle
        } else {
            ExtractorState::Active
        };

        info!(
            retina = config.retina_size,
            feature = config.feature_size,
            rate_hz = config.rate_hz,
            mapped = lut.mapped_count(),
            stereo_features = config.stereo_features,
            "feature extractor ready"
        );

        Ok(Self {
            sequencer: Sequencer::new(config.half_epoch_boundary, config.wrap_marker),
            remapper: Remapper::for_table(&lut),
            accumulator: FeatureAccumulator::new(
                config.step,
                SaturationThresholds::new(config.low_threshold, config.high_threshold),
            ),
            decay: DecayPass::new(config.decay_quantum),
            scratch: maps.clone(),
            maps,
            timestamps: [TimestampState::new(); 2],
            ordered: Vec::with_capacity(config.buffer_events),
            filter: EventFilter::new(config.max_filtered_events),
            observers: ObserverSet::new(),
            state,
            cycle: 0,
            totals: ExtractorStats::default(),
            last: None,
            config,
            codec,
            lut,
        })
    }

    // =========================================================================
    // SUBSCRIPTION & CONTROL
    // =========================================================================

    /// Subscribe an observer to the publish boundaries.
    pub fn subscribe(&mut self, observer: Arc<dyn ExtractorObserver>) {
        self.observers.subscribe(observer);
    }

    /// Switch between IDLE and ACTIVE. Takes effect on the next tick.
    pub fn set_idle(&mut self, idle: bool) {
        let next = if idle {
            ExtractorState::Idle
        } else {
            ExtractorState::Active
        };
        if next != self.state {
            info!(from = ?self.state, to = ?next, "extractor state change");
            self.state = next;
        }
        self.config.idle = idle;
    }

    pub fn state(&self) -> ExtractorState {
        self.state
    }

    /// Return maps and timestamp state to their initial values.
    pub fn reset(&mut self) {
        self.maps.reset();
        self.scratch.reset();
        self.timestamps = [TimestampState::new(); 2];
    }

    // =========================================================================
    // CYCLE
    // =========================================================================

    /// Run one tick over a packed raw buffer.
    pub fn run_cycle(&mut self, raw: &[u8]) -> CycleOutcome {
        self.run_cycle_cancellable(raw, &AtomicBool::new(false))
    }

    /// Run one tick, abandoning it if `cancel` becomes set before commit.
    pub fn run_cycle_cancellable(&mut self, raw: &[u8], cancel: &AtomicBool) -> CycleOutcome {
        if self.state == ExtractorState::Idle {
            self.totals.idle_cycles += 1;
            return CycleOutcome::Idle;
        }
        let (words, truncated) = parse_records(raw);
        self.process(&words, truncated, cancel)
    }

    /// Run one tick over already parsed records.
    pub fn run_cycle_records(&mut self, words: &[AerWord]) -> CycleOutcome {
        if self.state == ExtractorState::Idle {
            self.totals.idle_cycles += 1;
            return CycleOutcome::Idle;
        }
        self.process(words, 0, &AtomicBool::new(false))
    }

    fn process(&mut self, words: &[AerWord], truncated: usize, cancel: &AtomicBool) -> CycleOutcome {
        let capacity = self.config.buffer_events;
        let (words, dropped) = if words.len() > capacity {
            (&words[..capacity], words.len() - capacity)
        } else {
            (words, 0)
        };

        let mut stats = CycleStats {
            cycle: self.cycle + 1,
            records: words.len(),
            truncated_bytes: truncated,
            dropped_records: dropped,
            ..CycleStats::default()
        };

        // Work on copies; nothing below touches committed state.
        self.scratch.copy_from(&self.maps);
        let mut timestamps = self.timestamps;
        self.ordered.clear();
        self.filter.clear();

        let report = self.sequencer
            .sequence(&self.codec, words, &mut timestamps, &mut self.ordered);
        stats.absorb_sequence(&report);

        let mut cancelled = false;
        for word in &self.ordered {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }

            let Some(event) = self.codec.decode(*word) else {
                stats.decode_faults += 1;
                continue;
            };
            match event.camera {
                Camera::Left => stats.left_events += 1,
                Camera::Right => stats.right_events += 1,
            }

            let remapping = self.remapper.remap(&self.lut, &event);
            stats.unmapped_slots += remapping.unmapped_slots as usize;
            stats.unmapped_events += usize::from(remapping.unmapped_event);
            stats.out_of_grid += remapping.out_of_grid as usize;
            stats.off_table += usize::from(remapping.off_table);

            // RIGHT remaps are computed for the diagnostics but only written
            // when stereo features are enabled.
            let update_features = event.camera == Camera::Left || self.config.stereo_features;
            let outcome = self.accumulator.accumulate(
                &mut self.scratch,
                &event,
                &remapping,
                update_features,
                &mut self.filter,
            );
            stats.feature_writes += outcome.feature_writes as usize;
        }

        if cancelled {
            return self.abandon(stats.cycle);
        }

        self.decay.apply_all(&mut self.scratch);

        if cancel.load(Ordering::Relaxed) {
            return self.abandon(stats.cycle);
        }

        // Commit.
        mem::swap(&mut self.maps, &mut self.scratch);
        self.timestamps = timestamps;
        self.cycle = stats.cycle;
        stats.filtered = self.filter.len();
        stats.filtered_overflow = self.filter.overflow();

        stats.published_events = self.publish_filtered();
        self.publish_maps();
        self.observers
            .publish(ExtractorEvent::CycleComplete { stats });

        debug!(
            cycle = stats.cycle,
            records = stats.records,
            accepted = stats.accepted,
            decoded = stats.decoded(),
            left = stats.left_events,
            right = stats.right_events,
            stale = stats.stale,
            unmapped = stats.unmapped_events,
            filtered = stats.filtered,
            "cycle committed"
        );

        self.totals.add(&stats);
        self.last = Some(stats);
        CycleOutcome::Completed(stats)
    }

    fn abandon(&mut self, cycle: u64) -> CycleOutcome {
        info!(cycle, "cycle cancelled, state not committed");
        self.filter.clear();
        self.totals.cancelled_cycles += 1;
        CycleOutcome::Cancelled
    }

    /// Encode and publish the filtered buffer. Returns the number published.
    fn publish_filtered(&self) -> usize {
        if self.filter.is_empty() || self.observers.subscribers(OutputKind::FilteredEvents) == 0 {
            return 0;
        }
        let events: Arc<[AerWord]> = self.filter.encode_words(&self.codec).into();
        let count = events.len();
        self.observers.publish(ExtractorEvent::FilteredEvents {
            events,
            cycle: self.cycle,
        });
        count
    }

    fn publish_maps(&self) {
        if self.observers.subscribers(OutputKind::ActivityMap) > 0 {
            for camera in Camera::BOTH {
                self.observers.publish(ExtractorEvent::ActivityMap {
                    camera,
                    map: Arc::new(self.maps.activity(camera).clone()),
                    cycle: self.cycle,
                });
            }
        }
        if self.observers.subscribers(OutputKind::FeatureMap) > 0 {
            for camera in Camera::BOTH {
                self.observers.publish(ExtractorEvent::FeatureMap {
                    camera,
                    map: Arc::new(self.maps.features(camera).clone()),
                    cycle: self.cycle,
                });
            }
        }
    }

    // =========================================================================
    // INSPECTION
    // =========================================================================

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn lut(&self) -> &LookupTable {
        &self.lut
    }

    /// Committed maps.
    pub fn maps(&self) -> &StereoMaps {
        &self.maps
    }

    pub fn activity_map(&self, camera: Camera) -> &ByteGrid {
        self.maps.activity(camera)
    }

    pub fn feature_map(&self, camera: Camera) -> &ByteGrid {
        self.maps.features(camera)
    }

    pub fn timestamp_state(&self, camera: Camera) -> TimestampState {
        self.timestamps[camera.index()]
    }

    /// Committed cycles so far.
    pub fn cycle_count(&self) -> u64 {
        self.cycle
    }

    pub fn stats(&self) -> &ExtractorStats {
        &self.totals
    }

    pub fn last_cycle(&self) -> Option<&CycleStats> {
        self.last.as_ref()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl<C: EventCodec> std::fmt::Debug for FeatureExtractor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("state", &self.state)
            .field("cycle", &self.cycle)
            .field("timestamps", &self.timestamps)
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}
