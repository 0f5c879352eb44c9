//! Cycle diagnostics.

use crate::sequencer::SequenceReport;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Counters for one committed cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CycleStats {
    pub cycle: u64,
    /// Complete records in the ingest buffer.
    pub records: usize,
    /// Trailing ingest bytes that did not form a record.
    pub truncated_bytes: usize,
    /// Records past the ingest capacity, never sequenced.
    pub dropped_records: usize,
    pub accepted: usize,
    pub stale: usize,
    pub unstamped: usize,
    pub wraparounds: usize,
    pub undetected_wraparounds: usize,
    pub half_switches: usize,
    /// Accepted records the codec refused.
    pub decode_faults: usize,
    pub left_events: usize,
    pub right_events: usize,
    /// Sentinel slots under the odd-x rule.
    pub unmapped_slots: usize,
    /// Events whose every slot was a sentinel (odd x).
    pub unmapped_events: usize,
    /// Mapped slots decoding outside the feature grid.
    pub out_of_grid: usize,
    /// Events whose mirrored coordinate missed the table.
    pub off_table: usize,
    pub feature_writes: usize,
    pub filtered: usize,
    pub filtered_overflow: usize,
    /// Filtered events actually handed to observers.
    pub published_events: usize,
}

impl CycleStats {
    pub(crate) fn absorb_sequence(&mut self, report: &SequenceReport) {
        self.accepted = report.accepted;
        self.stale = report.stale;
        self.unstamped = report.unstamped;
        self.wraparounds = report.wraparounds;
        self.undetected_wraparounds = report.undetected_wraparounds;
        self.half_switches = report.half_switches;
    }

    /// Events that made it through decoding.
    pub fn decoded(&self) -> usize {
        self.left_events + self.right_events
    }
}

impl std::fmt::Display for CycleStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cycle {}: {} records, {} accepted (L={} R={}), {} stale, {} unmapped, {} filtered",
            self.cycle,
            self.records,
            self.accepted,
            self.left_events,
            self.right_events,
            self.stale,
            self.unmapped_events,
            self.filtered
        )
    }
}

/// Running totals since the extractor was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExtractorStats {
    pub cycles: u64,
    pub idle_cycles: u64,
    pub cancelled_cycles: u64,
    pub records: u64,
    pub dropped_records: u64,
    pub accepted: u64,
    pub stale: u64,
    pub wraparounds: u64,
    pub undetected_wraparounds: u64,
    pub decode_faults: u64,
    pub unmapped_events: u64,
    pub out_of_grid: u64,
    pub filtered: u64,
    pub filtered_overflow: u64,
    pub published_events: u64,
}

impl ExtractorStats {
    pub(crate) fn add(&mut self, c: &CycleStats) {
        self.cycles += 1;
        self.records += c.records as u64;
        self.dropped_records += c.dropped_records as u64;
        self.accepted += c.accepted as u64;
        self.stale += c.stale as u64;
        self.wraparounds += c.wraparounds as u64;
        self.undetected_wraparounds += c.undetected_wraparounds as u64;
        self.decode_faults += c.decode_faults as u64;
        self.unmapped_events += c.unmapped_events as u64;
        self.out_of_grid += c.out_of_grid as u64;
        self.filtered += c.filtered as u64;
        self.filtered_overflow += c.filtered_overflow as u64;
        self.published_events += c.published_events as u64;
    }

    /// Fraction of ingested records that were accepted.
    pub fn acceptance_ratio(&self) -> f32 {
        if self.records == 0 {
            0.0
        } else {
            self.accepted as f32 / self.records as f32
        }
    }
}

impl std::fmt::Display for ExtractorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Cycles: {} active, {} idle, {} cancelled",
            self.cycles, self.idle_cycles, self.cancelled_cycles
        )?;
        writeln!(
            f,
            "  Records: {} ({} accepted, {:.1}%), {} stale",
            self.records,
            self.accepted,
            self.acceptance_ratio() * 100.0,
            self.stale
        )?;
        writeln!(
            f,
            "  Wraparounds: {} marked, {} undetected",
            self.wraparounds, self.undetected_wraparounds
        )?;
        writeln!(
            f,
            "  Decode faults: {}, unmapped: {}, out of grid: {}",
            self.decode_faults, self.unmapped_events, self.out_of_grid
        )?;
        write!(
            f,
            "  Filtered: {} staged, {} dropped, {} published",
            self.filtered, self.filtered_overflow, self.published_events
        )
    }
}
