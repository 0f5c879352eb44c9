use std::sync::mpsc::channel;
use std::sync::Arc;

use event_feature_extractor::{
    records_to_bytes, AerCodec, AerWord, Camera, ChannelObserver, CycleOutcome, DecayPass,
    EventCodec, ExtractorConfig, ExtractorEvent, FeatureExtractor, LookupTable, OutputKind,
    Polarity, Remapper, Sequencer, TimestampState, BASELINE, LUT_SLOTS,
};
use proptest::prelude::*;

fn address(x: u32, y: u32, on: bool, camera: Camera) -> u32 {
    u32::from(on) | (x << 1) | (y << 8) | (u32::from(camera == Camera::Left) << 15)
}

fn left_on(x: u32, y: u32, ts: u32) -> AerWord {
    AerWord::new(address(x, y, true, Camera::Left), ts)
}

/// Table where LEFT raw pixel `(x, y)` maps to feature index `pos` through slot 0.
fn single_entry_lut(x: usize, y: usize, pos: usize) -> LookupTable {
    let mut lut = LookupTable::unmapped(128, 32);
    lut.set(0, 127 - x, y, Some(pos));
    lut
}

// =========================================================================
// SCENARIOS
// =========================================================================

#[test]
fn test_six_on_events_saturate_feature_cell() {
    let config = ExtractorConfig::default().with_decay_quantum(1);
    // feature index 32 → LEFT cell row 31, col 0
    let mut extractor = FeatureExtractor::new(config, single_entry_lut(40, 12, 32)).unwrap();
    let (tx, rx) = channel();
    extractor.subscribe(Arc::new(ChannelObserver::with_kinds(tx, &[OutputKind::FilteredEvents])));

    let words: Vec<_> = (1..=6).map(|i| left_on(40, 12, 0x8000_0000 + i)).collect();
    let stats = *extractor.run_cycle(&records_to_bytes(&words)).stats().unwrap();

    assert_eq!(stats.feature_writes, 6);
    assert_eq!(stats.filtered, 1);
    // 247 after accumulation, one decay step before publish
    assert_eq!(extractor.feature_map(Camera::Left).get(31, 0), Some(246));

    let events: Vec<_> = rx
        .try_iter()
        .filter_map(|e| match e {
            ExtractorEvent::FilteredEvents { events, .. } => Some(events),
            _ => None,
        })
        .collect();
    assert_eq!(events.len(), 1);
    let codec = AerCodec::default();
    let decoded = codec.decode(events[0][0]).unwrap();
    assert_eq!((decoded.x, decoded.y), (0, 31));
    assert_eq!(decoded.polarity, Polarity::On);
    assert_eq!(decoded.camera, Camera::Left);
    assert_eq!(decoded.timestamp, 0x8000_0006);
}

#[test]
fn test_wrap_marker_resets_timestamp_state() {
    let mut extractor =
        FeatureExtractor::new(ExtractorConfig::default(), LookupTable::unmapped(128, 32)).unwrap();

    extractor.run_cycle_records(&[left_on(2, 2, 0x8000_0500)]);
    assert_eq!(extractor.timestamp_state(Camera::Left).last_accepted, 0x8000_0500);

    let stats = *extractor
        .run_cycle_records(&[
            left_on(2, 2, 0x8800_0000),
            left_on(2, 2, 0x8000_0001),
            left_on(2, 2, 0x8000_0002),
        ])
        .stats()
        .unwrap();
    assert_eq!(stats.wraparounds, 1);
    assert_eq!(stats.accepted, 2);
    assert_eq!(extractor.timestamp_state(Camera::Left).last_accepted, 0x8000_0002);
}

#[test]
fn test_all_sentinel_odd_x_counts_unmapped() {
    let mut extractor =
        FeatureExtractor::new(ExtractorConfig::default(), LookupTable::unmapped(128, 32)).unwrap();

    // LEFT raw x = 8 mirrors to lookup x = 119, odd
    let stats = *extractor
        .run_cycle_records(&[left_on(8, 3, 0x8000_0001)])
        .stats()
        .unwrap();

    assert_eq!(stats.unmapped_events, 1);
    assert_eq!(stats.unmapped_slots, LUT_SLOTS);
    assert_eq!(stats.feature_writes, 0);
    assert!(extractor.feature_map(Camera::Left).is_uniform(BASELINE));
    assert!(extractor.feature_map(Camera::Right).is_uniform(BASELINE));
    // activity still records the event: 147 then one decay step
    assert_eq!(extractor.activity_map(Camera::Left).get(3, 8), Some(146));
}

#[test]
fn test_idle_cycle_is_a_no_op() {
    let mut extractor =
        FeatureExtractor::new(ExtractorConfig::default(), single_entry_lut(5, 5, 100)).unwrap();
    extractor.run_cycle_records(&[left_on(5, 5, 0x8000_0001)]);

    let (tx, rx) = channel();
    extractor.subscribe(Arc::new(ChannelObserver::new(tx)));
    extractor.set_idle(true);

    let before = extractor.maps().clone();
    let state = extractor.timestamp_state(Camera::Left);
    let raw = records_to_bytes(&[left_on(5, 5, 0x8000_0002)]);
    assert_eq!(extractor.run_cycle(&raw), CycleOutcome::Idle);

    assert_eq!(extractor.maps(), &before);
    assert_eq!(extractor.timestamp_state(Camera::Left), state);
    assert!(rx.try_recv().is_err());

    extractor.set_idle(false);
    assert!(matches!(extractor.run_cycle(&raw), CycleOutcome::Completed(_)));
    assert_eq!(rx.try_iter().count(), 5);
}

// =========================================================================
// CROSS-CYCLE BEHAVIOUR
// =========================================================================

#[test]
fn test_second_half_epoch_across_cycles() {
    let mut extractor =
        FeatureExtractor::new(ExtractorConfig::default(), LookupTable::unmapped(128, 32)).unwrap();

    extractor.run_cycle_records(&[left_on(1, 1, 0x8000_EF00)]);
    let stats = *extractor
        .run_cycle_records(&[left_on(1, 1, 0x8000_F000), left_on(1, 1, 0x8000_F010)])
        .stats()
        .unwrap();
    assert_eq!(stats.half_switches, 1);
    assert_eq!(stats.accepted, 1);
    assert!(!extractor.timestamp_state(Camera::Left).half_epoch);

    // falling below the boundary in the second half returns to the first
    // half; small stamps stay stale until a marker resets the state
    let stats = *extractor
        .run_cycle_records(&[left_on(1, 1, 0x8000_0010), left_on(1, 1, 0x8000_0011)])
        .stats()
        .unwrap();
    assert_eq!(stats.undetected_wraparounds, 1);
    assert_eq!(stats.accepted, 0);
    assert_eq!(stats.stale, 1);
    assert_eq!(
        extractor.timestamp_state(Camera::Left),
        TimestampState {
            last_accepted: 0x8000_F010,
            half_epoch: true,
        }
    );

    let stats = *extractor
        .run_cycle_records(&[left_on(1, 1, 0x8800_0000), left_on(1, 1, 0x8000_0012)])
        .stats()
        .unwrap();
    assert_eq!(stats.wraparounds, 1);
    assert_eq!(stats.accepted, 1);
    assert_eq!(extractor.timestamp_state(Camera::Left).last_accepted, 0x8000_0012);
}

#[test]
fn test_repeated_boundary_stamp_dropped() {
    let mut extractor =
        FeatureExtractor::new(ExtractorConfig::default(), LookupTable::unmapped(128, 32)).unwrap();
    let stats = *extractor
        .run_cycle_records(&[
            left_on(1, 1, 0x8000_EFFF),
            left_on(1, 1, 0x8000_F000),
            left_on(1, 1, 0x8000_F000),
            left_on(1, 1, 0x8000_F001),
        ])
        .stats()
        .unwrap();
    assert_eq!(stats.half_switches, 1);
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.stale, 1);
    assert_eq!(extractor.timestamp_state(Camera::Left).last_accepted, 0x8000_F001);
}

#[test]
fn test_shifted_addresses_sequence_per_camera() {
    let mut config = ExtractorConfig::default();
    config.address_shift = 4;
    // LEFT raw (1, 8) → lookup (126, 8); feature index 32 * 3 + 4 → column 4, row 29
    let mut lut = LookupTable::unmapped(128, 32);
    lut.set(0, 126, 8, Some(32 * 3 + 4));
    let mut extractor = FeatureExtractor::new(config, lut).unwrap();

    let codec = AerCodec::new(128, 4);
    let newer = codec.to_word(codec.encode(1, 8, Polarity::On, Camera::Left), 0x8000_0100);
    let older = codec.to_word(codec.encode(1, 0, Polarity::On, Camera::Left), 0x8000_0050);
    let right = codec.to_word(codec.encode(2, 2, Polarity::Off, Camera::Right), 0x8000_0060);
    let stats = *extractor.run_cycle_records(&[newer, older, right]).stats().unwrap();

    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.stale, 1);
    assert_eq!(stats.left_events, 1);
    assert_eq!(stats.right_events, 1);
    assert_eq!(stats.feature_writes, 1);
    assert_eq!(extractor.timestamp_state(Camera::Left).last_accepted, 0x8000_0100);
    assert_eq!(extractor.timestamp_state(Camera::Right).last_accepted, 0x8000_0060);
    assert_eq!(extractor.activity_map(Camera::Left).get(8, 1), Some(146));
    assert_eq!(extractor.activity_map(Camera::Left).get(0, 1), Some(BASELINE));
    assert_eq!(extractor.activity_map(Camera::Right).get(2, 2), Some(108));
    assert_eq!(extractor.feature_map(Camera::Left).get(29, 4), Some(146));
}

#[test]
fn test_maps_return_to_rest() {
    let mut extractor =
        FeatureExtractor::new(ExtractorConfig::default(), single_entry_lut(10, 10, 64)).unwrap();
    let words: Vec<_> = (1..=3).map(|i| left_on(10, 10, 0x8000_0000 + i)).collect();
    extractor.run_cycle_records(&words);
    assert!(!extractor.maps().at_rest());

    // 187 after one cycle → 60 more empty cycles
    for _ in 0..60 {
        extractor.run_cycle(&[]);
    }
    assert!(extractor.maps().at_rest());
    assert_eq!(extractor.stats().cycles, 61);
}

#[test]
fn test_right_camera_only_touches_activity_by_default() {
    let mut lut = LookupTable::unmapped(128, 32);
    // RIGHT raw (4, 6) mirrors to (124, 122)
    lut.set(2, 124, 122, Some(32 * 10 + 1));

    let word = AerWord::new(address(4, 6, false, Camera::Right), 0x8000_0001);
    let mut extractor = FeatureExtractor::new(ExtractorConfig::default(), lut.clone()).unwrap();
    let stats = *extractor.run_cycle_records(&[word]).stats().unwrap();
    assert_eq!(stats.right_events, 1);
    assert_eq!(stats.feature_writes, 0);
    assert_eq!(extractor.activity_map(Camera::Right).get(6, 4), Some(108));
    assert!(extractor.feature_map(Camera::Right).is_uniform(BASELINE));

    let config = ExtractorConfig::default().with_stereo_features(true);
    let mut extractor = FeatureExtractor::new(config, lut).unwrap();
    extractor.run_cycle_records(&[word]);
    // RIGHT indices decode transposed: column 32 - 10, row 1
    assert_eq!(extractor.feature_map(Camera::Right).get(1, 22), Some(108));
    assert!(extractor.feature_map(Camera::Left).is_uniform(BASELINE));
}

#[test]
fn test_truncated_tail_is_ignored() {
    let mut extractor =
        FeatureExtractor::new(ExtractorConfig::default(), LookupTable::unmapped(128, 32)).unwrap();
    let mut raw = records_to_bytes(&[left_on(1, 1, 0x8000_0001)]);
    raw.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

    let stats = *extractor.run_cycle(&raw).stats().unwrap();
    assert_eq!(stats.records, 1);
    assert_eq!(stats.truncated_bytes, 3);
    assert_eq!(stats.accepted, 1);
}

// =========================================================================
// PROPERTIES
// =========================================================================

fn arb_word() -> impl Strategy<Value = AerWord> {
    (0u32..128, 0u32..128, any::<bool>(), any::<bool>(), 0x8000_0001u32..0x8001_0000).prop_map(
        |(x, y, on, left, ts)| {
            let camera = if left { Camera::Left } else { Camera::Right };
            AerWord::new(address(x, y, on, camera), ts)
        },
    )
}

proptest! {
    #[test]
    fn prop_codec_roundtrip(x in 0u16..128, y in 0u16..128, on in any::<bool>(), left in any::<bool>()) {
        let codec = AerCodec::default();
        let polarity = Polarity::from_bit(on);
        let camera = Camera::from_bit(left);
        let word = codec.to_word(codec.encode(x, y, polarity, camera), 0x8000_0001);
        let event = codec.decode(word).unwrap();
        prop_assert_eq!((event.x, event.y, event.polarity, event.camera), (x, y, polarity, camera));
    }

    #[test]
    fn prop_decay_reaches_baseline(start in any::<u8>(), quantum in 1u8..=40) {
        let decay = DecayPass::new(quantum);
        let mut v = start;
        for _ in 0..decay.passes_to_rest(start) {
            v = decay.relax(v);
        }
        prop_assert_eq!(v, BASELINE);
        prop_assert_eq!(decay.relax(v), BASELINE);
    }

    #[test]
    fn prop_last_accepted_monotonic_in_half_epoch(stamps in prop::collection::vec(0x8000_0001u32..0x8000_F000, 1..200)) {
        let sequencer = Sequencer::default();
        let mut state = TimestampState::new();
        let mut previous = state.last_accepted;
        for ts in stamps {
            sequencer.admit(&mut state, ts);
            prop_assert!(state.half_epoch);
            prop_assert!(state.last_accepted >= previous);
            previous = state.last_accepted;
        }
    }

    #[test]
    fn prop_unmapped_table_touches_no_feature_cell(words in prop::collection::vec(arb_word(), 0..300)) {
        let config = ExtractorConfig::default().with_stereo_features(true);
        let mut extractor = FeatureExtractor::new(config, LookupTable::unmapped(128, 32)).unwrap();
        let stats = *extractor.run_cycle_records(&words).stats().unwrap();
        prop_assert_eq!(stats.feature_writes, 0);
        prop_assert!(extractor.feature_map(Camera::Left).is_uniform(BASELINE));
        prop_assert!(extractor.feature_map(Camera::Right).is_uniform(BASELINE));
    }

    #[test]
    fn prop_feature_cells_stay_on_grid(
        words in prop::collection::vec(arb_word(), 0..200),
        entries in prop::collection::vec((0usize..128, 0usize..128, 0usize..LUT_SLOTS, 0usize..1024), 0..64),
    ) {
        let mut lut = LookupTable::unmapped(128, 32);
        for (x, y, slot, pos) in entries {
            lut.set(slot, x, y, Some(pos));
        }
        let remapper = Remapper::for_table(&lut);
        let codec = AerCodec::default();
        for word in &words {
            let Some(event) = codec.decode(*word) else { continue };
            for cell in remapper.remap(&lut, &event).iter() {
                prop_assert!(cell.x < 32 && cell.y < 32);
            }
        }

        let config = ExtractorConfig::default().with_stereo_features(true);
        let mut extractor = FeatureExtractor::new(config, lut).unwrap();
        prop_assert!(extractor.run_cycle_records(&words).stats().is_some());
    }
}
