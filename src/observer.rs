//! Observer pattern for extractor outputs - the publish boundaries.
//!
//! At the end of every active cycle the extractor publishes both activity
//! maps and both feature maps to every observer, then the filtered event
//! buffer to observers that want it. Observers never see a half-updated map:
//! everything they receive is a snapshot taken after the cycle committed.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::codec::{AerWord, Camera};
use crate::grid::ByteGrid;
use crate::stats::CycleStats;

/// Which publish boundary an event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputKind {
    ActivityMap,
    FeatureMap,
    FilteredEvents,
    CycleStats,
}

impl OutputKind {
    pub const ALL: [OutputKind; 4] = [
        OutputKind::ActivityMap,
        OutputKind::FeatureMap,
        OutputKind::FilteredEvents,
        OutputKind::CycleStats,
    ];
}

/// Event published by the extractor.
#[derive(Clone, Debug)]
pub enum ExtractorEvent {
    /// Raw activity of one camera (retina resolution).
    ActivityMap {
        camera: Camera,
        map: Arc<ByteGrid>,
        cycle: u64,
    },
    /// Pooled feature activity of one camera (feature resolution).
    FeatureMap {
        camera: Camera,
        map: Arc<ByteGrid>,
        cycle: u64,
    },
    /// Re-encoded saturated events, in input order. Never empty.
    FilteredEvents { events: Arc<[AerWord]>, cycle: u64 },
    /// Counters of the cycle that just committed.
    CycleComplete { stats: CycleStats },
}

impl ExtractorEvent {
    pub fn kind(&self) -> OutputKind {
        match self {
            ExtractorEvent::ActivityMap { .. } => OutputKind::ActivityMap,
            ExtractorEvent::FeatureMap { .. } => OutputKind::FeatureMap,
            ExtractorEvent::FilteredEvents { .. } => OutputKind::FilteredEvents,
            ExtractorEvent::CycleComplete { .. } => OutputKind::CycleStats,
        }
    }
}

/// Observer that receives extractor events
pub trait ExtractorObserver: Send + Sync {
    /// Called when an event is published
    fn on_event(&self, event: ExtractorEvent);

    /// Whether this observer subscribes to `kind`.
    ///
    /// The filtered event stream is only encoded when at least one observer
    /// wants it.
    fn wants(&self, _kind: OutputKind) -> bool {
        true
    }
}

/// Function-based observer for simple cases
pub struct FnObserver<F: Fn(ExtractorEvent) + Send + Sync>(pub F);

impl<F: Fn(ExtractorEvent) + Send + Sync> ExtractorObserver for FnObserver<F> {
    fn on_event(&self, event: ExtractorEvent) {
        (self.0)(event);
    }
}

/// Channel-based observer - sends events to a channel
pub struct ChannelObserver {
    sender: Sender<ExtractorEvent>,
    kinds: Vec<OutputKind>,
}

impl ChannelObserver {
    /// Subscribe to every output.
    pub fn new(sender: Sender<ExtractorEvent>) -> Self {
        Self {
            sender,
            kinds: OutputKind::ALL.to_vec(),
        }
    }

    /// Subscribe to the listed outputs only.
    pub fn with_kinds(sender: Sender<ExtractorEvent>, kinds: &[OutputKind]) -> Self {
        Self {
            sender,
            kinds: kinds.to_vec(),
        }
    }
}

impl ExtractorObserver for ChannelObserver {
    fn on_event(&self, event: ExtractorEvent) {
        let _ = self.sender.send(event);
    }

    fn wants(&self, kind: OutputKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Registered observers.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn ExtractorObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn ExtractorObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Number of observers subscribed to `kind`.
    pub fn subscribers(&self, kind: OutputKind) -> usize {
        self.observers.iter().filter(|o| o.wants(kind)).count()
    }

    /// Deliver `event` to every observer that wants its kind.
    pub fn publish(&self, event: ExtractorEvent) {
        let kind = event.kind();
        for observer in self.observers.iter().filter(|o| o.wants(kind)) {
            observer.on_event(event.clone());
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_channel_observer_filters_kinds() {
        let (tx, rx) = channel();
        let mut set = ObserverSet::new();
        set.subscribe(Arc::new(ChannelObserver::with_kinds(tx, &[OutputKind::FilteredEvents])));

        assert_eq!(set.subscribers(OutputKind::FilteredEvents), 1);
        assert_eq!(set.subscribers(OutputKind::ActivityMap), 0);

        set.publish(ExtractorEvent::ActivityMap {
            camera: Camera::Left,
            map: Arc::new(ByteGrid::square(4, 127)),
            cycle: 1,
        });
        set.publish(ExtractorEvent::FilteredEvents {
            events: Arc::from(vec![AerWord::new(1, 2)]),
            cycle: 1,
        });

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind(), OutputKind::FilteredEvents);
    }

    #[test]
    fn test_fn_observer_wants_everything() {
        let observer = FnObserver(|_event| {});
        for kind in OutputKind::ALL {
            assert!(observer.wants(kind));
        }
    }
}
