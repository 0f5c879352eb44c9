//! Fixed-rate cycle runner.
//!
//! Drives a [`FeatureExtractor`] from a dedicated thread at the configured
//! rate. Producers hand raw buffers to the [`IngestSlot`]; each tick takes
//! whatever is there (latest wins) or runs on an empty buffer so the maps
//! keep decaying.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::codec::{AerCodec, EventCodec};
use crate::error::RunnerError;
use crate::extractor::{CycleOutcome, FeatureExtractor};

/// Hand-off point between the sensor reader and the cycle thread.
///
/// Holds at most one pending buffer. A newer buffer replaces an unconsumed
/// one; the replaced buffer is counted as overwritten.
#[derive(Debug, Default)]
pub struct IngestSlot {
    pending: Mutex<Option<Vec<u8>>>,
    overwritten: AtomicU64,
}

impl IngestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposit a raw buffer for the next tick.
    pub fn put(&self, raw: Vec<u8>) {
        if self.pending.lock().replace(raw).is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take the pending buffer, if any.
    pub fn take(&self) -> Option<Vec<u8>> {
        self.pending.lock().take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Buffers replaced before a tick consumed them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

/// Runs extractor cycles on a background thread.
pub struct CycleRunner<C: EventCodec + Send + 'static = AerCodec> {
    extractor: Arc<Mutex<FeatureExtractor<C>>>,
    ingest: Arc<IngestSlot>,
    period: Duration,
    running: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl<C: EventCodec + Send + 'static> CycleRunner<C> {
    /// Wrap an extractor. The tick period comes from its configuration.
    pub fn new(extractor: FeatureExtractor<C>) -> Self {
        let period = extractor.config().period();
        Self {
            extractor: Arc::new(Mutex::new(extractor)),
            ingest: Arc::new(IngestSlot::new()),
            period,
            running: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            ticks: Arc::new(AtomicU64::new(0)),
            thread_handle: None,
        }
    }

    /// Shared handle to the extractor, for inspection between ticks.
    pub fn extractor(&self) -> Arc<Mutex<FeatureExtractor<C>>> {
        self.extractor.clone()
    }

    /// Shared handle to the ingest slot, for the producer side.
    pub fn ingest(&self) -> Arc<IngestSlot> {
        self.ingest.clone()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Switch the extractor between IDLE and ACTIVE.
    pub fn set_idle(&self, idle: bool) {
        self.extractor.lock().set_idle(idle);
    }

    /// Start ticking in a background thread.
    pub fn start(&mut self) -> Result<(), RunnerError> {
        if self.running.load(Ordering::Acquire) {
            return Err(RunnerError::AlreadyRunning);
        }

        info!(period_ms = self.period.as_secs_f64() * 1000.0, "starting cycle runner");
        self.running.store(true, Ordering::Release);
        self.cancel.store(false, Ordering::Release);

        let extractor = self.extractor.clone();
        let ingest = self.ingest.clone();
        let running = self.running.clone();
        let cancel = self.cancel.clone();
        let ticks = self.ticks.clone();
        let period = self.period;

        let spawned = thread::Builder::new()
            .name("ef-cycle".to_string())
            .spawn(move || cycle_loop(extractor, ingest, period, running, cancel, ticks));

        match spawned {
            Ok(handle) => {
                self.thread_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(RunnerError::Spawn(e))
            }
        }
    }

    /// Stop the loop. An in-flight cycle is cancelled and not committed.
    pub fn stop(&mut self) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }

        info!("stopping cycle runner");
        self.cancel.store(true, Ordering::Release);
        self.running.store(false, Ordering::Release);

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("cycle thread panicked during shutdown");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ticks executed since the runner was created, idle ones included.
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl<C: EventCodec + Send + 'static> Drop for CycleRunner<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn cycle_loop<C: EventCodec>(
    extractor: Arc<Mutex<FeatureExtractor<C>>>,
    ingest: Arc<IngestSlot>,
    period: Duration,
    running: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
) {
    let mut overruns = 0u64;
    let mut raw = Vec::new();

    while running.load(Ordering::Acquire) {
        let tick_start = Instant::now();

        match ingest.take() {
            Some(buffer) => raw = buffer,
            None => raw.clear(),
        }

        let outcome = extractor.lock().run_cycle_cancellable(&raw, &cancel);
        ticks.fetch_add(1, Ordering::AcqRel);
        if let CycleOutcome::Cancelled = outcome {
            break;
        }

        let elapsed = tick_start.elapsed();
        match period.checked_sub(elapsed) {
            Some(remaining) => thread::sleep(remaining),
            None => {
                overruns += 1;
                debug!(elapsed_us = elapsed.as_micros() as u64, overruns, "cycle overran its period");
            }
        }
    }

    info!(ticks = ticks.load(Ordering::Acquire), overruns, "cycle loop stopped");
}
