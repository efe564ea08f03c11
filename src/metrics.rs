//! Metric primitives.
//!
//! Counters and histogram buckets accumulate into two-slot windows: one slot
//! keeps the running total, the other remembers where the previous reporting
//! pass left off. Closing a window is a single atomic swap, so recording
//! threads never block on a flush.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::buckets::{duration_bucket_index, value_bucket_index, BucketPair, Buckets};
use crate::reporter::StatsReporter;
use crate::Tags;

/// Two-slot accumulator. `curr` only ever grows; `prev` marks the value
/// `curr` held when the window was last closed.
#[derive(Debug, Default)]
pub(crate) struct WindowCell {
    prev: AtomicI64,
    curr: AtomicI64,
}

impl WindowCell {
    fn add(&self, delta: i64) {
        self.curr.fetch_add(delta, Ordering::Relaxed);
    }

    /// Delta accumulated since the window was last closed, without closing it.
    fn peek(&self) -> i64 {
        self.curr.load(Ordering::Relaxed) - self.prev.load(Ordering::Relaxed)
    }

    /// Close the window: return the delta since the previous close and start
    /// the next window at the point this one observed.
    fn take(&self) -> i64 {
        let curr = self.curr.load(Ordering::Relaxed);
        let prev = self.prev.swap(curr, Ordering::AcqRel);
        curr - prev
    }
}

/// Monotonically adjusted count reported as per-window deltas.
///
/// Clones share the same accumulator, so a counter handle is cheap to pass
/// around and safe to update from any thread.
#[derive(Clone, Debug)]
pub struct Counter {
    cell: Arc<WindowCell>,
}

impl Counter {
    pub(crate) fn new() -> Self {
        Counter {
            cell: Arc::new(WindowCell::default()),
        }
    }

    /// Adjust the count. Negative deltas are allowed.
    pub fn inc(&self, delta: i64) {
        self.cell.add(delta);
    }

    pub(crate) fn snapshot_value(&self, reset: bool) -> i64 {
        if reset {
            self.cell.take()
        } else {
            self.cell.peek()
        }
    }

    pub(crate) fn report(&self, name: &str, tags: &Tags, reporter: &dyn StatsReporter) {
        let delta = self.cell.take();
        if delta != 0 {
            reporter.report_counter(name, tags, delta);
        }
    }
}

#[derive(Debug, Default)]
struct GaugeCore {
    bits: AtomicU64,
    updated: AtomicBool,
}

/// Last-write-wins floating point value.
#[derive(Clone, Debug)]
pub struct Gauge {
    core: Arc<GaugeCore>,
}

impl Gauge {
    pub(crate) fn new() -> Self {
        Gauge {
            core: Arc::new(GaugeCore::default()),
        }
    }

    pub fn update(&self, value: f64) {
        self.core.bits.store(value.to_bits(), Ordering::Relaxed);
        self.core.updated.store(true, Ordering::Release);
    }

    pub(crate) fn snapshot_value(&self) -> f64 {
        f64::from_bits(self.core.bits.load(Ordering::Relaxed))
    }

    /// Emits only when the gauge moved since the previous pass.
    pub(crate) fn report(&self, name: &str, tags: &Tags, reporter: &dyn StatsReporter) {
        if self.core.updated.swap(false, Ordering::AcqRel) {
            reporter.report_gauge(name, tags, self.snapshot_value());
        }
    }
}

pub(crate) struct TimerCore {
    name: String,
    tags: Arc<Tags>,
    reporter: Option<Arc<dyn StatsReporter>>,
    unreported: Mutex<Vec<Duration>>,
}

impl TimerCore {
    fn record(&self, interval: Duration) {
        match &self.reporter {
            Some(reporter) => reporter.report_timer(&self.name, &self.tags, interval),
            None => self.unreported.lock().push(interval),
        }
    }
}

/// Records observed durations.
///
/// With a reporting backend attached each observation is pushed as it is
/// recorded. Without one, observations buffer until a resetting snapshot
/// drains them.
#[derive(Clone)]
pub struct Timer {
    core: Arc<TimerCore>,
}

impl Timer {
    pub(crate) fn new(
        name: String,
        tags: Arc<Tags>,
        reporter: Option<Arc<dyn StatsReporter>>,
    ) -> Self {
        Timer {
            core: Arc::new(TimerCore {
                name,
                tags,
                reporter,
                unreported: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn record(&self, interval: Duration) {
        self.core.record(interval);
    }

    /// Start a stopwatch that records into this timer when stopped.
    pub fn start(&self) -> Stopwatch {
        Stopwatch::new(Instant::now(), self.core.clone())
    }

    pub(crate) fn snapshot_values(&self, reset: bool) -> Vec<Duration> {
        let mut unreported = self.core.unreported.lock();
        if reset {
            std::mem::take(&mut *unreported)
        } else {
            unreported.clone()
        }
    }
}

pub(crate) struct HistogramCore {
    buckets: Buckets,
    pairs: Vec<BucketPair>,
    // Sorted upper bounds of every pair but the last, the classification keys.
    value_bounds: SmallVec<[f64; 16]>,
    duration_bounds: SmallVec<[Duration; 16]>,
    cells: SmallVec<[WindowCell; 16]>,
}

impl HistogramCore {
    fn new(buckets: Buckets) -> Self {
        let pairs = buckets.bucket_pairs();
        let inner = &pairs[..pairs.len() - 1];
        let value_bounds = inner.iter().map(BucketPair::upper_bound_value).collect();
        let duration_bounds = inner.iter().map(BucketPair::upper_bound_duration).collect();
        let cells = (0..pairs.len()).map(|_| WindowCell::default()).collect();
        HistogramCore {
            buckets,
            pairs,
            value_bounds,
            duration_bounds,
            cells,
        }
    }

    fn is_duration_domain(&self) -> bool {
        matches!(self.buckets, Buckets::Durations(_))
    }

    fn record_value(&self, value: f64) {
        let idx = value_bucket_index(&self.value_bounds, value);
        self.cells[idx].add(1);
    }

    fn record_duration(&self, interval: Duration) {
        let idx = duration_bucket_index(&self.duration_bounds, interval);
        self.cells[idx].add(1);
    }

    fn report(&self, name: &str, tags: &Tags, reporter: &dyn StatsReporter) {
        let durations = self.is_duration_domain();
        for (cell, pair) in self.cells.iter().zip(&self.pairs) {
            let samples = cell.take();
            if samples == 0 {
                continue;
            }
            if durations {
                reporter.report_histogram_duration_samples(name, tags, pair, samples);
            } else {
                reporter.report_histogram_value_samples(name, tags, pair, samples);
            }
        }
    }

    /// Per-bucket counts keyed by upper bound, zero counts included. Only the
    /// list matching the boundary domain is populated.
    fn snapshot_buckets(&self, reset: bool) -> (Vec<(f64, i64)>, Vec<(Duration, i64)>) {
        let counts = self
            .cells
            .iter()
            .map(|cell| if reset { cell.take() } else { cell.peek() });
        if self.is_duration_domain() {
            let durations = self
                .pairs
                .iter()
                .map(BucketPair::upper_bound_duration)
                .zip(counts)
                .collect();
            (Vec::new(), durations)
        } else {
            let values = self
                .pairs
                .iter()
                .map(BucketPair::upper_bound_value)
                .zip(counts)
                .collect();
            (values, Vec::new())
        }
    }
}

/// Counts samples into fixed buckets.
///
/// The boundary list is fixed at construction; recording is a binary search
/// plus one atomic add. Samples above every boundary land in the implicit
/// bucket reaching to infinity.
#[derive(Clone)]
pub struct Histogram {
    core: Arc<HistogramCore>,
}

impl Histogram {
    pub(crate) fn new(buckets: Buckets) -> Self {
        Histogram {
            core: Arc::new(HistogramCore::new(buckets)),
        }
    }

    pub fn record_value(&self, value: f64) {
        self.core.record_value(value);
    }

    pub fn record_duration(&self, interval: Duration) {
        self.core.record_duration(interval);
    }

    /// Start a stopwatch that records the elapsed duration into this
    /// histogram when stopped.
    pub fn start(&self) -> Stopwatch {
        Stopwatch::new(Instant::now(), self.core.clone())
    }

    pub(crate) fn buckets(&self) -> &Buckets {
        &self.core.buckets
    }

    pub(crate) fn report(&self, name: &str, tags: &Tags, reporter: &dyn StatsReporter) {
        self.core.report(name, tags, reporter);
    }

    pub(crate) fn snapshot_buckets(&self, reset: bool) -> (Vec<(f64, i64)>, Vec<(Duration, i64)>) {
        self.core.snapshot_buckets(reset)
    }
}

/// Sink for a finished [`Stopwatch`].
pub trait StopwatchRecorder: Send + Sync {
    fn record_stopwatch(&self, start: Instant);
}

impl StopwatchRecorder for TimerCore {
    fn record_stopwatch(&self, start: Instant) {
        self.record(start.elapsed());
    }
}

impl StopwatchRecorder for HistogramCore {
    fn record_stopwatch(&self, start: Instant) {
        self.record_duration(start.elapsed());
    }
}

/// Measures the interval between its creation and [`stop`](Stopwatch::stop).
#[must_use = "a stopwatch records nothing until it is stopped"]
pub struct Stopwatch {
    start: Instant,
    recorder: Arc<dyn StopwatchRecorder>,
}

impl Stopwatch {
    pub fn new(start: Instant, recorder: Arc<dyn StopwatchRecorder>) -> Self {
        Stopwatch { start, recorder }
    }

    /// Record the elapsed interval into the recorder that started this
    /// stopwatch.
    pub fn stop(self) {
        self.recorder.record_stopwatch(self.start);
    }
}
