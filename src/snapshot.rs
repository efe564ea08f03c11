//! Point-in-time views of every metric registered under a scope graph.
//!
//! A snapshot is a plain data copy: reading one never blocks recording
//! threads, and a resetting snapshot closes the same windows a reporting
//! pass would, so pull-based collection composes with push-based flushing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::Tags;

/// Which metric families a resetting snapshot closes.
///
/// Gauges have no window to close and always carry their last written value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOptions {
    pub reset_counters: bool,
    pub reset_timers: bool,
    pub reset_histograms: bool,
}

impl ResetOptions {
    /// Close every window the snapshot touches.
    pub const ALL: ResetOptions = ResetOptions {
        reset_counters: true,
        reset_timers: true,
        reset_histograms: true,
    };
}

/// Identity shared by every snapshot entry.
pub trait Metadata {
    /// Fully qualified metric name, prefixes already applied.
    fn name(&self) -> &str;
    fn tags(&self) -> &Tags;
}

/// Snapshot map key for a metric: the name, a `+` separator, and the tags as
/// comma-joined `k=v` pairs in key order. A metric without tags keys as
/// `"name+"`.
pub fn key_for(name: &str, tags: &Tags) -> String {
    let mut key = String::with_capacity(name.len() + 1 + tags.len() * 8);
    key.push_str(name);
    key.push('+');
    for (i, (k, v)) in tags.iter().enumerate() {
        if i > 0 {
            key.push(',');
        }
        key.push_str(k);
        key.push('=');
        key.push_str(v);
    }
    key
}

#[derive(Debug, Clone)]
pub struct CounterSnapshot {
    name: String,
    tags: Arc<Tags>,
    value: i64,
}

impl CounterSnapshot {
    pub(crate) fn new(name: String, tags: Arc<Tags>, value: i64) -> Self {
        CounterSnapshot { name, tags, value }
    }

    /// Delta accumulated in the snapshotted window.
    pub fn value(&self) -> i64 {
        self.value
    }
}

impl Metadata for CounterSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

#[derive(Debug, Clone)]
pub struct GaugeSnapshot {
    name: String,
    tags: Arc<Tags>,
    value: f64,
}

impl GaugeSnapshot {
    pub(crate) fn new(name: String, tags: Arc<Tags>, value: f64) -> Self {
        GaugeSnapshot { name, tags, value }
    }

    /// Last value written to the gauge.
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Metadata for GaugeSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

#[derive(Debug, Clone)]
pub struct TimerSnapshot {
    name: String,
    tags: Arc<Tags>,
    values: Vec<Duration>,
}

impl TimerSnapshot {
    pub(crate) fn new(name: String, tags: Arc<Tags>, values: Vec<Duration>) -> Self {
        TimerSnapshot { name, tags, values }
    }

    /// Buffered observations in recording order.
    pub fn values(&self) -> &[Duration] {
        &self.values
    }
}

impl Metadata for TimerSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    name: String,
    tags: Arc<Tags>,
    values: Vec<(f64, i64)>,
    durations: Vec<(Duration, i64)>,
}

impl HistogramSnapshot {
    pub(crate) fn new(
        name: String,
        tags: Arc<Tags>,
        values: Vec<(f64, i64)>,
        durations: Vec<(Duration, i64)>,
    ) -> Self {
        HistogramSnapshot {
            name,
            tags,
            values,
            durations,
        }
    }

    /// Per-bucket sample counts keyed by upper bound, for value histograms.
    /// Empty when the histogram was built from duration boundaries.
    pub fn values(&self) -> &[(f64, i64)] {
        &self.values
    }

    /// Per-bucket sample counts keyed by upper bound, for duration
    /// histograms. Empty when the histogram was built from value boundaries.
    pub fn durations(&self) -> &[(Duration, i64)] {
        &self.durations
    }
}

impl Metadata for HistogramSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    fn tags(&self) -> &Tags {
        &self.tags
    }
}

/// All metrics registered under a scope graph at one point in time, keyed by
/// [`key_for`].
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    counters: HashMap<String, CounterSnapshot>,
    gauges: HashMap<String, GaugeSnapshot>,
    timers: HashMap<String, TimerSnapshot>,
    histograms: HashMap<String, HistogramSnapshot>,
}

impl Snapshot {
    pub fn counters(&self) -> &HashMap<String, CounterSnapshot> {
        &self.counters
    }

    pub fn gauges(&self) -> &HashMap<String, GaugeSnapshot> {
        &self.gauges
    }

    pub fn timers(&self) -> &HashMap<String, TimerSnapshot> {
        &self.timers
    }

    pub fn histograms(&self) -> &HashMap<String, HistogramSnapshot> {
        &self.histograms
    }

    /// Look up a counter by fully qualified name and exact tag set.
    pub fn counter(&self, name: &str, tags: &Tags) -> Option<&CounterSnapshot> {
        self.counters.get(&key_for(name, tags))
    }

    pub fn gauge(&self, name: &str, tags: &Tags) -> Option<&GaugeSnapshot> {
        self.gauges.get(&key_for(name, tags))
    }

    pub fn timer(&self, name: &str, tags: &Tags) -> Option<&TimerSnapshot> {
        self.timers.get(&key_for(name, tags))
    }

    pub fn histogram(&self, name: &str, tags: &Tags) -> Option<&HistogramSnapshot> {
        self.histograms.get(&key_for(name, tags))
    }

    pub(crate) fn insert_counter(&mut self, snapshot: CounterSnapshot) {
        self.counters
            .insert(key_for(&snapshot.name, &snapshot.tags), snapshot);
    }

    pub(crate) fn insert_gauge(&mut self, snapshot: GaugeSnapshot) {
        self.gauges
            .insert(key_for(&snapshot.name, &snapshot.tags), snapshot);
    }

    pub(crate) fn insert_timer(&mut self, snapshot: TimerSnapshot) {
        self.timers
            .insert(key_for(&snapshot.name, &snapshot.tags), snapshot);
    }

    pub(crate) fn insert_histogram(&mut self, snapshot: HistogramSnapshot) {
        self.histograms
            .insert(key_for(&snapshot.name, &snapshot.tags), snapshot);
    }
}

/// Read a snapshot without closing any windows.
pub trait SnapshotProvider {
    fn snapshot(&self) -> Snapshot;
}

/// Read a snapshot and close the windows named in [`ResetOptions`] in the
/// same pass.
pub trait SnapshotResetProvider: SnapshotProvider {
    fn snapshot_reset(&self, options: ResetOptions) -> Snapshot;
}
