//! Scope graph over a shared metric registry.
//!
//! A scope pairs a name prefix with a tag set. Derived scopes are interned
//! by the hash of that pair, so deriving the same combination from any
//! handle returns the existing scope and its cached primitives instead of
//! minting a parallel accumulator.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use twox_hash::XxHash64;

use crate::buckets::Buckets;
use crate::metrics::{Counter, Gauge, Histogram, Timer};
use crate::reporter::{Capabilities, StatsReporter};
use crate::snapshot::{
    CounterSnapshot, GaugeSnapshot, HistogramSnapshot, ResetOptions, Snapshot, SnapshotProvider,
    SnapshotResetProvider, TimerSnapshot,
};
use crate::utils::BuildPrehashed;
use crate::Tags;

/// Joins scope prefixes to metric names unless overridden in
/// [`ScopeOptions`].
pub const DEFAULT_SEPARATOR: &str = ".";

const SID_SEED: u64 = 0xdeadbeef;

/// Stable id for a (prefix, tags) combination.
fn scope_id(prefix: &str, tags: &Tags) -> u64 {
    let mut hasher = XxHash64::with_seed(SID_SEED);
    prefix.hash(&mut hasher);
    tags.hash(&mut hasher);
    hasher.finish()
}

fn warn_bucket_conflict(name: &str) {
    tracing::warn!(
        metric = name,
        "histogram re-registered with different buckets, keeping the first definition"
    );
}

/// Configuration for a root scope.
pub struct ScopeOptions {
    /// Name prefix applied to every metric registered under the root.
    pub prefix: String,
    /// Tags applied to every metric registered under the root.
    pub tags: Tags,
    /// Separator joining prefixes to metric names.
    pub separator: String,
    /// Backend receiving emissions. Without one, [`Scope::report`] is a
    /// no-op and timers buffer their observations for snapshots.
    pub reporter: Option<Arc<dyn StatsReporter>>,
    /// Boundaries for histograms registered without explicit buckets.
    pub default_buckets: Buckets,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        ScopeOptions {
            prefix: String::new(),
            tags: Tags::new(),
            separator: DEFAULT_SEPARATOR.to_string(),
            reporter: None,
            default_buckets: Buckets::default(),
        }
    }
}

/// Every scope derived from one root, keyed by scope id.
struct ScopeRegistry {
    scopes: DashMap<u64, Scope, BuildPrehashed>,
}

impl ScopeRegistry {
    fn new() -> Self {
        ScopeRegistry {
            scopes: DashMap::with_hasher(BuildPrehashed),
        }
    }
}

struct ScopeCore {
    prefix: String,
    separator: String,
    tags: Arc<Tags>,
    reporter: Option<Arc<dyn StatsReporter>>,
    default_buckets: Buckets,
    registry: Arc<ScopeRegistry>,
    counters: DashMap<String, Counter>,
    gauges: DashMap<String, Gauge>,
    timers: DashMap<String, Timer>,
    histograms: DashMap<String, Histogram>,
}

/// A named, tagged namespace for metrics.
///
/// Cloning is cheap and clones address the same primitives. Scopes live for
/// the lifetime of the registry they were derived from.
#[derive(Clone)]
pub struct Scope {
    core: Arc<ScopeCore>,
}

impl Scope {
    /// Create a root scope and the registry all scopes derived from it
    /// share.
    pub fn root(options: ScopeOptions) -> Scope {
        let registry = Arc::new(ScopeRegistry::new());
        let scope = Scope {
            core: Arc::new(ScopeCore {
                prefix: options.prefix,
                separator: options.separator,
                tags: Arc::new(options.tags),
                reporter: options.reporter,
                default_buckets: options.default_buckets,
                registry: registry.clone(),
                counters: DashMap::new(),
                gauges: DashMap::new(),
                timers: DashMap::new(),
                histograms: DashMap::new(),
            }),
        };
        let sid = scope_id(&scope.core.prefix, &scope.core.tags);
        registry.scopes.insert(sid, scope.clone());
        scope
    }

    /// Counter registered under this scope. Repeated calls with the same
    /// name return handles to the same accumulator.
    pub fn counter(&self, name: &str) -> Counter {
        if let Some(counter) = self.core.counters.get(name) {
            return counter.clone();
        }
        self.core
            .counters
            .entry(name.to_string())
            .or_insert_with(Counter::new)
            .clone()
    }

    /// Gauge registered under this scope.
    pub fn gauge(&self, name: &str) -> Gauge {
        if let Some(gauge) = self.core.gauges.get(name) {
            return gauge.clone();
        }
        self.core
            .gauges
            .entry(name.to_string())
            .or_insert_with(Gauge::new)
            .clone()
    }

    /// Timer registered under this scope. When the attached reporter accepts
    /// pushes the timer forwards observations as they are recorded,
    /// otherwise it buffers them for snapshots.
    pub fn timer(&self, name: &str) -> Timer {
        if let Some(timer) = self.core.timers.get(name) {
            return timer.clone();
        }
        self.core
            .timers
            .entry(name.to_string())
            .or_insert_with(|| {
                Timer::new(
                    self.fully_qualified_name(name),
                    self.core.tags.clone(),
                    self.push_reporter(),
                )
            })
            .clone()
    }

    /// Histogram registered under this scope. `buckets` applies on first
    /// registration only; later calls return the existing histogram and a
    /// conflicting explicit definition logs a warning. `None` or empty
    /// boundaries fall back to the scope's default buckets.
    pub fn histogram(&self, name: &str, buckets: Option<Buckets>) -> Histogram {
        let explicit = buckets.as_ref().is_some_and(|b| !b.is_empty());
        let wanted = match buckets {
            Some(b) if !b.is_empty() => b,
            _ => self.core.default_buckets.clone(),
        };
        if let Some(existing) = self.core.histograms.get(name) {
            if explicit && *existing.buckets() != wanted {
                warn_bucket_conflict(name);
            }
            return existing.clone();
        }
        let histogram = self
            .core
            .histograms
            .entry(name.to_string())
            .or_insert_with(|| Histogram::new(wanted.clone()))
            .clone();
        // lost the creation race to a different definition
        if explicit && *histogram.buckets() != wanted {
            warn_bucket_conflict(name);
        }
        histogram
    }

    /// Child scope with `tags` merged over this scope's tags. On key
    /// conflict the child's value wins. Deriving the same combination twice
    /// returns the same scope.
    pub fn tagged<K, V, I>(&self, tags: I) -> Scope
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut merged = (*self.core.tags).clone();
        for (k, v) in tags {
            merged.insert(k.into(), v.into());
        }
        self.subscope(self.core.prefix.clone(), merged)
    }

    /// Child scope whose prefix extends this scope's prefix with `name`.
    pub fn sub_scope(&self, name: &str) -> Scope {
        let prefix = self.fully_qualified_name(name);
        self.subscope(prefix, (*self.core.tags).clone())
    }

    fn subscope(&self, prefix: String, tags: Tags) -> Scope {
        let sid = scope_id(&prefix, &tags);
        if let Some(scope) = self.core.registry.scopes.get(&sid) {
            return scope.clone();
        }
        self.core
            .registry
            .scopes
            .entry(sid)
            .or_insert_with(|| Scope {
                core: Arc::new(ScopeCore {
                    prefix,
                    separator: self.core.separator.clone(),
                    tags: Arc::new(tags),
                    reporter: self.core.reporter.clone(),
                    default_buckets: self.core.default_buckets.clone(),
                    registry: self.core.registry.clone(),
                    counters: DashMap::new(),
                    gauges: DashMap::new(),
                    timers: DashMap::new(),
                    histograms: DashMap::new(),
                }),
            })
            .clone()
    }

    /// Metric name with this scope's prefix applied.
    pub fn fully_qualified_name(&self, name: &str) -> String {
        if self.core.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", self.core.prefix, self.core.separator, name)
        }
    }

    /// Tags every metric under this scope carries.
    pub fn tags(&self) -> &Tags {
        &self.core.tags
    }

    /// This scope's name prefix.
    pub fn prefix(&self) -> &str {
        &self.core.prefix
    }

    /// Capabilities of the attached reporter, or none without a reporter.
    pub fn capabilities(&self) -> Capabilities {
        match &self.core.reporter {
            Some(reporter) => reporter.capabilities(),
            None => Capabilities::NONE,
        }
    }

    fn push_reporter(&self) -> Option<Arc<dyn StatsReporter>> {
        self.core
            .reporter
            .as_ref()
            .filter(|reporter| reporter.capabilities().reporting())
            .cloned()
    }

    /// Run one reporting pass: every scope in the graph emits its closed
    /// counter, gauge and histogram windows, then the reporter is flushed.
    /// Timers push at record time and are not part of the pass. Without a
    /// reporter this is a no-op.
    pub fn report(&self) {
        let Some(reporter) = &self.core.reporter else {
            return;
        };
        let started = Instant::now();
        let mut scopes = 0usize;
        for entry in self.core.registry.scopes.iter() {
            entry.value().report_into(reporter.as_ref());
            scopes += 1;
        }
        reporter.flush();
        tracing::debug!(
            message = "flushed report pass",
            scopes,
            elapsed = ?started.elapsed(),
        );
    }

    fn report_into(&self, reporter: &dyn StatsReporter) {
        for entry in self.core.counters.iter() {
            let name = self.fully_qualified_name(entry.key());
            entry.value().report(&name, &self.core.tags, reporter);
        }
        for entry in self.core.gauges.iter() {
            let name = self.fully_qualified_name(entry.key());
            entry.value().report(&name, &self.core.tags, reporter);
        }
        for entry in self.core.histograms.iter() {
            let name = self.fully_qualified_name(entry.key());
            entry.value().report(&name, &self.core.tags, reporter);
        }
    }

    /// Snapshot every metric in the graph without closing any windows.
    pub fn snapshot(&self) -> Snapshot {
        self.collect(ResetOptions::default())
    }

    /// Snapshot every metric in the graph, closing the windows named in
    /// `options` in the same pass.
    pub fn snapshot_reset(&self, options: ResetOptions) -> Snapshot {
        self.collect(options)
    }

    fn collect(&self, options: ResetOptions) -> Snapshot {
        let started = Instant::now();
        let mut snapshot = Snapshot::default();
        let mut scopes = 0usize;
        for entry in self.core.registry.scopes.iter() {
            entry.value().collect_into(options, &mut snapshot);
            scopes += 1;
        }
        tracing::debug!(
            message = "collected snapshot",
            scopes,
            counters = snapshot.counters().len(),
            gauges = snapshot.gauges().len(),
            timers = snapshot.timers().len(),
            histograms = snapshot.histograms().len(),
            elapsed = ?started.elapsed(),
        );
        snapshot
    }

    fn collect_into(&self, options: ResetOptions, snapshot: &mut Snapshot) {
        for entry in self.core.counters.iter() {
            let name = self.fully_qualified_name(entry.key());
            snapshot.insert_counter(CounterSnapshot::new(
                name,
                self.core.tags.clone(),
                entry.value().snapshot_value(options.reset_counters),
            ));
        }
        for entry in self.core.gauges.iter() {
            let name = self.fully_qualified_name(entry.key());
            snapshot.insert_gauge(GaugeSnapshot::new(
                name,
                self.core.tags.clone(),
                entry.value().snapshot_value(),
            ));
        }
        for entry in self.core.timers.iter() {
            let name = self.fully_qualified_name(entry.key());
            snapshot.insert_timer(TimerSnapshot::new(
                name,
                self.core.tags.clone(),
                entry.value().snapshot_values(options.reset_timers),
            ));
        }
        for entry in self.core.histograms.iter() {
            let name = self.fully_qualified_name(entry.key());
            let (values, durations) = entry.value().snapshot_buckets(options.reset_histograms);
            snapshot.insert_histogram(HistogramSnapshot::new(
                name,
                self.core.tags.clone(),
                values,
                durations,
            ));
        }
    }
}

impl SnapshotProvider for Scope {
    fn snapshot(&self) -> Snapshot {
        self.collect(ResetOptions::default())
    }
}

impl SnapshotResetProvider for Scope {
    fn snapshot_reset(&self, options: ResetOptions) -> Snapshot {
        self.collect(options)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::buckets::BucketPair;

    struct CaptureReporter {
        counters: Mutex<Vec<(String, Tags, i64)>>,
        gauges: Mutex<Vec<(String, Tags, f64)>>,
        timers: Mutex<Vec<(String, Tags, Duration)>>,
        value_samples: Mutex<Vec<(String, f64, i64)>>,
        flushes: AtomicUsize,
        capabilities: Capabilities,
    }

    impl Default for CaptureReporter {
        fn default() -> Self {
            CaptureReporter {
                counters: Mutex::new(Vec::new()),
                gauges: Mutex::new(Vec::new()),
                timers: Mutex::new(Vec::new()),
                value_samples: Mutex::new(Vec::new()),
                flushes: AtomicUsize::new(0),
                capabilities: Capabilities::new(true, true),
            }
        }
    }

    impl StatsReporter for CaptureReporter {
        fn report_counter(&self, name: &str, tags: &Tags, value: i64) {
            self.counters
                .lock()
                .push((name.to_string(), tags.clone(), value));
        }

        fn report_gauge(&self, name: &str, tags: &Tags, value: f64) {
            self.gauges
                .lock()
                .push((name.to_string(), tags.clone(), value));
        }

        fn report_timer(&self, name: &str, tags: &Tags, interval: Duration) {
            self.timers
                .lock()
                .push((name.to_string(), tags.clone(), interval));
        }

        fn report_histogram_value_samples(
            &self,
            name: &str,
            _tags: &Tags,
            pair: &BucketPair,
            samples: i64,
        ) {
            self.value_samples
                .lock()
                .push((name.to_string(), pair.upper_bound_value(), samples));
        }

        fn report_histogram_duration_samples(
            &self,
            _name: &str,
            _tags: &Tags,
            _pair: &BucketPair,
            _samples: i64,
        ) {
        }

        fn capabilities(&self) -> Capabilities {
            self.capabilities
        }

        fn flush(&self) {
            self.flushes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn root_with(reporter: Arc<CaptureReporter>) -> Scope {
        Scope::root(ScopeOptions {
            reporter: Some(reporter as Arc<dyn StatsReporter>),
            ..ScopeOptions::default()
        })
    }

    #[test]
    fn repeated_names_return_the_same_accumulator() {
        let scope = Scope::root(ScopeOptions::default());
        scope.counter("reqs").inc(1);
        scope.counter("reqs").inc(2);
        assert_eq!(
            scope.snapshot().counter("reqs", &Tags::new()).unwrap().value(),
            3
        );
    }

    #[test]
    fn deriving_the_same_tags_returns_the_same_scope() {
        let scope = Scope::root(ScopeOptions::default());
        let one = scope.tagged([("env", "prod")]);
        let two = scope.tagged([("env", "prod")]);
        assert!(Arc::ptr_eq(&one.core, &two.core));

        // reapplying the same tags is a no-op derivation
        let nested = one.tagged([("env", "prod")]);
        assert!(Arc::ptr_eq(&one.core, &nested.core));

        let unchanged = scope.tagged(Tags::new());
        assert!(Arc::ptr_eq(&scope.core, &unchanged.core));
    }

    #[test]
    fn concurrent_derivation_creates_one_scope() {
        let scope = Scope::root(ScopeOptions::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scope = scope.clone();
                thread::spawn(move || {
                    scope.tagged([("worker", "pool")]).counter("started").inc(1);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = scope.snapshot();
        assert_eq!(
            snap.counter("started", &tags(&[("worker", "pool")]))
                .unwrap()
                .value(),
            8
        );
    }

    #[test]
    fn child_tags_win_on_conflict() {
        let scope = Scope::root(ScopeOptions {
            tags: tags(&[("env", "prod"), ("region", "us")]),
            ..ScopeOptions::default()
        });
        let child = scope.tagged([("env", "staging"), ("shard", "1")]);
        assert_eq!(
            *child.tags(),
            tags(&[("env", "staging"), ("region", "us"), ("shard", "1")])
        );
    }

    #[test]
    fn subscope_children_inherit_and_extend_tags() {
        let scope = Scope::root(ScopeOptions {
            tags: tags(&[("env", "prod")]),
            ..ScopeOptions::default()
        });
        let shard = scope.sub_scope("db").tagged([("shard", "1")]);
        assert_eq!(*shard.tags(), tags(&[("env", "prod"), ("shard", "1")]));
        shard.counter("calls").inc(1);

        let snap = scope.snapshot();
        let counter = snap
            .counter("db.calls", &tags(&[("env", "prod"), ("shard", "1")]))
            .unwrap();
        assert_eq!(counter.value(), 1);
    }

    #[test]
    fn sub_scope_prefixes_compose() {
        let scope = Scope::root(ScopeOptions {
            prefix: "svc".to_string(),
            ..ScopeOptions::default()
        });
        let primary = scope.sub_scope("db").sub_scope("primary");
        assert_eq!(
            primary.fully_qualified_name("queries"),
            "svc.db.primary.queries"
        );
        assert!(Arc::ptr_eq(
            &primary.core,
            &scope.sub_scope("db").sub_scope("primary").core
        ));
    }

    #[test]
    fn separator_is_inherited() {
        let scope = Scope::root(ScopeOptions {
            prefix: "svc".to_string(),
            separator: "_".to_string(),
            ..ScopeOptions::default()
        });
        assert_eq!(
            scope.sub_scope("db").fully_qualified_name("queries"),
            "svc_db_queries"
        );
    }

    #[test]
    fn capabilities_come_from_the_reporter() {
        let scope = Scope::root(ScopeOptions::default());
        assert_eq!(scope.capabilities(), Capabilities::NONE);

        let scope = root_with(Arc::new(CaptureReporter::default()));
        assert!(scope.capabilities().reporting());
        assert!(scope.capabilities().tagging());
    }

    #[test]
    fn report_emits_each_window_once() {
        let reporter = Arc::new(CaptureReporter::default());
        let scope = root_with(reporter.clone());
        let counter = scope.counter("reqs");
        counter.inc(5);
        counter.inc(3);

        scope.report();
        counter.inc(2);
        scope.report();
        scope.report();

        let counters = reporter.counters.lock();
        assert_eq!(counters.len(), 2);
        assert_eq!(counters[0].2, 8);
        assert_eq!(counters[1].2, 2);
        drop(counters);
        assert_eq!(reporter.flushes.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn gauges_report_only_when_written() {
        let reporter = Arc::new(CaptureReporter::default());
        let scope = root_with(reporter.clone());
        let gauge = scope.gauge("depth");

        scope.report();
        gauge.update(4.0);
        scope.report();
        scope.report();

        let gauges = reporter.gauges.lock();
        assert_eq!(gauges.len(), 1);
        assert_eq!(gauges[0].2, 4.0);
    }

    #[test]
    fn timers_push_at_record_time() {
        let reporter = Arc::new(CaptureReporter::default());
        let scope = root_with(reporter.clone());
        let timer = scope.sub_scope("db").timer("query");
        timer.record(Duration::from_millis(3));

        let timers = reporter.timers.lock();
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].0, "db.query");
        assert_eq!(timers[0].2, Duration::from_millis(3));
        drop(timers);

        assert!(scope
            .snapshot_reset(ResetOptions::ALL)
            .timer("db.query", &Tags::new())
            .unwrap()
            .values()
            .is_empty());
    }

    #[test]
    fn timers_buffer_when_the_reporter_cannot_push() {
        let reporter = Arc::new(CaptureReporter {
            capabilities: Capabilities::new(false, true),
            ..CaptureReporter::default()
        });
        let scope = root_with(reporter.clone());
        scope.timer("lat").record(Duration::from_millis(2));

        assert!(reporter.timers.lock().is_empty());
        assert_eq!(
            scope
                .snapshot_reset(ResetOptions::ALL)
                .timer("lat", &Tags::new())
                .unwrap()
                .values(),
            &[Duration::from_millis(2)]
        );
    }

    #[test]
    fn histogram_keeps_its_first_bucket_definition() {
        let scope = Scope::root(ScopeOptions::default());
        let first = scope.histogram("sizes", Some(Buckets::Values(vec![1.0, 2.0])));
        let second = scope.histogram("sizes", Some(Buckets::Values(vec![100.0])));
        first.record_value(1.5);
        second.record_value(1.5);

        let snap = scope.snapshot();
        assert_eq!(
            snap.histogram("sizes", &Tags::new()).unwrap().values(),
            &[(1.0, 0), (2.0, 2), (f64::INFINITY, 0)]
        );
    }

    #[test]
    fn default_buckets_apply_when_none_are_given() {
        let scope = Scope::root(ScopeOptions {
            default_buckets: Buckets::Values(vec![10.0]),
            ..ScopeOptions::default()
        });
        scope.histogram("sizes", None).record_value(3.0);

        let snap = scope.snapshot();
        assert_eq!(
            snap.histogram("sizes", &Tags::new()).unwrap().values(),
            &[(10.0, 1), (f64::INFINITY, 0)]
        );
    }

    #[test]
    fn report_emits_histogram_bucket_deltas() {
        let reporter = Arc::new(CaptureReporter::default());
        let scope = root_with(reporter.clone());
        let histogram = scope.histogram("sizes", Some(Buckets::Values(vec![1.0, 5.0, 10.0])));
        for sample in [0.5, 1.0, 4.9, 5.0, 100.0] {
            histogram.record_value(sample);
        }

        scope.report();
        scope.report();

        let samples = reporter.value_samples.lock();
        assert_eq!(
            *samples,
            vec![
                ("sizes".to_string(), 1.0, 1),
                ("sizes".to_string(), 5.0, 2),
                ("sizes".to_string(), 10.0, 1),
                ("sizes".to_string(), f64::INFINITY, 1),
            ]
        );
    }
}
