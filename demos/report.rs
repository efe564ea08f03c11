use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scopestats::{
    BucketPair, Buckets, Capabilities, ResetOptions, Scope, ScopeOptions, StatsReporter, Tags,
};

/// Prints every emission it receives.
struct PrintReporter;

impl StatsReporter for PrintReporter {
    fn report_counter(&self, name: &str, tags: &Tags, value: i64) {
        println!("counter {name} {tags:?} +{value}");
    }

    fn report_gauge(&self, name: &str, tags: &Tags, value: f64) {
        println!("gauge {name} {tags:?} = {value}");
    }

    fn report_timer(&self, name: &str, tags: &Tags, interval: Duration) {
        println!("timer {name} {tags:?} {interval:?}");
    }

    fn report_histogram_value_samples(
        &self,
        name: &str,
        tags: &Tags,
        pair: &BucketPair,
        samples: i64,
    ) {
        println!(
            "histogram {name} {tags:?} [{}, {}) -> {samples}",
            pair.lower_bound_value(),
            pair.upper_bound_value()
        );
    }

    fn report_histogram_duration_samples(
        &self,
        name: &str,
        tags: &Tags,
        pair: &BucketPair,
        samples: i64,
    ) {
        println!(
            "histogram {name} {tags:?} [{:?}, {:?}) -> {samples}",
            pair.lower_bound_duration(),
            pair.upper_bound_duration()
        );
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(true, true)
    }

    fn flush(&self) {
        println!("--- flush ---");
    }
}

pub fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let scope = Scope::root(ScopeOptions {
        prefix: "demo".to_string(),
        reporter: Some(Arc::new(PrintReporter)),
        default_buckets: Buckets::linear_durations(Duration::ZERO, Duration::from_millis(10), 10)?,
        ..ScopeOptions::default()
    });

    let requests = scope.tagged([("endpoint", "home")]).counter("requests");
    let depth = scope.gauge("queue_depth");
    let query_time = scope.sub_scope("db").timer("query");
    let sizes = scope.histogram(
        "response_sizes",
        Some(Buckets::exponential_values(64.0, 4.0, 6)?),
    );
    let handle_time = scope.histogram("handle_time", None);

    for round in 0..3 {
        let round_watch = handle_time.start();

        requests.inc(1 + round);
        depth.update(10.0 * (round + 1) as f64);
        sizes.record_value(100.0 * (round + 1) as f64);

        let query_watch = query_time.start();
        thread::sleep(Duration::from_millis(20));
        query_watch.stop();

        round_watch.stop();
        scope.report();
    }

    let snap = scope.snapshot_reset(ResetOptions::ALL);
    println!(
        "final snapshot: {} counters, {} gauges, {} timers, {} histograms",
        snap.counters().len(),
        snap.gauges().len(),
        snap.timers().len(),
        snap.histograms().len()
    );
    Ok(())
}
