//! In-process metrics with scoped names, inherited tags, and window-delta
//! reporting.
//!
//! A [`Scope`] pairs a name prefix with a tag set and hands out cached
//! [`Counter`], [`Gauge`], [`Timer`] and [`Histogram`] primitives. Derived
//! scopes share one registry, so the whole graph can be flushed to a
//! [`StatsReporter`] or copied out as a [`Snapshot`] from any handle.
//!
//! ```
//! use scopestats::{Buckets, ResetOptions, Scope, ScopeOptions, Tags};
//!
//! let scope = Scope::root(ScopeOptions::default());
//! let tagged = scope.tagged([("endpoint", "home")]);
//! tagged.counter("requests").inc(3);
//!
//! let sizes = scope.histogram(
//!     "sizes",
//!     Some(Buckets::linear_values(0.0, 10.0, 10).unwrap()),
//! );
//! sizes.record_value(42.0);
//!
//! let snap = scope.snapshot_reset(ResetOptions::ALL);
//! let tags = Tags::from([("endpoint".to_string(), "home".to_string())]);
//! assert_eq!(snap.counter("requests", &tags).unwrap().value(), 3);
//! ```

mod buckets;
mod metrics;
mod reporter;
mod scope;
mod snapshot;
mod utils;

pub use buckets::{BucketPair, Buckets, BucketsError};
pub use metrics::{Counter, Gauge, Histogram, Stopwatch, StopwatchRecorder, Timer};
pub use reporter::{Capabilities, StatsReporter};
pub use scope::{Scope, ScopeOptions, DEFAULT_SEPARATOR};
pub use snapshot::{
    key_for, CounterSnapshot, GaugeSnapshot, HistogramSnapshot, Metadata, ResetOptions, Snapshot,
    SnapshotProvider, SnapshotResetProvider, TimerSnapshot,
};

/// Tag keys and values attached to a scope. Sorted iteration keeps scope
/// identity and snapshot keys deterministic.
pub type Tags = std::collections::BTreeMap<String, String>;
