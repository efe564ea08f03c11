//! Reporting interface between scopes and an emission backend.

use std::time::Duration;

use crate::buckets::BucketPair;
use crate::Tags;

/// What a [`StatsReporter`] implementation supports.
///
/// A scope consults these flags before handing work to its reporter: without
/// `reporting` timers buffer their observations instead of pushing them, and
/// without `tagging` a backend is expected to fold tags into metric names on
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    reporting: bool,
    tagging: bool,
}

impl Capabilities {
    /// Reports nothing and understands nothing.
    pub const NONE: Capabilities = Capabilities::new(false, false);

    pub const fn new(reporting: bool, tagging: bool) -> Self {
        Capabilities { reporting, tagging }
    }

    /// Whether the backend accepts pushed metric emissions at all.
    pub fn reporting(&self) -> bool {
        self.reporting
    }

    /// Whether the backend represents tags natively.
    pub fn tagging(&self) -> bool {
        self.tagging
    }
}

/// Backend that receives metric emissions from scopes.
///
/// Counter, gauge and histogram emissions arrive during a flush pass driven
/// by [`Scope::report`](crate::Scope::report); timers push each observation as
/// it is recorded. Implementations are shared across scopes and threads.
pub trait StatsReporter: Send + Sync {
    /// One counter window delta. Never called with a zero delta.
    fn report_counter(&self, name: &str, tags: &Tags, value: i64);

    /// The most recent gauge value. Only called when the gauge moved since
    /// the previous pass.
    fn report_gauge(&self, name: &str, tags: &Tags, value: f64);

    /// A single timer observation.
    fn report_timer(&self, name: &str, tags: &Tags, interval: Duration);

    /// Sample count accumulated in one bucket of a value histogram since the
    /// previous pass.
    fn report_histogram_value_samples(
        &self,
        name: &str,
        tags: &Tags,
        pair: &BucketPair,
        samples: i64,
    );

    /// Sample count accumulated in one bucket of a duration histogram since
    /// the previous pass.
    fn report_histogram_duration_samples(
        &self,
        name: &str,
        tags: &Tags,
        pair: &BucketPair,
        samples: i64,
    );

    fn capabilities(&self) -> Capabilities;

    /// Called at the end of every flush pass once all pending emissions for
    /// the pass have been delivered.
    fn flush(&self);
}
