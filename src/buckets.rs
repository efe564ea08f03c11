//! Histogram bucket boundaries.
//!
//! A [`Buckets`] collection holds the ordered boundary values a histogram
//! classifies samples against. One collection serves both domains: duration
//! boundaries viewed as values use their nanosecond count, and value
//! boundaries viewed as durations are taken as nanoseconds.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while constructing bucket boundaries.
///
/// These are programming errors and surface at construction time, so a
/// misconfigured histogram aborts setup instead of misclassifying samples
/// later.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BucketsError {
    /// Generators need at least one boundary.
    #[error("bucket count must be at least one")]
    ZeroCount,
    /// A negative (or NaN) linear width would produce unsorted boundaries.
    #[error("linear bucket width must not be negative")]
    NegativeWidth,
    /// Exponential generation needs a positive starting boundary.
    #[error("exponential bucket start must be greater than zero")]
    NonPositiveStart,
    /// A factor of one or less would make the boundaries non-increasing.
    #[error("exponential bucket factor must be greater than one")]
    FactorNotGreaterThanOne,
}

/// An ordered set of histogram bucket boundaries, backed either by plain
/// values or by durations.
///
/// The generator constructors always produce sorted boundaries; collections
/// built directly from literals are sorted when bucket pairs are derived.
#[derive(Debug, Clone, PartialEq)]
pub enum Buckets {
    /// Boundaries as floating-point values.
    Values(Vec<f64>),
    /// Boundaries as durations.
    Durations(Vec<Duration>),
}

impl Default for Buckets {
    /// No explicit boundaries: a histogram built from this classifies every
    /// sample into a single all-covering bucket.
    fn default() -> Self {
        Buckets::Values(Vec::new())
    }
}

impl Buckets {
    /// `count` boundaries `start, start+width, start+2*width, ...`.
    ///
    /// A zero width is legal and yields `count` identical boundaries.
    pub fn linear_values(start: f64, width: f64, count: usize) -> Result<Self, BucketsError> {
        if count == 0 {
            return Err(BucketsError::ZeroCount);
        }
        if width.is_nan() || width < 0.0 {
            return Err(BucketsError::NegativeWidth);
        }
        let buckets = (0..count).map(|i| start + width * i as f64).collect();
        Ok(Buckets::Values(buckets))
    }

    /// `count` boundaries `start, start*factor, start*factor^2, ...`.
    pub fn exponential_values(start: f64, factor: f64, count: usize) -> Result<Self, BucketsError> {
        if count == 0 {
            return Err(BucketsError::ZeroCount);
        }
        if start.is_nan() || start <= 0.0 {
            return Err(BucketsError::NonPositiveStart);
        }
        if factor.is_nan() || factor <= 1.0 {
            return Err(BucketsError::FactorNotGreaterThanOne);
        }
        let mut buckets = Vec::with_capacity(count);
        let mut curr = start;
        for _ in 0..count {
            buckets.push(curr);
            curr *= factor;
        }
        Ok(Buckets::Values(buckets))
    }

    /// Duration mirror of [`linear_values`](Buckets::linear_values).
    pub fn linear_durations(
        start: Duration,
        width: Duration,
        count: usize,
    ) -> Result<Self, BucketsError> {
        if count == 0 {
            return Err(BucketsError::ZeroCount);
        }
        let buckets = (0..count).map(|i| start + width * i as u32).collect();
        Ok(Buckets::Durations(buckets))
    }

    /// Duration mirror of [`exponential_values`](Buckets::exponential_values).
    /// Each step multiplies the previous boundary's nanosecond count, rounding
    /// through the integer scalar.
    pub fn exponential_durations(
        start: Duration,
        factor: f64,
        count: usize,
    ) -> Result<Self, BucketsError> {
        if count == 0 {
            return Err(BucketsError::ZeroCount);
        }
        if start.is_zero() {
            return Err(BucketsError::NonPositiveStart);
        }
        if factor.is_nan() || factor <= 1.0 {
            return Err(BucketsError::FactorNotGreaterThanOne);
        }
        let mut buckets = Vec::with_capacity(count);
        let mut curr = start.as_nanos() as u64;
        for _ in 0..count {
            buckets.push(Duration::from_nanos(curr));
            curr = (curr as f64 * factor) as u64;
        }
        Ok(Buckets::Durations(buckets))
    }

    /// Number of boundaries (one less than the number of derived buckets).
    pub fn len(&self) -> usize {
        match self {
            Buckets::Values(values) => values.len(),
            Buckets::Durations(durations) => durations.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The boundaries in the value domain.
    pub fn as_values(&self) -> Vec<f64> {
        match self {
            Buckets::Values(values) => values.clone(),
            Buckets::Durations(durations) => {
                durations.iter().map(|d| duration_to_value(*d)).collect()
            }
        }
    }

    /// The boundaries in the duration domain.
    pub fn as_durations(&self) -> Vec<Duration> {
        match self {
            Buckets::Values(values) => values.iter().map(|v| value_to_duration(*v)).collect(),
            Buckets::Durations(durations) => durations.clone(),
        }
    }

    /// Derive the `len() + 1` bucket pairs this collection describes: an
    /// implicit first bucket below the smallest boundary, one bucket per
    /// adjacent boundary pair, and a final bucket reaching to infinity.
    /// Boundaries are sorted ascending before pairing. An empty collection
    /// yields a single all-covering pair.
    pub fn bucket_pairs(&self) -> Vec<BucketPair> {
        let mut values = self.as_values();
        let mut durations = self.as_durations();
        if values.is_empty() {
            return vec![BucketPair {
                lower_value: f64::NEG_INFINITY,
                upper_value: f64::INFINITY,
                lower_duration: Duration::ZERO,
                upper_duration: Duration::MAX,
            }];
        }
        values.sort_unstable_by(f64::total_cmp);
        durations.sort_unstable();

        let mut pairs = Vec::with_capacity(values.len() + 1);
        pairs.push(BucketPair {
            lower_value: f64::NEG_INFINITY,
            upper_value: values[0],
            lower_duration: Duration::ZERO,
            upper_duration: durations[0],
        });
        for i in 1..values.len() {
            pairs.push(BucketPair {
                lower_value: values[i - 1],
                upper_value: values[i],
                lower_duration: durations[i - 1],
                upper_duration: durations[i],
            });
        }
        pairs.push(BucketPair {
            lower_value: values[values.len() - 1],
            upper_value: f64::INFINITY,
            lower_duration: durations[durations.len() - 1],
            upper_duration: Duration::MAX,
        });
        pairs
    }
}

impl fmt::Display for Buckets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        match self {
            Buckets::Values(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{v:.6}")?;
                }
            }
            Buckets::Durations(durations) => {
                for (i, d) in durations.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{d:?}")?;
                }
            }
        }
        f.write_str("]")
    }
}

/// Lower and upper bounds of one derived bucket, in both domains.
///
/// Buckets are half-open `[lower, upper)`: a sample equal to a boundary
/// belongs to the bucket that boundary lower-bounds. The outermost pairs carry
/// sentinel bounds (negative infinity / zero duration below, infinity / max
/// duration above), so every sample classifies into exactly one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketPair {
    lower_value: f64,
    upper_value: f64,
    lower_duration: Duration,
    upper_duration: Duration,
}

impl BucketPair {
    pub fn lower_bound_value(&self) -> f64 {
        self.lower_value
    }

    pub fn upper_bound_value(&self) -> f64 {
        self.upper_value
    }

    pub fn lower_bound_duration(&self) -> Duration {
        self.lower_duration
    }

    pub fn upper_bound_duration(&self) -> Duration {
        self.upper_duration
    }
}

/// Bucket index for a value sample: the number of boundaries at or below it.
/// `bounds` must be sorted ascending.
pub(crate) fn value_bucket_index(bounds: &[f64], value: f64) -> usize {
    bounds.partition_point(|&b| b <= value)
}

/// Bucket index for a duration sample. `bounds` must be sorted ascending.
pub(crate) fn duration_bucket_index(bounds: &[Duration], interval: Duration) -> usize {
    bounds.partition_point(|&b| b <= interval)
}

fn duration_to_value(d: Duration) -> f64 {
    d.as_nanos() as f64
}

fn value_to_duration(v: f64) -> Duration {
    // saturates at zero and u64::MAX nanoseconds
    Duration::from_nanos(v as u64)
}
