//! Size-targeted quality search.
//!
//! There is no closed-form relation between a lossy encoder's quality setting
//! and the size of its output, so the quality is found by bisection: encode
//! at a candidate quality into memory, measure, narrow the range. Encoded size
//! grows with quality for most images but not strictly, so the search is
//! bounded by an iteration budget and stops as soon as the midpoint repeats.
//!
//! # Algorithm
//!
//! 1. `low = min_quality`, `high = max_quality`, `prev = 0`
//! 2. `mid = (low + high) / 2`; stop with `mid` if it repeats `prev`
//! 3. Stop with `high` if the range is empty
//! 4. Encode at `mid`; stop with `mid` if the size is inside the acceptance band
//! 5. Too small moves `low` above `mid`, too large moves `high` below it
//! 6. When the budget runs out, return `low`

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::encode::{encode_image, EncodeError, OutputFormat};

/// Reasons a [`SearchPolicy`] cannot be used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchPolicyError {
    #[error("quality bounds {min}..={max} must lie within 1..=100")]
    BoundsOutOfRange { min: u8, max: u8 },

    #[error("min quality {min} exceeds max quality {max}")]
    InvertedBounds { min: u8, max: u8 },

    #[error("iteration budget must be at least 1")]
    ZeroBudget,

    #[error("band floor {0} must be in (0, 1]")]
    InvalidBandFloor(f64),
}

/// Bounds and budget for a quality search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPolicy {
    /// Lowest quality the search may return (1-100)
    pub min_quality: u8,
    /// Highest quality the search may return (1-100)
    pub max_quality: u8,
    /// Maximum number of trial encodes
    pub max_iterations: u32,
    /// Lower edge of the acceptance band as a fraction of the target size
    pub band_floor: f64,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            min_quality: 1,
            max_quality: 100,
            max_iterations: 15,
            band_floor: 0.95,
        }
    }
}

impl SearchPolicy {
    /// Check that the bounds describe a non-empty range inside 1-100.
    pub fn validate(&self) -> Result<(), SearchPolicyError> {
        if self.min_quality < 1 || self.max_quality > 100 {
            return Err(SearchPolicyError::BoundsOutOfRange {
                min: self.min_quality,
                max: self.max_quality,
            });
        }
        if self.min_quality > self.max_quality {
            return Err(SearchPolicyError::InvertedBounds {
                min: self.min_quality,
                max: self.max_quality,
            });
        }
        if self.max_iterations == 0 {
            return Err(SearchPolicyError::ZeroBudget);
        }
        if !(self.band_floor > 0.0 && self.band_floor <= 1.0) {
            return Err(SearchPolicyError::InvalidBandFloor(self.band_floor));
        }
        Ok(())
    }

    /// Check whether `size` lands in `[band_floor * target, target]`.
    pub fn accepts(&self, size: u64, target: u64) -> bool {
        size <= target && size as f64 >= target as f64 * self.band_floor
    }
}

/// One speculative encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trial {
    pub quality: u8,
    pub size: u64,
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A trial landed inside the acceptance band.
    Accepted,
    /// The midpoint repeated the previous candidate.
    Stalled,
    /// The bounds crossed without a trial landing in the band.
    RangeExhausted,
    /// The iteration budget ran out.
    BudgetExhausted,
}

/// Result of a quality search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Quality to encode with, always within the policy bounds.
    pub quality: u8,
    pub stop: StopReason,
    /// Trials in the order they were made.
    pub trials: Vec<Trial>,
}

/// Something that can report the encoded size of an image at a quality.
pub trait TrialEncoder {
    /// Encode into memory at `quality` and return the byte count.
    fn encoded_size(&self, quality: u8) -> Result<u64, EncodeError>;
}

impl<F> TrialEncoder for F
where
    F: Fn(u8) -> Result<u64, EncodeError>,
{
    fn encoded_size(&self, quality: u8) -> Result<u64, EncodeError> {
        self(quality)
    }
}

/// Trial encoder backed by a real raster and codec.
#[derive(Debug, Clone, Copy)]
pub struct ImageTrials<'a> {
    image: &'a DynamicImage,
    format: OutputFormat,
}

impl<'a> ImageTrials<'a> {
    pub fn new(image: &'a DynamicImage, format: OutputFormat) -> Self {
        Self { image, format }
    }
}

impl TrialEncoder for ImageTrials<'_> {
    fn encoded_size(&self, quality: u8) -> Result<u64, EncodeError> {
        encode_image(self.image, self.format, quality).map(|bytes| bytes.len() as u64)
    }
}

/// Find a quality whose encoded size of `image` lands within the acceptance
/// band below `max_size_bytes`.
pub fn find_quality(
    image: &DynamicImage,
    format: OutputFormat,
    max_size_bytes: u64,
    policy: &SearchPolicy,
) -> Result<SearchOutcome, EncodeError> {
    search_quality(&ImageTrials::new(image, format), max_size_bytes, policy)
}

/// Bisect the quality range of `policy` against `encoder`.
///
/// Every returned quality lies within `[policy.min_quality, policy.max_quality]`
/// and at most `policy.max_iterations` trials are made.
pub fn search_quality<E>(
    encoder: &E,
    max_size_bytes: u64,
    policy: &SearchPolicy,
) -> Result<SearchOutcome, EncodeError>
where
    E: TrialEncoder + ?Sized,
{
    let floor = i32::from(policy.min_quality);
    let ceil = i32::from(policy.max_quality);
    let clamp = |q: i32| q.clamp(floor, ceil) as u8;

    let mut low = floor;
    let mut high = ceil;
    let mut prev = 0;
    let mut trials = Vec::new();

    for _ in 0..policy.max_iterations {
        let mid = (low + high) / 2;

        if mid == prev {
            return Ok(finish(clamp(mid), StopReason::Stalled, trials));
        }
        if low > high {
            // `high` sits just below the smallest quality that overshot, or
            // at the floor's predecessor when every trial overshot
            return Ok(finish(clamp(high), StopReason::RangeExhausted, trials));
        }

        let quality = clamp(mid);
        let size = encoder.encoded_size(quality)?;
        debug!(quality, size, low, high, "quality trial");
        trials.push(Trial { quality, size });

        if policy.accepts(size, max_size_bytes) {
            return Ok(finish(quality, StopReason::Accepted, trials));
        }

        if size <= max_size_bytes {
            low = mid + 1;
        } else {
            high = mid - 1;
        }
        prev = mid;
    }

    Ok(finish(clamp(low), StopReason::BudgetExhausted, trials))
}

fn finish(quality: u8, stop: StopReason, trials: Vec<Trial>) -> SearchOutcome {
    debug!(quality, ?stop, trials = trials.len(), "quality search finished");
    SearchOutcome {
        quality,
        stop,
        trials,
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn sized(f: impl Fn(u8) -> u64) -> impl Fn(u8) -> Result<u64, EncodeError> {
        move |q| Ok(f(q))
    }

    proptest! {
        /// Property: Any size function terminates within budget with an in-range quality.
        #[test]
        fn prop_terminates_in_range(
            table in prop::collection::vec(0u64..5000, 100),
            target in 1u64..5000,
        ) {
            let sizes = sized(|q| table[usize::from(q) - 1]);
            let outcome = search_quality(&sizes, target, &SearchPolicy::default()).unwrap();

            prop_assert!((1..=100).contains(&outcome.quality));
            prop_assert!(outcome.trials.len() <= 15);
            prop_assert!(outcome.trials.iter().all(|t| (1..=100).contains(&t.quality)));
        }

        /// Property: With monotonic sizes the result never overshoots unless nothing fits.
        #[test]
        fn prop_monotonic_never_overshoots(
            per_step in 1u64..200,
            base in 0u64..500,
            target in 1u64..20000,
        ) {
            let sizes = sized(move |q| base + u64::from(q) * per_step);
            let outcome = search_quality(&sizes, target, &SearchPolicy::default()).unwrap();
            let size = base + u64::from(outcome.quality) * per_step;

            let nothing_fits = base + per_step > target;
            prop_assert!(size <= target || (nothing_fits && outcome.quality == 1));
        }

        /// Property: With monotonic sizes the result is the largest fitting quality
        /// or lands inside the band.
        #[test]
        fn prop_monotonic_maximal(
            per_step in 1u64..200,
            target in 1u64..20000,
        ) {
            let policy = SearchPolicy::default();
            let sizes = sized(move |q| u64::from(q) * per_step);
            let outcome = search_quality(&sizes, target, &policy).unwrap();

            let largest_fitting = (1u8..=100)
                .rev()
                .find(|&q| u64::from(q) * per_step <= target)
                .unwrap_or(1);

            if outcome.stop == StopReason::Accepted {
                prop_assert!(policy.accepts(u64::from(outcome.quality) * per_step, target));
            } else {
                prop_assert_eq!(outcome.quality, largest_fitting);
            }
        }

        /// Property: The search is deterministic.
        #[test]
        fn prop_deterministic(
            table in prop::collection::vec(0u64..5000, 100),
            target in 1u64..5000,
        ) {
            let sizes = sized(|q| table[usize::from(q) - 1]);
            let first = search_quality(&sizes, target, &SearchPolicy::default()).unwrap();
            let second = search_quality(&sizes, target, &SearchPolicy::default()).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
