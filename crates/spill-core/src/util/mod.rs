//! Utility functions and types used throughout Spill.
//!
//! This module provides:
//! - Constants describing the probe buffer geometry ([`PAGE_SIZE`], [`CANDIDATES`], etc.)
//! - Progress reporting utilities ([`NamedProgress`])
//! - [`median`] for summarizing latency samples

mod constants;
mod named_progress;

pub use self::constants::*;
pub use self::named_progress::NamedProgress;

/// Returns the median of `samples`, or `None` if there are none.
///
/// The slice is sorted in place. For an even number of samples the lower
/// of the two middle values is returned, so the result is always an observed
/// latency.
///
/// # Examples
///
/// ```
/// use spill_core::util::median;
///
/// let mut samples = vec![300, 40, 42, 280];
/// assert_eq!(median(&mut samples), Some(42));
/// assert_eq!(median(&mut []), None);
/// ```
pub fn median(samples: &mut [u64]) -> Option<u64> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();
    Some(samples[(samples.len() - 1) / 2])
}
