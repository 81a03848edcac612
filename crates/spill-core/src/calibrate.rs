//! Cache hit/miss latency calibration.

use crate::platform::{CacheFlusher, TimingProbe};
use crate::probe_buffer::ProbeBuffer;
use crate::util::median;
use log::{info, warn};
use serde::Serialize;

/// Median latencies of cache hits and misses on the probe buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Calibration {
    /// Median cycles of a load from a warm line
    pub hit: u64,
    /// Median cycles of a load from a flushed line
    pub miss: u64,
}

impl Calibration {
    /// Midpoint between hit and miss latency.
    pub fn threshold(&self) -> u64 {
        self.hit + self.miss.saturating_sub(self.hit) / 2
    }

    /// Returns `true` if hits are measurably faster than misses.
    pub fn separates(&self) -> bool {
        self.hit < self.miss
    }
}

/// Measures hit and miss latency over every probe page, `rounds` times.
///
/// A hit is measured by touching a page and then probing it, a miss by
/// flushing a page and then probing it.
pub fn calibrate<P>(platform: &P, buffer: &ProbeBuffer, rounds: usize) -> Calibration
where
    P: CacheFlusher + TimingProbe + ?Sized,
{
    let rounds = rounds.max(1);
    let mut hits = Vec::with_capacity(rounds * buffer.pages().count());
    let mut misses = Vec::with_capacity(hits.capacity());
    for _ in 0..rounds {
        for page in buffer.pages() {
            unsafe {
                platform.touch(page);
                hits.push(platform.probe(page));
                platform.flush(page);
                misses.push(platform.probe(page));
            }
        }
    }
    let calibration = Calibration {
        hit: median(&mut hits).unwrap_or_default(),
        miss: median(&mut misses).unwrap_or_default(),
    };
    if calibration.separates() {
        info!(
            "Cache hit takes {} cycles, miss {} cycles (threshold {})",
            calibration.hit,
            calibration.miss,
            calibration.threshold()
        );
    } else {
        warn!(
            "Cache hits ({} cycles) are not faster than misses ({} cycles)",
            calibration.hit, calibration.miss
        );
    }
    calibration
}
