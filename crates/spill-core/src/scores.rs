//! Per-round timing vectors and per-byte vote tallies.

use crate::util::CANDIDATES;
use itertools::Itertools;
use serde::{Serialize, Serializer};
use std::cmp::Reverse;

/// Access latency of every probe page measured after one leak attempt.
///
/// Index `k` holds the latency of the page signalling value `k`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessTimes([u64; CANDIDATES]);

impl AccessTimes {
    /// Builds the vector by measuring each candidate in order.
    pub fn from_fn(mut f: impl FnMut(u8) -> u64) -> Self {
        AccessTimes(std::array::from_fn(|value| f(value as u8)))
    }

    /// Returns the latency measured for `value`.
    pub fn get(&self, value: u8) -> u64 {
        self.0[value as usize]
    }

    /// Returns the candidate with the fastest access, i.e. the warm page.
    ///
    /// Ties go to the lowest candidate. A round in which no page was touched
    /// therefore tends to vote for `0`.
    pub fn fastest(&self) -> u8 {
        self.0.iter().position_min().unwrap_or(0) as u8
    }
}

impl From<[u64; CANDIDATES]> for AccessTimes {
    fn from(value: [u64; CANDIDATES]) -> Self {
        AccessTimes(value)
    }
}

/// Number of rounds that voted for each candidate value.
#[derive(Clone, PartialEq, Eq)]
pub struct ScoreVector([u32; CANDIDATES]);

impl ScoreVector {
    /// Creates an all-zero tally.
    pub fn new() -> Self {
        ScoreVector([0; CANDIDATES])
    }

    /// Adds one vote for `value`.
    pub fn vote(&mut self, value: u8) {
        self.0[value as usize] = self.0[value as usize].saturating_add(1);
    }

    /// Returns the number of votes for `value`.
    pub fn get(&self, value: u8) -> u32 {
        self.0[value as usize]
    }

    /// Returns the total number of votes cast.
    pub fn total(&self) -> u32 {
        self.0.iter().fold(0u32, |acc, &n| acc.saturating_add(n))
    }

    /// Returns the candidate with the most votes. Ties go to the lowest candidate.
    pub fn best(&self) -> u8 {
        self.0.iter().position_min_by_key(|&&s| Reverse(s)).unwrap_or(0) as u8
    }
}

impl Default for ScoreVector {
    fn default() -> Self {
        Self::new()
    }
}

impl From<[u32; CANDIDATES]> for ScoreVector {
    fn from(value: [u32; CANDIDATES]) -> Self {
        ScoreVector(value)
    }
}

impl core::fmt::Debug for ScoreVector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(
                self.0
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| **s != 0)
                    .map(|(v, s)| (format!("{:#04x}", v), s)),
            )
            .finish()
    }
}

impl Serialize for ScoreVector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.0.iter())
    }
}
