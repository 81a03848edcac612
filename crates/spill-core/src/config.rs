//! Sampler configuration.

use crate::util::NUM_SAMPLES;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Upper bound on how often a transient read that yields zero is retried.
///
/// A bound of zero is treated as one, so every attempt reads at least once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryBound(u64);

impl RetryBound {
    /// Retry until the read yields a nonzero value or the region aborts.
    pub const UNBOUNDED: RetryBound = RetryBound(u64::MAX);

    /// Creates a bound of `retries` reads.
    pub const fn new(retries: u64) -> Self {
        RetryBound(retries)
    }

    /// Returns the number of reads to attempt, at least one.
    pub const fn get(&self) -> u64 {
        if self.0 == 0 { 1 } else { self.0 }
    }
}

impl Default for RetryBound {
    fn default() -> Self {
        RetryBound(1 << 16)
    }
}

impl From<u64> for RetryBound {
    fn from(value: u64) -> Self {
        RetryBound(value)
    }
}

/// Configuration parameters for [`ByteSampler`](crate::ByteSampler).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Number of leak/probe rounds voted over per byte
    pub samples: usize,
    /// Bound for the retry-while-zero loop of each transient read
    pub zero_retries: RetryBound,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            samples: NUM_SAMPLES,
            zero_retries: RetryBound::default(),
        }
    }
}

/// Errors that can occur when loading a [`SamplerConfig`].
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SamplerConfig {
    /// Loads configuration from a JSON file.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_jsonfile<P: AsRef<Path>>(filepath: P) -> Result<SamplerConfig, ConfigError> {
        let mut file = File::open(filepath.as_ref())?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: SamplerConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }
}
