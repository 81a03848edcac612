//! # Spill Core
//!
//! `spill-core` is the foundational library of Spill, which recovers bytes the
//! calling process may not read by combining a transient (speculative) load with
//! a Flush+Reload cache covert channel.
//!
//! ## Architecture Overview
//!
//! The hardware-specific parts are hidden behind capability traits in [`platform`]:
//!
//! - [`platform::CacheFlusher`] - evicts a cache line from all cache levels.
//! - [`platform::TimingProbe`] - measures the latency of one load in cycles.
//! - [`platform::TransientLeak`] - reads a byte transiently, suppressing the fault,
//!   and encodes it into which page of a [`ProbeBuffer`] becomes cache-warm.
//!
//! ## Main Components
//!
//! - [`ByteSampler`] - drives repeated leak/probe rounds against a [`TargetAddr`] and
//!   picks the recovered byte by majority vote.
//! - [`ProbeBuffer`] - the 256-page receive buffer of the covert channel.
//! - [`calibrate()`] - measures cache hit and miss latency on the current platform.
//! - [`util`] module - constants describing the buffer geometry and progress styling.
//!
//! ## Platform Support
//!
//! Platform implementations live in separate crates: `spill-tsx` for x86_64 CPUs
//! with restricted transactional memory, and `spill-sim` for a deterministic
//! simulation used in tests.

#![warn(missing_docs)]

mod calibrate;
mod config;
pub mod platform;
mod probe_buffer;
mod sampler;
mod scores;
mod target;
pub mod util;

pub use crate::calibrate::{Calibration, calibrate};
pub use crate::config::{ConfigError, RetryBound, SamplerConfig};
pub use crate::probe_buffer::ProbeBuffer;
pub use crate::sampler::{ByteSampler, Sample};
pub use crate::scores::{AccessTimes, ScoreVector};
pub use crate::target::{ParseTargetError, TargetAddr};
