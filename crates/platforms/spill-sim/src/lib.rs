//! Simulated platform for testing.
//!
//! This crate provides a deterministic platform that models the cache as a set of
//! warm addresses with fixed hit and miss latencies. Instead of reading its target
//! transiently, it warms probe pages according to a configurable [`Leak`] behaviour.
//! Useful for exercising the sampling pipeline on machines without RTM.
//!
//! Implements the [`spill_core::platform`] capability traits.
//!
//! # Use Cases
//!
//! - Integration testing of the sampling and voting logic
//! - Injecting scripted or random noise into leak rounds
//! - Running the self-test on CPUs without transactional memory

#![warn(missing_docs)]

mod sim;

pub use sim::{HIT_CYCLES, Leak, MISS_CYCLES, Sim};
