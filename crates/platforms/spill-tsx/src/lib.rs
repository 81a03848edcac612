//! Intel TSX platform for Spill.
//!
//! This crate implements the [`spill_core::platform`] capabilities on x86_64 CPUs with
//! restricted transactional memory (RTM). The transient read runs inside an RTM region:
//! when the read faults, the region aborts and discards every architectural effect, but
//! the probe page fetched by the dependent load stays in the cache.
//!
//! Implements [`spill_core::platform::CacheFlusher`], [`spill_core::platform::TimingProbe`]
//! and [`spill_core::platform::TransientLeak`].
//!
//! # Platform Requirements
//!
//! - x86_64 CPU advertising RTM (CPUID leaf 7, EBX bit 11) with TSX not disabled by microcode
//! - A kernel that leaves the transient behaviour observable (no page table isolation
//!   hiding the target mapping)
//!
//! # References
//!
//! Based on: Lipp et al., "Meltdown: Reading Kernel Memory from User Space",
//! USENIX Security 2018, and Yarom and Falkner, "Flush+Reload", USENIX Security 2014.

#![warn(missing_docs)]

mod tsx;

pub use tsx::{Tsx, TsxError, rtm_supported};
