//! # Spill
//!
//! Spill recovers bytes the calling process is not permitted to read. A transient
//! load of the target byte runs inside a hardware transaction that swallows the
//! resulting fault. A dependent access encodes the byte into which of 256 probe
//! pages becomes cache-warm, and timing those pages (Flush+Reload) recovers it.
//!
//! ## Crates
//!
//! - `spill-core` (re-exported here): the [`ByteSampler`], the [`ProbeBuffer`] and the
//!   [`platform`] capability traits the sampler is written against.
//! - `spill-tsx` (feature `tsx`): the x86_64 platform using Intel TSX for fault suppression.
//! - `spill-sim` (feature `sim`): a deterministic simulated platform for testing.
//!
//! ## Quickstart guide
//!
//! ```sh
//! cargo build --release
//! # self-test: leak the binary's own usage message
//! cargo run --release --bin=spill
//! # leak 64 bytes starting at an address
//! cargo run --release --bin=spill -- 0xffffffff81a000e0 64
//! ```
//!
//! ## External Crates
//!
//! - `log`: Used for logging throughout the crate.

pub use spill_core::*;

#[cfg(feature = "sim")]
pub use spill_sim as sim;
#[cfg(feature = "tsx")]
pub use spill_tsx as tsx;
