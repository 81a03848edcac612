//! Platform capability traits.
//!
//! The sampling algorithm is written once against these traits. Each supported
//! architecture provides one implementation (see `spill-tsx`), and tests inject
//! a deterministic fake (see `spill-sim`).
//!
//! - [`CacheFlusher`] - evicts a cache line from every cache level
//! - [`TimingProbe`] - measures the latency of a single load
//! - [`TransientLeak`] - encodes a byte into probe buffer cache state without faulting
//! - [`Platform`] - all of the above

use crate::config::RetryBound;
use crate::probe_buffer::ProbeBuffer;
use crate::target::TargetAddr;

/// Capability to evict cache lines.
pub trait CacheFlusher {
    /// Evicts the line containing `addr` from all cache levels.
    ///
    /// A full memory fence precedes the eviction so it is ordered after every
    /// earlier memory operation.
    ///
    /// # Safety
    ///
    /// `addr` must point into mapped memory.
    unsafe fn flush(&self, addr: *const u8);

    /// Loads from `addr`, leaving its line cache-warm.
    ///
    /// # Safety
    ///
    /// `addr` must be readable.
    unsafe fn touch(&self, addr: *const u8) {
        let _ = unsafe { addr.read_volatile() };
    }
}

/// Capability to time a single memory access.
pub trait TimingProbe {
    /// Returns the number of cycles one load from `addr` takes.
    ///
    /// The probed line is evicted afterwards, so probing the same address in
    /// the next round starts cold again. A cache hit is expected to take tens
    /// of cycles, a miss hundreds.
    ///
    /// # Safety
    ///
    /// `addr` must be readable.
    unsafe fn probe(&self, addr: *const u8) -> u64;
}

/// Capability to read a byte transiently and encode it into cache state.
///
/// The implementation must suppress any fault the read raises. Its only
/// observable effect is that at most one page of the probe buffer becomes
/// cache-warm.
pub trait TransientLeak: CacheFlusher {
    /// Reads the byte at `target` transiently and touches `buffer.page(byte)`.
    ///
    /// A zero byte cannot be told apart from a read that never executed, so the
    /// read is retried while it yields zero, at most `retries` times. When the
    /// bound is exhausted no page is touched. When the fault-suppression region
    /// fails to start, nothing is read and no page is touched either.
    ///
    /// # Safety
    ///
    /// Either `target` must be readable, or the implementation must contain
    /// the fault raised by reading it.
    unsafe fn transient_read(
        &self,
        target: TargetAddr,
        buffer: &ProbeBuffer,
        retries: RetryBound,
    );

    /// Performs one leak attempt: evicts all probe pages, then reads `target`
    /// transiently.
    ///
    /// # Safety
    ///
    /// See [`transient_read`](TransientLeak::transient_read).
    unsafe fn leak(&self, target: TargetAddr, buffer: &ProbeBuffer, retries: RetryBound) {
        buffer.flush(self);
        unsafe { self.transient_read(target, buffer, retries) };
    }
}

/// A complete platform: everything [`ByteSampler`](crate::ByteSampler) needs.
pub trait Platform: CacheFlusher + TimingProbe + TransientLeak {}

impl<T> Platform for T where T: CacheFlusher + TimingProbe + TransientLeak {}
