/// Page shift value (12 bits) for 4KB pages
pub const PAGE_SHIFT: usize = 12;
/// Standard page size (4096 bytes)
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
/// Mask for extracting page offset
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Number of candidate values a leaked byte can take, one probe page each
pub const CANDIDATES: usize = 256;

/// Size of the probe buffer (one page per candidate value)
pub const PROBE_BUFFER_SIZE: usize = CANDIDATES * PAGE_SIZE;

/// Default number of leak/probe rounds voted over per byte
pub const NUM_SAMPLES: usize = 3;

/// Default number of calibration rounds
pub const CALIBRATION_ROUNDS: usize = 1_000;
