use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spill_core::platform::{CacheFlusher, TimingProbe, TransientLeak};
use spill_core::{ProbeBuffer, RetryBound, TargetAddr};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;

/// Latency reported for a warm line.
pub const HIT_CYCLES: u64 = 42;
/// Latency reported for a cold line.
pub const MISS_CYCLES: u64 = 280;

/// What a simulated transient read leaks.
#[derive(Clone, Debug)]
pub enum Leak {
    /// Every read yields the same byte.
    Constant(u8),
    /// Reads the target architecturally. Only valid for readable targets.
    Architectural,
    /// One entry per read, cycling. `None` models an aborted region.
    Script(Vec<Option<u8>>),
}

/// Simulated platform with a set-of-warm-lines cache model.
///
/// A byte of zero never warms a page, mirroring the retry-while-zero loop of
/// real hardware. Memory does not change under the simulation, so a zero
/// read exhausts any retry bound at once.
pub struct Sim {
    leak: Leak,
    noise: Option<(f64, RefCell<StdRng>)>,
    warm: RefCell<HashSet<usize>>,
    reads: Cell<usize>,
}

impl Sim {
    /// Creates a noise-free simulated platform.
    pub fn new(leak: Leak) -> Self {
        Sim {
            leak,
            noise: None,
            warm: RefCell::new(HashSet::new()),
            reads: Cell::new(0),
        }
    }

    /// Replaces the leaked byte by a random one with probability `rate`.
    ///
    /// # Arguments
    ///
    /// * `rate` - Probability (0.0-1.0) that a read warms a random page; NaN disables noise
    /// * `seed` - Seed for deterministic noise
    pub fn with_noise(mut self, rate: f64, seed: u64) -> Self {
        let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self.noise = Some((rate, RefCell::new(StdRng::seed_from_u64(seed))));
        self
    }

    /// Number of transient reads performed so far.
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    /// Returns `true` if the line containing `addr` is cache-warm.
    pub fn is_warm(&self, addr: *const u8) -> bool {
        self.warm.borrow().contains(&(addr as usize))
    }

    unsafe fn leaked_byte(&self, target: TargetAddr, read: usize) -> Option<u8> {
        match &self.leak {
            Leak::Constant(value) => Some(*value),
            Leak::Architectural => Some(unsafe { target.as_ptr().read_volatile() }),
            Leak::Script(rounds) if rounds.is_empty() => None,
            Leak::Script(rounds) => rounds[read % rounds.len()],
        }
    }
}

impl CacheFlusher for Sim {
    unsafe fn flush(&self, addr: *const u8) {
        self.warm.borrow_mut().remove(&(addr as usize));
    }

    unsafe fn touch(&self, addr: *const u8) {
        self.warm.borrow_mut().insert(addr as usize);
    }
}

impl TimingProbe for Sim {
    unsafe fn probe(&self, addr: *const u8) -> u64 {
        if self.warm.borrow_mut().remove(&(addr as usize)) {
            HIT_CYCLES
        } else {
            MISS_CYCLES
        }
    }
}

impl TransientLeak for Sim {
    unsafe fn transient_read(&self, target: TargetAddr, buffer: &ProbeBuffer, _: RetryBound) {
        let read = self.reads.get();
        self.reads.set(read + 1);
        let mut value = unsafe { self.leaked_byte(target, read) };
        if let Some((rate, rng)) = &self.noise {
            let mut rng = rng.borrow_mut();
            if rng.random_bool(*rate) {
                let noise = rng.random::<u8>();
                trace!("noise: read {} leaks 0x{:02x} instead of {:02x?}", read, noise, value);
                value = Some(noise);
            }
        }
        match value {
            Some(0) | None => debug!("read {} of {:?} touched no page", read, target),
            Some(value) => unsafe { self.touch(buffer.page(value)) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spill_core::{ByteSampler, SamplerConfig, calibrate};

    #[test]
    fn test_constant_leak() -> anyhow::Result<()> {
        let mut buffer = ProbeBuffer::new()?;
        let sampler = ByteSampler::new(Sim::new(Leak::Constant(0x41)));
        let sample = unsafe { sampler.sample(TargetAddr::new(0xdead), &mut buffer) };
        assert_eq!(sample.byte, 0x41);
        assert!(sample.is_unanimous());
        assert_eq!(sampler.platform().reads(), 3);
        Ok(())
    }

    #[test]
    fn test_architectural_leak() -> anyhow::Result<()> {
        static SECRET: &[u8] = b"usage";
        let mut buffer = ProbeBuffer::new()?;
        let sampler = ByteSampler::new(Sim::new(Leak::Architectural));
        let bytes: Vec<u8> = TargetAddr::from(SECRET.as_ptr())
            .range(SECRET.len())
            .map(|addr| unsafe { sampler.sample_byte(addr, &mut buffer) })
            .collect();
        assert_eq!(bytes, SECRET);
        Ok(())
    }

    #[test]
    fn test_zero_byte_leaves_buffer_cold() -> anyhow::Result<()> {
        static ZERO: u8 = 0;
        let mut buffer = ProbeBuffer::new()?;
        let sim = Sim::new(Leak::Architectural);
        unsafe { sim.leak(TargetAddr::from(&ZERO as *const u8), &buffer, RetryBound::UNBOUNDED) };
        assert!(buffer.pages().all(|p| !sim.is_warm(p)));

        let sampler = ByteSampler::new(sim);
        let sample = unsafe { sampler.sample(TargetAddr::from(&ZERO as *const u8), &mut buffer) };
        assert_eq!(sample.byte, 0);
        assert_eq!(sample.votes, vec![0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_leak_flushes_stale_lines() -> anyhow::Result<()> {
        let buffer = ProbeBuffer::new()?;
        let sim = Sim::new(Leak::Constant(0x20));
        unsafe {
            sim.touch(buffer.page(0x10));
            sim.touch(buffer.page(0xff));
            sim.leak(TargetAddr::new(0), &buffer, RetryBound::default());
        }
        let warm: Vec<u8> = (0..=255u8).filter(|&v| sim.is_warm(buffer.page(v))).collect();
        assert_eq!(warm, vec![0x20]);
        Ok(())
    }

    #[test]
    fn test_probe_is_self_cleaning() -> anyhow::Result<()> {
        let buffer = ProbeBuffer::new()?;
        let sim = Sim::new(Leak::Constant(1));
        let page = buffer.page(9);
        unsafe {
            sim.touch(page);
            assert_eq!(sim.probe(page), HIT_CYCLES);
            assert_eq!(sim.probe(page), MISS_CYCLES);
        }
        Ok(())
    }

    #[test]
    fn test_script_cycles() -> anyhow::Result<()> {
        let mut buffer = ProbeBuffer::new()?;
        let sampler = ByteSampler::with_config(
            Sim::new(Leak::Script(vec![Some(5), None, Some(5), Some(9)])),
            SamplerConfig {
                samples: 4,
                ..Default::default()
            },
        );
        let sample = unsafe { sampler.sample(TargetAddr::new(0), &mut buffer) };
        assert_eq!(sample.votes, vec![5, 0, 5, 9]);
        assert_eq!(sample.byte, 5);
        Ok(())
    }

    #[test]
    fn test_noise_is_outvoted() -> anyhow::Result<()> {
        let mut buffer = ProbeBuffer::new()?;
        let sampler = ByteSampler::new(Sim::new(Leak::Constant(0x75)).with_noise(0.2, 0x42));
        let correct = (0..200)
            .filter(|&i| unsafe { sampler.sample_byte(TargetAddr::new(i), &mut buffer) } == 0x75)
            .count();
        assert!(correct >= 150, "only {} of 200 bytes recovered", correct);
        Ok(())
    }

    #[test]
    fn test_nan_noise_rate_is_silent() -> anyhow::Result<()> {
        let mut buffer = ProbeBuffer::new()?;
        let sampler = ByteSampler::new(Sim::new(Leak::Constant(0x33)).with_noise(f64::NAN, 3));
        for i in 0..16 {
            assert_eq!(unsafe { sampler.sample_byte(TargetAddr::new(i), &mut buffer) }, 0x33);
        }
        Ok(())
    }

    #[test]
    fn test_noise_is_deterministic() -> anyhow::Result<()> {
        let mut buffer = ProbeBuffer::new()?;
        let run = |buffer: &mut ProbeBuffer| -> Vec<u8> {
            let sampler = ByteSampler::new(Sim::new(Leak::Constant(1)).with_noise(0.5, 7));
            (0..32)
                .map(|i| unsafe { sampler.sample_byte(TargetAddr::new(i), buffer) })
                .collect()
        };
        assert_eq!(run(&mut buffer), run(&mut buffer));
        Ok(())
    }

    #[test]
    fn test_calibration() -> anyhow::Result<()> {
        let buffer = ProbeBuffer::new()?;
        let calibration = calibrate(&Sim::new(Leak::Constant(1)), &buffer, 1);
        assert_eq!(calibration.hit, HIT_CYCLES);
        assert_eq!(calibration.miss, MISS_CYCLES);
        Ok(())
    }
}
