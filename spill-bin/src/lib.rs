//! # Spill
//!
//! Command line front end for the Spill byte sampler. The `spill` binary either
//! leaks a range of addresses and prints it as a hex dump, or, when called
//! without a valid address range, leaks its own usage message as a self-test.
//!
//! ## Modules
//!
//! - `hexdump`: Streams recovered bytes as rows of 16 in hex and ASCII.
//! - `report`: JSON report of a leak campaign.
pub mod hexdump;
pub mod report;

use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

/// Initializes `env_logger` (default level `info`) behind a progress-aware writer.
///
/// Log lines are printed above any progress bar added to the returned
/// [`MultiProgress`] instead of tearing through it.
pub fn init_logging_with_progress() -> anyhow::Result<MultiProgress> {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    let level = logger.filter();
    let progress = MultiProgress::new();
    LogWrapper::new(progress.clone(), logger).try_init()?;
    log::set_max_level(level);
    Ok(progress)
}
