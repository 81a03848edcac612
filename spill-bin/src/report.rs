use log::info;
use serde::Serialize;
use spill_core::{Calibration, Sample, SamplerConfig, TargetAddr};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Duration;

/// Results of one leak campaign.
#[derive(Debug, Serialize)]
pub struct LeakReport {
    /// RFC 3339 timestamp of when the campaign finished
    pub date: String,
    /// Name of the platform backend
    pub backend: String,
    /// Sampler configuration used for every byte
    pub config: SamplerConfig,
    /// Cache latencies measured before leaking, if requested
    pub calibration: Option<Calibration>,
    /// First sampled address
    pub start: TargetAddr,
    /// Number of sampled addresses
    pub length: usize,
    /// Wall-clock duration of the campaign
    pub duration_ms: u64,
    /// Per-byte results
    pub samples: Vec<Sample>,
}

impl LeakReport {
    /// Assembles a report, stamping it with the current local time.
    pub fn new(
        backend: &str,
        config: SamplerConfig,
        calibration: Option<Calibration>,
        start: TargetAddr,
        samples: Vec<Sample>,
        duration: Duration,
    ) -> Self {
        Self {
            date: chrono::Local::now().to_rfc3339(),
            backend: backend.to_string(),
            config,
            calibration,
            start,
            length: samples.len(),
            duration_ms: duration.as_millis() as u64,
            samples,
        }
    }

    /// The recovered bytes in address order.
    pub fn bytes(&self) -> Vec<u8> {
        self.samples.iter().map(|s| s.byte).collect()
    }

    /// Fraction of bytes on which every round agreed.
    pub fn unanimous_rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let unanimous = self.samples.iter().filter(|s| s.is_unanimous()).count();
        unanimous as f64 / self.samples.len() as f64
    }

    /// Writes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn save_to_file(&self, filename: &str) -> anyhow::Result<()> {
        let file = File::create(filename)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!("Results saved to {}", filename);
        Ok(())
    }
}
