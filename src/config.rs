//! Configuration types for the tempo analyzer.

use std::time::Duration;

use crate::error::{Error, Result};

/// Cutoff frequency of the pre-analysis low-pass filter (Hz)
const LOWPASS_HZ: f32 = 240.0;
/// Resonance of the pre-analysis low-pass filter
pub(crate) const LOWPASS_Q: f32 = 1.0;
/// Signals whose global maximum never exceeds this are treated as beatless
const ENERGY_FLOOR: f32 = 0.25;
/// Peak count at which the descending threshold scan stops early
const TARGET_PEAK_COUNT: usize = 30;
/// First scan threshold, as a fraction of the global maximum
pub(crate) const THRESHOLD_START: f32 = 0.95;
/// Per-pass threshold decrement, as a fraction of the global maximum
pub(crate) const THRESHOLD_STEP: f32 = 0.05;
/// Lowest usable threshold, as a fraction of the global maximum
pub(crate) const THRESHOLD_FLOOR: f32 = 0.3;
/// How many peaks (including the starting one) each interval scan spans
const NEIGHBOR_WINDOW: usize = 10;
/// Candidates this close in BPM exchange partial credit when merging
pub(crate) const BPM_MATCH_TOLERANCE: f32 = 0.5;
/// Size of the request/response queues between caller and worker
const QUEUE_SIZE: usize = 64;

/// Default lower bound of the canonical BPM range
const MIN_BPM: f32 = 90.0;
/// Default upper bound of the canonical BPM range
const MAX_BPM: f32 = 180.0;

/// Configuration for the tempo analyzer.
///
/// Use the builder pattern to customize analyzer parameters:
///
/// # Example
///
/// ```
/// use beatfinder::AnalyzerConfig;
///
/// let config = AnalyzerConfig::builder()
///     .min_bpm(70.0)
///     .max_bpm(140.0)
///     .target_peak_count(20)
///     .build();
/// ```
#[derive(Clone, Debug, Copy, bon::Builder)]
pub struct AnalyzerConfig {
    /// Lower bound of the canonical BPM range; estimates below it are
    /// doubled until they fit (default: 90.0)
    #[builder(default = MIN_BPM)]
    min_bpm: f32,
    /// Upper bound of the canonical BPM range; estimates above it are
    /// halved until they fit (default: 180.0)
    #[builder(default = MAX_BPM)]
    max_bpm: f32,
    /// Cutoff of the low-pass filter applied before analysis (default: 240.0)
    #[builder(default = LOWPASS_HZ)]
    lowpass_hz: f32,
    /// Global-maximum floor below which a signal is considered beatless
    /// (default: 0.25)
    #[builder(default = ENERGY_FLOOR)]
    energy_floor: f32,
    /// Stop lowering the detection threshold once a pass finds this many
    /// peaks (default: 30)
    #[builder(default = TARGET_PEAK_COUNT)]
    target_peak_count: usize,
    /// Number of peaks each interval scan spans, including the starting
    /// peak (default: 10)
    #[builder(default = NEIGHBOR_WINDOW)]
    neighbor_window: usize,
    /// Size of the request/response queues between caller and worker
    /// (default: 64)
    #[builder(default = QUEUE_SIZE)]
    queue_size: usize,
    /// Deadline applied by blocking calls; `None` waits indefinitely
    /// (default: None)
    request_timeout: Option<Duration>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AnalyzerConfig {
    /// Returns the lower bound of the canonical BPM range.
    pub fn min_bpm(&self) -> f32 {
        self.min_bpm
    }

    /// Returns the upper bound of the canonical BPM range.
    pub fn max_bpm(&self) -> f32 {
        self.max_bpm
    }

    /// Returns the low-pass cutoff frequency in Hz.
    pub fn lowpass_hz(&self) -> f32 {
        self.lowpass_hz
    }

    /// Returns the minimum-energy floor.
    pub fn energy_floor(&self) -> f32 {
        self.energy_floor
    }

    /// Returns the peak count that ends the threshold scan.
    pub fn target_peak_count(&self) -> usize {
        self.target_peak_count
    }

    /// Returns the interval-scan window size.
    pub fn neighbor_window(&self) -> usize {
        self.neighbor_window
    }

    /// Returns the queue size setting.
    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    /// Returns the request deadline, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.min_bpm <= 0.0 {
            return Err(Error::InvalidConfig("min_bpm must be positive".to_string()));
        }
        if self.max_bpm < self.min_bpm * 2.0 {
            // Octave folding only terminates when the range spans a doubling.
            return Err(Error::InvalidConfig(
                "max_bpm must be at least twice min_bpm".to_string(),
            ));
        }
        if self.lowpass_hz <= 0.0 {
            return Err(Error::InvalidConfig(
                "lowpass_hz must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.energy_floor) {
            return Err(Error::InvalidConfig(
                "energy_floor must be in [0, 1)".to_string(),
            ));
        }
        if self.target_peak_count == 0 {
            return Err(Error::InvalidConfig(
                "target_peak_count must be positive".to_string(),
            ));
        }
        if self.neighbor_window < 2 {
            return Err(Error::InvalidConfig(
                "neighbor_window must be at least 2".to_string(),
            ));
        }
        if self.queue_size == 0 {
            return Err(Error::InvalidConfig(
                "queue_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
