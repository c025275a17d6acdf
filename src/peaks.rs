//! Onset detection over a filtered sample array.
//!
//! Peaks are found by scanning at a descending series of amplitude
//! thresholds derived from the global maximum. Each pass replaces the
//! previous one; the scan stops as soon as a pass yields enough peaks or
//! the threshold reaches its floor. Within a pass, every detected onset is
//! followed by a quarter-second dead zone so one onset's decay tail cannot
//! register twice.

use crate::config::{AnalyzerConfig, THRESHOLD_FLOOR, THRESHOLD_START, THRESHOLD_STEP};

/// Finds onset positions in `samples`, as ascending sample indices.
///
/// Returns an empty vector when the signal's global maximum does not exceed
/// the configured energy floor, or when no threshold pass detects anything.
/// Callers treat an empty result as "no detectable beats".
pub fn find_peaks(samples: &[f32], sample_rate: u32, config: &AnalyzerConfig) -> Vec<usize> {
    let max = samples.iter().copied().fold(0.0f32, f32::max);
    if max <= config.energy_floor() {
        return Vec::new();
    }

    let floor = THRESHOLD_FLOOR * max;
    let step = THRESHOLD_STEP * max;
    let mut threshold = THRESHOLD_START * max;

    let mut peaks = Vec::new();
    while peaks.len() < config.target_peak_count() && threshold >= floor {
        peaks = peaks_at_threshold(samples, threshold, sample_rate);
        threshold -= step;
    }
    peaks
}

/// One scan pass: records the last above-threshold index of every
/// excursion, then skips a quarter second before resuming.
///
/// Guarantees that returned indices are ascending and never closer than
/// `sample_rate / 4` samples.
pub(crate) fn peaks_at_threshold(
    samples: &[f32],
    threshold: f32,
    sample_rate: u32,
) -> Vec<usize> {
    let skip = (sample_rate / 4).saturating_sub(1) as usize;
    let mut peaks = Vec::new();
    let mut above = false;
    let mut i = 0;
    while i < samples.len() {
        let over = samples[i] > threshold;
        if above && !over {
            // `i` is the first sample back at or below the threshold; the
            // onset is the sample just before it.
            peaks.push(i - 1);
            i += skip;
        }
        above = over;
        i += 1;
    }
    if above {
        peaks.push(samples.len() - 1);
    }
    peaks
}
