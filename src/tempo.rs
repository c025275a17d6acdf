//! Interval histogram, tempo scoring, and beat-offset resolution.
//!
//! Detected onsets are turned into a histogram of pairwise sample
//! distances, each distance is mapped to a BPM folded into the canonical
//! range, and near-identical tempos are merged into scored candidates. The
//! winner's earliest onset fixes the phase of the beat grid.

use crate::config::{AnalyzerConfig, BPM_MATCH_TOLERANCE};
use crate::types::TempoGuess;

/// Onsets grouped by an exact pairwise sample distance.
#[derive(Debug, Clone)]
struct IntervalBucket {
    /// Representative distance in samples
    interval: usize,
    /// The earlier onset of every contributing pair
    peaks: Vec<usize>,
}

/// A candidate tempo with its cumulative score and backing onsets.
#[derive(Debug, Clone)]
pub struct TempoCandidate {
    /// Estimated tempo in BPM, folded into the canonical range
    pub bpm: f32,
    /// Weighted onset count; higher ranks first
    pub score: f32,
    /// Sample indices of the onsets backing this tempo
    pub peaks: Vec<usize>,
}

/// Scores tempo candidates from onset positions.
///
/// For each onset, the distances to its next few neighbors (a window of
/// `config.neighbor_window()` onsets including itself) are bucketed by
/// exact sample distance. Each bucket becomes a BPM estimate; estimates
/// merge into candidates exactly, or exchange partial credit when within
/// half a BPM of each other.
///
/// The result is ordered by descending score. Tie order is unspecified.
/// An empty onset list produces an empty result; translating that into a
/// "no beats" failure is the caller's job. Pure function: identical inputs
/// give identical candidates.
pub fn score_tempos(
    peaks: &[usize],
    sample_rate: u32,
    config: &AnalyzerConfig,
) -> Vec<TempoCandidate> {
    let buckets = interval_histogram(peaks, config.neighbor_window());

    let mut candidates: Vec<TempoCandidate> = Vec::new();
    for bucket in buckets {
        let bpm = fold_bpm(
            60.0 / (bucket.interval as f32 / sample_rate as f32),
            config.min_bpm(),
            config.max_bpm(),
        );
        let count = bucket.peaks.len() as f32;

        if let Some(existing) = candidates.iter_mut().find(|c| c.bpm == bpm) {
            existing.score += count;
            existing.peaks.extend_from_slice(&bucket.peaks);
            continue;
        }

        let mut candidate = TempoCandidate {
            bpm,
            score: count,
            peaks: bucket.peaks,
        };
        for existing in &mut candidates {
            let delta = (existing.bpm - bpm).abs();
            if delta <= BPM_MATCH_TOLERANCE {
                // Partial credit falls off linearly and reaches zero at the
                // tolerance boundary; both sides gain the same weight.
                let weight = count * (1.0 - 2.0 * delta);
                existing.score += weight;
                candidate.score += weight;
            }
        }
        candidates.push(candidate);
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

/// Resolves the winning candidate into a rounded tempo and the phase of
/// its first beat.
///
/// The offset is the earliest backing onset's time reduced into one beat
/// period, so it always lies in `[0, 60 / bpm)`.
pub fn resolve_offset(candidate: &TempoCandidate, sample_rate: u32) -> TempoGuess {
    let bpm = candidate.bpm.round() as u32;
    let period = 60.0 / bpm as f64;

    let earliest = candidate.peaks.iter().copied().min().unwrap_or(0);
    let mut offset = earliest as f64 / sample_rate as f64;
    while offset >= period {
        offset -= period;
    }

    TempoGuess { bpm, offset }
}

/// Builds the histogram of pairwise distances between nearby onsets.
///
/// Distances must be bit-identical to share a bucket; folding near misses
/// together happens later, in BPM space.
fn interval_histogram(peaks: &[usize], window: usize) -> Vec<IntervalBucket> {
    let mut buckets: Vec<IntervalBucket> = Vec::new();
    for (index, &peak) in peaks.iter().enumerate() {
        for &neighbor in peaks.iter().skip(index + 1).take(window - 1) {
            let interval = neighbor - peak;
            match buckets.iter_mut().find(|b| b.interval == interval) {
                Some(bucket) => bucket.peaks.push(peak),
                None => buckets.push(IntervalBucket {
                    interval,
                    peaks: vec![peak],
                }),
            }
        }
    }
    buckets
}

/// Folds a raw BPM estimate into `[min, max]` by octave doubling/halving.
fn fold_bpm(mut bpm: f32, min: f32, max: f32) -> f32 {
    while bpm < min {
        bpm *= 2.0;
    }
    while bpm > max {
        bpm /= 2.0;
    }
    bpm
}
