//! # beatfinder
//!
//! Tempo and beat-offset estimation for decoded audio, designed to drive
//! beat-synchronized visuals without stalling the thread that renders them.
//!
//! ## Features
//!
//! - Offline low-pass rendering of a decoded buffer into filtered mono
//!   samples
//! - Onset detection by descending-threshold peak scanning
//! - Tempo scoring from an interval histogram, folded into a canonical
//!   BPM range
//! - First-beat phase resolution for the winning tempo
//! - A persistent background worker with correlation-tagged request and
//!   response envelopes, so many analyses can be in flight at once
//!
//! ## Example
//!
//! ```
//! use beatfinder::{Analyzer, AnalyzerConfig, AudioBuffer};
//!
//! // A 4-second, 44.1 kHz click track at 120 BPM: 50 ms pulses every
//! // half second.
//! let mut samples = vec![0.0f32; 4 * 44100];
//! let mut start = 0;
//! while start < samples.len() {
//!     let end = (start + 2205).min(samples.len());
//!     samples[start..end].fill(1.0);
//!     start += 22050;
//! }
//! let buffer = AudioBuffer::from_mono(samples, 44100)?;
//!
//! let analyzer = Analyzer::spawn(AnalyzerConfig::default())?;
//! let guess = analyzer.guess(&buffer)?;
//! assert_eq!(guess.bpm, 120);
//! # Ok::<(), beatfinder::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod peaks;
pub mod render;
pub mod tempo;
pub mod types;
pub mod worker;

pub use config::AnalyzerConfig;
pub use error::{Error, Result};
pub use render::render;
pub use tempo::TempoCandidate;
pub use types::{AudioBuffer, RenderedAudio, TempoGuess};
pub use worker::{AnalysisOutput, Analyzer, PendingAnalysis};

/// Estimates the tempo of an already-rendered sample array.
///
/// `samples` is expected to be the output of [`render`]: one low-pass
/// filtered channel at `sample_rate`. Returns the top candidate's raw,
/// un-rounded BPM.
///
/// This is the `analyze` pipeline the worker runs; call it directly when
/// no background thread is wanted.
///
/// # Errors
///
/// Returns [`Error::NoBeatsDetected`] when no usable onsets exist.
pub fn estimate_tempo(samples: &[f32], sample_rate: u32, config: &AnalyzerConfig) -> Result<f32> {
    let peaks = peaks::find_peaks(samples, sample_rate, config);
    let candidates = tempo::score_tempos(&peaks, sample_rate, config);
    candidates
        .first()
        .map(|candidate| candidate.bpm)
        .ok_or(Error::NoBeatsDetected)
}

/// Estimates a rounded tempo and first-beat phase from an
/// already-rendered sample array.
///
/// This is the `guess` pipeline the worker runs.
///
/// # Errors
///
/// Returns [`Error::NoBeatsDetected`] when no usable onsets exist.
pub fn guess_beat(
    samples: &[f32],
    sample_rate: u32,
    config: &AnalyzerConfig,
) -> Result<TempoGuess> {
    let peaks = peaks::find_peaks(samples, sample_rate, config);
    let mut candidates = tempo::score_tempos(&peaks, sample_rate, config);
    if candidates.is_empty() {
        return Err(Error::NoBeatsDetected);
    }
    let top = candidates.swap_remove(0);
    Ok(tempo::resolve_offset(&top, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44100;

    /// Unit impulses every `spacing` samples.
    fn impulse_train(spacing: usize, total: usize) -> Vec<f32> {
        let mut samples = vec![0.0f32; total];
        let mut i = 0;
        while i < total {
            samples[i] = 1.0;
            i += spacing;
        }
        samples
    }

    #[test]
    fn estimates_120_bpm_from_exact_impulses() {
        // round(44100 * 60 / 120) = 22050 samples between beats.
        let samples = impulse_train(22050, 4 * RATE as usize);
        let bpm = estimate_tempo(&samples, RATE, &AnalyzerConfig::default()).unwrap();
        assert!((bpm - 120.0).abs() < 1.0, "got {bpm}");
    }

    #[test]
    fn sixty_bpm_impulses_fold_to_120() {
        let samples = impulse_train(44100, 6 * RATE as usize);
        let bpm = estimate_tempo(&samples, RATE, &AnalyzerConfig::default()).unwrap();
        assert!((bpm - 120.0).abs() < 1.0, "got {bpm}");
    }

    #[test]
    fn low_energy_signals_are_rejected() {
        let samples: Vec<f32> = impulse_train(22050, 2 * RATE as usize)
            .into_iter()
            .map(|s| s * 0.25)
            .collect();
        assert!(matches!(
            estimate_tempo(&samples, RATE, &AnalyzerConfig::default()),
            Err(Error::NoBeatsDetected)
        ));
    }

    #[test]
    fn guess_reports_phase_of_the_first_impulse() {
        // Impulses shifted 0.1 s into the buffer.
        let mut samples = vec![0.0f32; 4 * RATE as usize];
        let shift = RATE as usize / 10;
        let mut i = shift;
        while i < samples.len() {
            samples[i] = 1.0;
            i += 22050;
        }
        let guess = guess_beat(&samples, RATE, &AnalyzerConfig::default()).unwrap();
        assert_eq!(guess.bpm, 120);
        assert!((guess.offset - 0.1).abs() < 1e-6, "offset {}", guess.offset);
    }

    #[test]
    fn guess_rejects_all_zero_buffers_without_nan() {
        let result = guess_beat(&vec![0.0; RATE as usize], RATE, &AnalyzerConfig::default());
        assert!(matches!(result, Err(Error::NoBeatsDetected)));
    }
}
