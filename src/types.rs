//! Core types for decoded audio and analysis results.

use crate::error::{Error, Result};

/// A decoded, multi-channel audio buffer.
///
/// This is the analyzer's only input: per-channel floating-point sample
/// arrays at a common sample rate, produced by whatever decoded the source
/// (a file reader, a network fetch, a bundled asset). The analyzer treats
/// it as opaque and read-only.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Creates a buffer from per-channel sample arrays.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBuffer`] if there are no channels, the
    /// channels differ in length, or the sample rate is zero.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidBuffer("sample rate must be positive".to_string()));
        }
        let Some(first) = channels.first() else {
            return Err(Error::InvalidBuffer("buffer has no channels".to_string()));
        };
        let frames = first.len();
        if channels.iter().any(|channel| channel.len() != frames) {
            return Err(Error::InvalidBuffer(
                "channels differ in length".to_string(),
            ));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Creates a single-channel buffer.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(vec![samples], sample_rate)
    }

    /// Returns the sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Returns the number of frames per channel.
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    /// Returns the buffer length in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Returns one channel's samples.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range; `new` guarantees at least one
    /// channel, so `channel(0)` is always valid.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }
}

/// Output of the offline renderer: one low-pass-filtered channel plus the
/// rate it was rendered at. Consumed exactly once by the analysis pipeline.
#[derive(Debug, Clone)]
pub struct RenderedAudio {
    /// Filtered mono samples
    pub samples: Vec<f32>,
    /// Sample rate of `samples` in Hz (equals the source rate)
    pub sample_rate: u32,
}

/// A resolved tempo with the phase of the first beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoGuess {
    /// Tempo rounded to the nearest whole BPM
    pub bpm: u32,
    /// Time of the first beat within one beat period, in seconds;
    /// always in `[0, 60 / bpm)`
    pub offset: f64,
}
