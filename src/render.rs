//! Offline rendering of a decoded buffer into filtered mono samples.
//!
//! Beat energy lives in the low end, so the source is run through a
//! low-pass biquad (240 Hz by default) before any peak scanning. Rendering
//! happens at the source sample rate; only channel 0 is kept.

use fundsp::hacker32::*;

use crate::config::LOWPASS_Q;
use crate::error::{Error, Result};
use crate::types::{AudioBuffer, RenderedAudio};

/// Renders `duration` seconds of `buffer`, starting `offset` seconds in,
/// through a low-pass filter at `cutoff_hz`.
///
/// The output always holds exactly `round(duration * sample_rate)` frames;
/// a window reaching past the end of the source is padded by running
/// silence through the filter, which lets the filter tail ring out the way
/// an offline render would.
///
/// # Errors
///
/// Returns [`Error::InvalidRenderWindow`] if the window is empty, has a
/// negative offset, or starts past the end of the buffer.
pub fn render(
    buffer: &AudioBuffer,
    offset: f64,
    duration: f64,
    cutoff_hz: f32,
) -> Result<RenderedAudio> {
    let sample_rate = buffer.sample_rate();
    let frames = (duration * sample_rate as f64).round() as usize;
    let invalid = !offset.is_finite() || !duration.is_finite() || offset < 0.0 || frames == 0;
    if invalid {
        return Err(Error::InvalidRenderWindow { offset, duration });
    }

    let start = (offset * sample_rate as f64).round() as usize;
    if start >= buffer.frames() {
        return Err(Error::InvalidRenderWindow { offset, duration });
    }

    let mut filter = lowpass_hz(cutoff_hz, LOWPASS_Q);
    filter.set_sample_rate(sample_rate as f64);
    filter.reset();

    let source = buffer.channel(0);
    let end = std::cmp::Ord::min(start + frames, source.len());

    let mut samples = Vec::with_capacity(frames);
    for &sample in &source[start..end] {
        samples.push(filter.filter_mono(sample));
    }
    while samples.len() < frames {
        samples.push(filter.filter_mono(0.0));
    }

    Ok(RenderedAudio {
        samples,
        sample_rate,
    })
}
