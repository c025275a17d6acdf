use std::path::PathBuf;

use anyhow::{Context, Result};
use beatfinder::{Analyzer, AnalyzerConfig, AudioBuffer};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(clap::Parser, Debug)]
struct Args {
    /// WAV file to analyze
    path: PathBuf,
    /// Offset into the file, in seconds
    #[clap(short, long, default_value_t = 0.0)]
    offset: f64,
    /// Length of the analyzed window, in seconds (default: the rest of
    /// the file)
    #[clap(short, long)]
    duration: Option<f64>,
    /// Print only the raw tempo estimate, skipping beat-offset resolution
    #[clap(long)]
    tempo_only: bool,
}

fn main() -> Result<()> {
    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let args = Args::parse();

    let buffer = read_wav(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;

    tracing::info!(
        "Loaded {:.1}s of audio at {} Hz ({} channels)",
        buffer.duration(),
        buffer.sample_rate(),
        buffer.channel_count()
    );

    let analyzer = Analyzer::spawn(AnalyzerConfig::default())?;

    if args.tempo_only {
        let bpm = analyzer.analyze_window(&buffer, args.offset, args.duration)?;
        println!("{bpm:.2} BPM");
    } else {
        let guess = analyzer.guess_window(&buffer, args.offset, args.duration)?;
        println!("{} BPM, first beat at {:.3}s", guess.bpm, guess.offset);
    }

    Ok(())
}

/// Reads a WAV file into per-channel floating-point samples.
fn read_wav(path: &PathBuf) -> Result<AudioBuffer> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("bad float sample")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()
                .context("bad integer sample")?
        }
    };

    let channel_count = spec.channels as usize;
    let channels: Vec<Vec<f32>> = (0..channel_count)
        .map(|channel| {
            interleaved
                .iter()
                .skip(channel)
                .step_by(channel_count)
                .copied()
                .collect()
        })
        .collect();

    Ok(AudioBuffer::new(channels, spec.sample_rate)?)
}
