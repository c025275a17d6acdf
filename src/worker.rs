//! Background analysis worker and its message transport.
//!
//! A persistent worker thread owns the peak/tempo pipeline; callers talk
//! to it through correlation-tagged request/response envelopes over
//! bounded channels. Rendering always happens on the caller's side, so the
//! worker only ever sees filtered mono samples, and the sample vector
//! moves into the request without copying.
//!
//! A second thread routes responses back to per-request one-shot handlers
//! registered in a shared pending map. Requests that never get an answer
//! can be abandoned through [`PendingAnalysis::wait_timeout`], which also
//! removes the stale pending entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use crate::config::AnalyzerConfig;
use crate::error::{Error, Result};
use crate::render::render;
use crate::types::{AudioBuffer, TempoGuess};
use crate::{estimate_tempo, guess_beat};

/// Filtered mono samples handed to the worker.
#[derive(Debug)]
pub struct AnalysisInput {
    /// Low-pass-filtered samples, ownership moved from the caller
    pub channel_data: Vec<f32>,
    /// Sample rate of `channel_data` in Hz
    pub sample_rate: u32,
}

/// Request envelope. `id: None` marks a fire-and-forget notification: the
/// worker runs it for effect and sends nothing back.
#[derive(Debug)]
struct Request {
    id: Option<u64>,
    method: String,
    params: AnalysisInput,
}

/// Response envelope, correlated to its request by `id`. The payload's
/// `Result` carries the result-or-error exclusivity of the wire format.
#[derive(Debug)]
struct Response {
    id: u64,
    payload: Result<AnalysisOutput>,
}

/// Successful outcome of a worker method.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutput {
    /// Raw top-candidate BPM from `analyze`
    Tempo(f32),
    /// Rounded tempo plus first-beat phase from `guess`
    Guess(TempoGuess),
}

type PendingMap = Arc<Mutex<HashMap<u64, Sender<Result<AnalysisOutput>>>>>;

fn lock_pending(pending: &PendingMap) -> std::sync::MutexGuard<'_, HashMap<u64, Sender<Result<AnalysisOutput>>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle on the tempo analysis worker.
///
/// Cloning is cheap and every clone talks to the same worker thread; any
/// number of requests may be in flight at once, each correlated back to
/// its caller by a unique ID. Dropping the last handle shuts the worker
/// down once its queue drains.
#[derive(Clone)]
pub struct Analyzer {
    requests: Sender<Request>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
    config: AnalyzerConfig,
}

/// An in-flight request. Resolve it with [`wait`](Self::wait) or
/// [`wait_timeout`](Self::wait_timeout).
pub struct PendingAnalysis {
    id: u64,
    receiver: Receiver<Result<AnalysisOutput>>,
    pending: PendingMap,
    timeout: Option<Duration>,
}

impl Analyzer {
    /// Validates `config` and starts the worker and router threads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a bad configuration and
    /// [`Error::Transport`] if either thread cannot be spawned.
    pub fn spawn(config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;

        let (request_tx, request_rx) = bounded::<Request>(config.queue_size());
        let (response_tx, response_rx) = bounded::<Response>(config.queue_size());
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        std::thread::Builder::new()
            .name("beatfinder-worker".to_string())
            .spawn(move || run_worker(request_rx, response_tx, config))
            .map_err(|e| Error::Transport(format!("failed to start worker thread: {e}")))?;

        let router_pending = Arc::clone(&pending);
        std::thread::Builder::new()
            .name("beatfinder-router".to_string())
            .spawn(move || route_responses(response_rx, router_pending))
            .map_err(|e| Error::Transport(format!("failed to start router thread: {e}")))?;

        Ok(Self {
            requests: request_tx,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            config,
        })
    }

    /// Estimates the tempo of the whole buffer.
    ///
    /// Returns the top candidate's raw, un-rounded BPM.
    pub fn analyze(&self, buffer: &AudioBuffer) -> Result<f32> {
        self.analyze_window(buffer, 0.0, None)
    }

    /// Estimates the tempo of a window of the buffer. `duration` defaults
    /// to everything after `offset`.
    pub fn analyze_window(
        &self,
        buffer: &AudioBuffer,
        offset: f64,
        duration: Option<f64>,
    ) -> Result<f32> {
        match self.request("analyze", buffer, offset, duration)?.wait()? {
            AnalysisOutput::Tempo(bpm) => Ok(bpm),
            AnalysisOutput::Guess(_) => {
                Err(Error::Transport("mismatched response payload".to_string()))
            }
        }
    }

    /// Estimates a rounded tempo and the phase of the first beat for the
    /// whole buffer.
    pub fn guess(&self, buffer: &AudioBuffer) -> Result<TempoGuess> {
        self.guess_window(buffer, 0.0, None)
    }

    /// Like [`guess`](Self::guess), over an explicit window.
    pub fn guess_window(
        &self,
        buffer: &AudioBuffer,
        offset: f64,
        duration: Option<f64>,
    ) -> Result<TempoGuess> {
        match self.request("guess", buffer, offset, duration)?.wait()? {
            AnalysisOutput::Guess(guess) => Ok(guess),
            AnalysisOutput::Tempo(_) => {
                Err(Error::Transport("mismatched response payload".to_string()))
            }
        }
    }

    /// Renders the window on the calling thread, then submits `method` to
    /// the worker and returns a handle for the in-flight request.
    ///
    /// The render must complete before anything is sent, so a request is
    /// only ever queued with its samples already filtered.
    pub fn request(
        &self,
        method: &str,
        buffer: &AudioBuffer,
        offset: f64,
        duration: Option<f64>,
    ) -> Result<PendingAnalysis> {
        let rendered = self.render_window(buffer, offset, duration)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = bounded(1);
        {
            let mut map = lock_pending(&self.pending);
            // Monotonic 64-bit IDs never collide within a process lifetime.
            let clash = map.insert(id, tx);
            debug_assert!(clash.is_none(), "correlation id {id} reused while pending");
        }

        let request = Request {
            id: Some(id),
            method: method.to_string(),
            params: AnalysisInput {
                channel_data: rendered.samples,
                sample_rate: rendered.sample_rate,
            },
        };
        if self.requests.send(request).is_err() {
            lock_pending(&self.pending).remove(&id);
            return Err(Error::Transport("analysis worker is gone".to_string()));
        }

        Ok(PendingAnalysis {
            id,
            receiver: rx,
            pending: Arc::clone(&self.pending),
            timeout: self.config.request_timeout(),
        })
    }

    /// Sends `method` without a correlation ID. The worker executes it and
    /// discards the outcome; nothing comes back.
    pub fn notify(
        &self,
        method: &str,
        buffer: &AudioBuffer,
        offset: f64,
        duration: Option<f64>,
    ) -> Result<()> {
        let rendered = self.render_window(buffer, offset, duration)?;
        let request = Request {
            id: None,
            method: method.to_string(),
            params: AnalysisInput {
                channel_data: rendered.samples,
                sample_rate: rendered.sample_rate,
            },
        };
        self.requests
            .send(request)
            .map_err(|_| Error::Transport("analysis worker is gone".to_string()))
    }

    fn render_window(
        &self,
        buffer: &AudioBuffer,
        offset: f64,
        duration: Option<f64>,
    ) -> Result<crate::types::RenderedAudio> {
        let duration = duration.unwrap_or(buffer.duration() - offset);
        render(buffer, offset, duration, self.config.lowpass_hz())
    }
}

impl PendingAnalysis {
    /// Returns this request's correlation ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Blocks until the matching response arrives. Applies the configured
    /// request timeout when one is set.
    pub fn wait(self) -> Result<AnalysisOutput> {
        match self.timeout {
            Some(timeout) => self.wait_timeout(timeout),
            None => match self.receiver.recv() {
                Ok(payload) => payload,
                Err(_) => Err(Error::Transport("analysis worker is gone".to_string())),
            },
        }
    }

    /// Blocks until the matching response arrives or the deadline passes.
    /// On timeout the pending entry is removed, so a late response is
    /// dropped by the router instead of leaking.
    pub fn wait_timeout(self, timeout: Duration) -> Result<AnalysisOutput> {
        match self.receiver.recv_timeout(timeout) {
            Ok(payload) => payload,
            Err(RecvTimeoutError::Timeout) => {
                lock_pending(&self.pending).remove(&self.id);
                Err(Error::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Transport("analysis worker is gone".to_string()))
            }
        }
    }
}

/// Worker loop: dispatch each request, answer the correlated ones, and
/// stop once every caller handle is gone.
fn run_worker(requests: Receiver<Request>, responses: Sender<Response>, config: AnalyzerConfig) {
    tracing::info!("analysis worker started");
    for request in requests.iter() {
        let Request { id, method, params } = request;
        let payload = dispatch(&method, &params, &config);
        match id {
            Some(id) => {
                if let Err(error) = &payload {
                    tracing::debug!(id, %method, %error, "request failed");
                }
                if responses.send(Response { id, payload }).is_err() {
                    break;
                }
            }
            None => {
                if let Err(error) = &payload {
                    tracing::debug!(%method, %error, "notification failed");
                }
            }
        }
    }
    tracing::info!("analysis worker stopped");
}

/// Routes each response to its pending handler. Responses whose entry was
/// already abandoned are dropped; everyone else stays pending.
fn route_responses(responses: Receiver<Response>, pending: PendingMap) {
    for Response { id, payload } in responses.iter() {
        match lock_pending(&pending).remove(&id) {
            Some(handler) => {
                // A caller that stopped waiting is not an error.
                let _ = handler.send(payload);
            }
            None => tracing::warn!(id, "response with no pending request"),
        }
    }
}

/// Method dispatch. Pipeline failures are returned in the payload, never
/// panicked across the channel.
fn dispatch(method: &str, params: &AnalysisInput, config: &AnalyzerConfig) -> Result<AnalysisOutput> {
    match method {
        "analyze" => estimate_tempo(&params.channel_data, params.sample_rate, config)
            .map(AnalysisOutput::Tempo),
        "guess" => {
            guess_beat(&params.channel_data, params.sample_rate, config).map(AnalysisOutput::Guess)
        }
        other => Err(Error::UnsupportedMethod(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 44100;

    /// A pulse train at `bpm`: 50 ms wide unit pulses, which survive the
    /// 240 Hz low-pass render with their amplitude intact.
    fn pulse_buffer(bpm: f64, seconds: f64) -> AudioBuffer {
        let total = (seconds * RATE as f64) as usize;
        let spacing = (60.0 / bpm * RATE as f64).round() as usize;
        let width = RATE as usize / 20;
        let mut samples = vec![0.0f32; total];
        let mut start = 0;
        while start < total {
            let end = (start + width).min(total);
            for sample in &mut samples[start..end] {
                *sample = 1.0;
            }
            start += spacing;
        }
        AudioBuffer::from_mono(samples, RATE).unwrap()
    }

    fn analyzer() -> Analyzer {
        Analyzer::spawn(AnalyzerConfig::default()).unwrap()
    }

    #[test]
    fn analyze_finds_the_pulse_tempo() {
        let analyzer = analyzer();
        let bpm = analyzer.analyze(&pulse_buffer(120.0, 4.0)).unwrap();
        assert!((bpm - 120.0).abs() < 1.0, "got {bpm}");
    }

    #[test]
    fn guess_round_trips_a_two_second_square_train() {
        // 2 Hz square pulses over 2 s at 44.1 kHz: 120 BPM, phase near the
        // first pulse.
        let analyzer = analyzer();
        let guess = analyzer.guess(&pulse_buffer(120.0, 2.0)).unwrap();
        assert_eq!(guess.bpm, 120);
        assert!(guess.offset >= 0.0);
        assert!(guess.offset < 0.5);
        // The first onset sits at the end of the first 50 ms pulse, plus a
        // little filter lag.
        assert!(guess.offset < 0.25, "offset was {}", guess.offset);
    }

    #[test]
    fn silence_is_rejected_not_crashed() {
        let analyzer = analyzer();
        let buffer = AudioBuffer::from_mono(vec![0.0; 2 * RATE as usize], RATE).unwrap();
        assert!(matches!(
            analyzer.analyze(&buffer),
            Err(Error::NoBeatsDetected)
        ));
        assert!(matches!(
            analyzer.guess(&buffer),
            Err(Error::NoBeatsDetected)
        ));
    }

    #[test]
    fn unknown_methods_are_rejected() {
        let analyzer = analyzer();
        let pending = analyzer
            .request("transcribe", &pulse_buffer(120.0, 1.0), 0.0, None)
            .unwrap();
        assert!(matches!(
            pending.wait(),
            Err(Error::UnsupportedMethod(name)) if name == "transcribe"
        ));
    }

    #[test]
    fn concurrent_requests_resolve_to_their_own_results() {
        let analyzer = analyzer();
        let fast = analyzer
            .request("analyze", &pulse_buffer(150.0, 4.0), 0.0, None)
            .unwrap();
        let slow = analyzer
            .request("analyze", &pulse_buffer(100.0, 4.0), 0.0, None)
            .unwrap();
        assert_ne!(fast.id(), slow.id());

        // Resolve in reverse submission order; correlation must still hold.
        let slow_bpm = match slow.wait().unwrap() {
            AnalysisOutput::Tempo(bpm) => bpm,
            other => panic!("unexpected payload {other:?}"),
        };
        let fast_bpm = match fast.wait().unwrap() {
            AnalysisOutput::Tempo(bpm) => bpm,
            other => panic!("unexpected payload {other:?}"),
        };
        assert!((slow_bpm - 100.0).abs() < 1.0, "got {slow_bpm}");
        assert!((fast_bpm - 150.0).abs() < 1.0, "got {fast_bpm}");
    }

    #[test]
    fn many_threads_each_get_their_own_answer() {
        let analyzer = analyzer();
        let tempos = [100.0f64, 110.0, 120.0, 140.0, 160.0];
        let handles: Vec<_> = tempos
            .into_iter()
            .map(|bpm| {
                let analyzer = analyzer.clone();
                std::thread::spawn(move || {
                    let got = analyzer.analyze(&pulse_buffer(bpm, 4.0)).unwrap();
                    (bpm, got)
                })
            })
            .collect();
        for handle in handles {
            let (expected, got) = handle.join().unwrap();
            assert!(
                (got as f64 - expected).abs() < 1.0,
                "expected {expected}, got {got}"
            );
        }
    }

    #[test]
    fn timeout_removes_the_pending_entry() {
        // A handle that never gets an answer: build the pending side by
        // hand so the worker cannot race the deadline.
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = bounded(1);
        lock_pending(&pending).insert(7, tx);

        let handle = PendingAnalysis {
            id: 7,
            receiver: rx,
            pending: Arc::clone(&pending),
            timeout: None,
        };
        assert!(matches!(
            handle.wait_timeout(Duration::from_millis(10)),
            Err(Error::Timeout)
        ));
        assert!(lock_pending(&pending).is_empty());
    }

    #[test]
    fn windowed_analysis_uses_only_the_window() {
        // Silence for 2 s, then a 120 BPM train for 4 s. Analyzing only the
        // tail finds the tempo.
        let head = vec![0.0f32; 2 * RATE as usize];
        let tail = pulse_buffer(120.0, 4.0);
        let mut samples = head;
        samples.extend_from_slice(tail.channel(0));
        let buffer = AudioBuffer::from_mono(samples, RATE).unwrap();

        let analyzer = analyzer();
        let bpm = analyzer.analyze_window(&buffer, 2.0, None).unwrap();
        assert!((bpm - 120.0).abs() < 1.0, "got {bpm}");
    }

    #[test]
    fn notifications_do_not_produce_responses() {
        let analyzer = analyzer();
        analyzer
            .notify("analyze", &pulse_buffer(120.0, 1.0), 0.0, None)
            .unwrap();
        // Nothing to assert beyond "no panic and no stuck entry": the map
        // never held an entry for a notification.
        assert!(lock_pending(&analyzer.pending).is_empty());
    }
}
