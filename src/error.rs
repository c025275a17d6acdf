//! Error types for the tempo analyzer.

/// Errors that can occur during rendering, analysis, or transport.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable onsets were found at any threshold, or the signal never
    /// rose above the minimum-energy floor. Not transient; retrying the
    /// same buffer yields the same answer.
    #[error("no detectable beats in the analyzed audio")]
    NoBeatsDetected,
    /// The worker received a method name it does not dispatch.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    /// The worker thread could not be started or is no longer reachable.
    #[error("transport failure: {0}")]
    Transport(String),
    /// A pending request was abandoned after its deadline passed.
    #[error("analysis request timed out")]
    Timeout,
    /// The requested render window does not fit the source buffer.
    #[error("invalid render window: offset {offset}s, duration {duration}s")]
    InvalidRenderWindow { offset: f64, duration: f64 },
    #[error("invalid audio buffer: {0}")]
    InvalidBuffer(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for tempo analyzer operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
