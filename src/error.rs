use thiserror::Error;

/// Failures acquiring the capture device. Reported once at `start()`.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Microphone access was denied. Please grant permission and try again.")]
    PermissionDenied,
    #[error("No usable microphone: {0}")]
    DeviceUnavailable(String),
    #[error("Unsupported capture format: {0}")]
    UnsupportedFormat(String),
}

/// A single failed inference. The pitch loop recovers by skipping the tick.
#[derive(Debug, Error)]
pub enum EstimateError {
    #[error("audio source closed")]
    SourceClosed,
    #[error("pitch estimation failed: {0}")]
    Failed(String),
}

/// Failures opening the output device for an audible backing track.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("No usable audio output: {0}")]
    DeviceUnavailable(String),
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("encoder was not started")]
    NotStarted,
    #[error("wav encoding failed: {0}")]
    Wav(#[from] hound::Error),
}

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid note name {0:?}")]
    InvalidNoteName(String),
    #[error("invalid target note {label:?}: {reason}")]
    InvalidTargetNote { label: String, reason: String },
    #[error("exercise file: {0}")]
    Io(#[from] std::io::Error),
    #[error("exercise file is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the recording lifecycle. `Display` is the user-facing message.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("{0}")]
    Capture(#[from] CaptureError),
    #[error("Could not start pitch tracking: {0}")]
    EstimatorInit(EstimateError),
    #[error("Could not finalize the recording: {0}")]
    Encode(#[from] EncodeError),
    #[error("Could not start audio processing: {0}")]
    Spawn(#[from] std::io::Error),
}
