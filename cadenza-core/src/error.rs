use thiserror::Error;

/// All errors produced by cadenza-core.
///
/// Underrun and overrun are deliberately absent: both are expected flow
/// control conditions, counted in [`crate::engine::PlaybackDiagnostics`].
#[derive(Debug, Error)]
pub enum CadenzaError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("synth backend error: {0}")]
    Synth(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CadenzaError>;
