use thiserror::Error;

/// All errors produced by colloquy-core.
#[derive(Debug, Error)]
pub enum ColloquyError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("conversation model error: {0}")]
    Chat(String),

    #[error("conversation endpoint unreachable: {0}")]
    EndpointUnreachable(String),

    #[error("assistant is already running")]
    AlreadyRunning,

    #[error("assistant is not running")]
    NotRunning,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ColloquyError>;
