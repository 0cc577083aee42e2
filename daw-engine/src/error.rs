use thiserror::Error;

/// Errors surfaced by the engine's fallible operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio context has not been created yet")]
    NotWarm,

    #[error("no output device available")]
    NoOutputDevice,

    #[error("output stream error: {0}")]
    Output(String),

    #[error("failed to decode audio data: {0}")]
    Decode(String),

    #[error("invalid engine configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
