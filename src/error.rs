use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// A device, audio context or remote channel could not be acquired.
    #[error("acquisition error: {0}")]
    Acquisition(String),

    /// Malformed or truncated audio or wire payload. Always recoverable.
    #[error("codec error: {0}")]
    Codec(String),

    /// The remote channel failed or closed underneath a running session.
    #[error("transport error: {0}")]
    Transport(String),

    /// A resource release failed during teardown. Logged, never propagated.
    #[error("release error: {0}")]
    Release(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("resample error: {0}")]
    Resample(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("speech error: {0}")]
    Speech(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ParleyError>;
