//! Error types for the audio relay

use thiserror::Error;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),
    
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    
    #[error("Configuration error: {0}")]
    Config(String),
    
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error only reports an intentionally closed resource
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Error::Audio(AudioError::Closed) | Error::Network(NetworkError::Closed)
        )
    }
}

/// Audio output errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio output device available: {0}")]
    DeviceUnavailable(String),
    
    #[error("Failed to open stream: {0}")]
    StreamError(String),
    
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    
    #[error("Audio output closed")]
    Closed,
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed on port {port}: {reason}")]
    BindFailed { port: u16, reason: String },
    
    #[error("Socket options failed: {0}")]
    SocketOptions(String),
    
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    
    #[error("Socket closed")]
    Closed,
}

/// Result type alias for the relay
pub type Result<T> = std::result::Result<T, Error>;
