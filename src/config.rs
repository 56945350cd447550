//! Stream format and relay configuration

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{AudioError, Error};

/// Immutable description of one streaming session.
///
/// The PCM format is fixed; only the listen port and the transfer chunk
/// size vary, the latter being derived from the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    listen_port: u16,
    chunk_size: usize,
}

impl StreamConfig {
    /// Build a config from the device's minimum buffer requirement in bytes.
    ///
    /// The chunk size is rounded down to whole frames and must hold at
    /// least one frame.
    pub fn new(listen_port: u16, min_buffer_bytes: usize) -> Result<Self, AudioError> {
        let chunk_size = min_buffer_bytes - min_buffer_bytes % FRAME_BYTES;
        if chunk_size < FRAME_BYTES {
            return Err(AudioError::UnsupportedFormat(format!(
                "buffer of {} bytes cannot hold one {}-byte frame",
                min_buffer_bytes, FRAME_BYTES
            )));
        }
        
        Ok(Self {
            listen_port,
            chunk_size,
        })
    }
    
    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }
    
    /// Byte length of one transfer unit
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
    
    /// Frames held by one chunk
    pub fn frames_per_chunk(&self) -> usize {
        self.chunk_size / FRAME_BYTES
    }
    
    /// Playback duration of one chunk in microseconds
    pub fn chunk_duration_us(&self) -> u64 {
        (self.frames_per_chunk() as u64 * 1_000_000) / SAMPLE_RATE as u64
    }
}

/// Bytes needed to hold `ms` milliseconds of audio in the stream format
pub fn bytes_for_ms(ms: u32) -> usize {
    (SAMPLE_RATE as usize * ms as usize / 1000) * FRAME_BYTES
}

/// Settings chosen by the shell around the relay core
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// UDP port to listen on (0 picks an ephemeral port)
    pub listen_port: u16,
    /// Output device name; the system default when unset
    pub output_device: Option<String>,
    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            output_device: None,
            log_filter: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
    
    /// Load from `path`, or from the per-user config file when `path` is None.
    ///
    /// A missing per-user file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        
        let text = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }
}

/// `<config dir>/relay.toml` for this application
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "lan-audio-relay")
        .map(|dirs| dirs.config_dir().join("relay.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_chunk_rounded_to_frames() {
        let config = StreamConfig::new(DEFAULT_LISTEN_PORT, 3530).unwrap();
        assert_eq!(config.chunk_size(), 3528);
        assert_eq!(config.frames_per_chunk(), 882);
        assert_eq!(config.chunk_duration_us(), 20_000);
    }
    
    #[test]
    fn test_chunk_smaller_than_frame_rejected() {
        assert!(matches!(
            StreamConfig::new(DEFAULT_LISTEN_PORT, 3),
            Err(AudioError::UnsupportedFormat(_))
        ));
        assert!(StreamConfig::new(DEFAULT_LISTEN_PORT, 0).is_err());
        assert!(StreamConfig::new(DEFAULT_LISTEN_PORT, FRAME_BYTES).is_ok());
    }
    
    #[test]
    fn test_bytes_for_ms() {
        assert_eq!(bytes_for_ms(MIN_BUFFER_MS), 3528);
        assert_eq!(bytes_for_ms(1000), 176_400);
    }
    
    #[test]
    fn test_relay_config_defaults_and_overrides() {
        let config = RelayConfig::from_toml("").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.listen_port, 12345);
        
        let config = RelayConfig::from_toml(
            "listen_port = 5000\noutput_device = \"Speakers\"\n",
        )
        .unwrap();
        assert_eq!(config.listen_port, 5000);
        assert_eq!(config.output_device.as_deref(), Some("Speakers"));
        assert_eq!(config.log_filter, "info");
    }
    
    #[test]
    fn test_relay_config_malformed() {
        assert!(matches!(
            RelayConfig::from_toml("listen_port = \"twelve\""),
            Err(Error::Config(_))
        ));
    }
    
    #[test]
    fn test_missing_explicit_file_is_error() {
        let path = std::env::temp_dir().join("lan-audio-relay-does-not-exist.toml");
        assert!(RelayConfig::load(Some(&path)).is_err());
    }
}
