//! # LAN Audio Relay
//!
//! Plays a raw PCM stream arriving over UDP on the local audio output.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── REMOTE HOST ────────────────────────────┐
//! │   System audio ──► PCM-16 LE, stereo, 44.1 kHz ──► UDP :12345        │
//! └──────────────────────────────────┬──────────────────────────────────┘
//!                                    │ raw datagrams, no header
//!                                    ▼
//! ┌──────────────────────────── THIS DEVICE ────────────────────────────┐
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐  │
//! │  │  PacketReceiver  │──►│    StreamPump    │──►│     PcmSink      │  │
//! │  │ (network::recv)  │   │ (`stream-pump`)  │   │ (audio::sink)    │  │
//! │  └──────────────────┘   └──────────────────┘   └────────┬─────────┘  │
//! │                                                         │ PcmRing    │
//! │                                                         ▼            │
//! │                                               ┌──────────────────┐   │
//! │                                               │ cpal output      │   │
//! │                                               │ (`audio-output`) │   │
//! │                                               └──────────────────┘   │
//! │                                                                      │
//! │  SessionController: Idle ─► Starting ─► Running ─► Stopping ─► Stopped│
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod network;
pub mod pump;
pub mod session;
pub mod status;

pub use config::{RelayConfig, StreamConfig};
pub use error::{Error, Result};
pub use session::{SessionController, SessionState};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;
    
    /// Stream sample rate
    pub const SAMPLE_RATE: u32 = 44100;
    
    /// Channel count (interleaved stereo)
    pub const CHANNELS: u16 = 2;
    
    /// Bytes per sample (16-bit linear PCM, little-endian)
    pub const BYTES_PER_SAMPLE: usize = 2;
    
    /// Bytes per frame, the minimal playable unit
    pub const FRAME_BYTES: usize = BYTES_PER_SAMPLE * CHANNELS as usize;
    
    /// Default UDP listen port
    pub const DEFAULT_LISTEN_PORT: u16 = 12345;
    
    /// Lower bound of the output buffer, in milliseconds
    pub const MIN_BUFFER_MS: u32 = 20;
    
    /// Receive poll interval; bounds how long `close()` takes to unblock a reader
    pub const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(50);
    
    /// Number of status lines kept for display
    pub const STATUS_LOG_CAPACITY: usize = 200;
}
