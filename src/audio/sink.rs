//! Audio output sink
//!
//! `PcmSink` is the blocking write side used by the pump. `CpalSink`
//! implements it on top of a cpal output stream: the stream is built and
//! owned by a dedicated `audio-output` thread, fed from a `PcmRing` sized
//! to one transfer chunk.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::buffer::{PcmRing, SharedPcmRing};
use crate::audio::device::{device_buffer_size, find_output_device};
use crate::config::StreamConfig;
use crate::constants::{CHANNELS, SAMPLE_RATE};
use crate::error::AudioError;

/// Blocking PCM output
pub trait PcmSink: Send + Sync {
    /// Begin playback
    fn start(&self) -> Result<(), AudioError>;
    
    /// Hand PCM bytes to the device, blocking until all are buffered
    fn write(&self, data: &[u8]) -> Result<usize, AudioError>;
    
    /// Pause playback. Safe to call at any time, any number of times.
    fn stop(&self);
    
    /// Release the device and wake a blocked `write` with `Closed`.
    /// Safe to call at any time, any number of times.
    fn close(&self);
}

/// Opens sinks for a session
pub trait OutputBackend: Send + Sync {
    /// Minimum buffer the output needs for the stream format, in bytes
    fn min_buffer_bytes(&self) -> Result<usize, AudioError>;
    
    /// Open a sink buffering `config.chunk_size()` bytes
    fn open(&self, config: &StreamConfig) -> Result<Arc<dyn PcmSink>, AudioError>;
}

/// Output backend on the system audio host
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    device_name: Option<String>,
}

impl CpalBackend {
    /// Use the named output device, or the default one when `None`
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl OutputBackend for CpalBackend {
    fn min_buffer_bytes(&self) -> Result<usize, AudioError> {
        let device = find_output_device(self.device_name.as_deref())?;
        device.check_stream_format()?;
        device.min_buffer_bytes()
    }
    
    fn open(&self, config: &StreamConfig) -> Result<Arc<dyn PcmSink>, AudioError> {
        let sink = CpalSink::open(self.device_name.as_deref(), config)?;
        Ok(Arc::new(sink))
    }
}

enum Command {
    Play(Sender<Result<(), AudioError>>),
    Pause,
    Shutdown,
}

/// cpal-backed sink
pub struct CpalSink {
    ring: SharedPcmRing,
    commands: Sender<Command>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    device_name: String,
}

impl CpalSink {
    /// Build an output stream on the named (or default) device.
    ///
    /// Fails with `DeviceUnavailable` when no output device is reachable.
    pub fn open(device_name: Option<&str>, config: &StreamConfig) -> Result<Self, AudioError> {
        let ring = Arc::new(PcmRing::new(config.chunk_size()));
        let (ready_tx, ready_rx) = bounded::<Result<String, AudioError>>(1);
        let (command_tx, command_rx) = unbounded::<Command>();
        
        let device_name = device_name.map(str::to_string);
        let frames = config.frames_per_chunk() as u32;
        let thread_ring = ring.clone();
        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                run_output_thread(device_name.as_deref(), frames, thread_ring, ready_tx, command_rx)
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        
        let device_name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AudioError::StreamError("audio output thread exited".to_string()));
            }
        };
        
        tracing::info!(
            "Opened output {} ({} byte buffer, {} us)",
            device_name,
            config.chunk_size(),
            config.chunk_duration_us()
        );
        
        Ok(Self {
            ring,
            commands: command_tx,
            thread_handle: Mutex::new(Some(handle)),
            device_name,
        })
    }
    
}

impl PcmSink for CpalSink {
    fn start(&self) -> Result<(), AudioError> {
        if self.ring.is_closed() {
            return Err(AudioError::Closed);
        }
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send(Command::Play(reply_tx))
            .map_err(|_| AudioError::Closed)?;
        reply_rx.recv().map_err(|_| AudioError::Closed)?
    }
    
    fn write(&self, data: &[u8]) -> Result<usize, AudioError> {
        self.ring.write(data)
    }
    
    fn stop(&self) {
        let _ = self.commands.send(Command::Pause);
    }
    
    fn close(&self) {
        self.ring.close();
        let _ = self.commands.send(Command::Shutdown);
        
        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.join();
            tracing::debug!(
                "Closed output {} ({} underruns)",
                self.device_name,
                self.ring.underrun_count()
            );
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Owns the cpal stream for its whole life; cpal streams are not `Send`.
fn run_output_thread(
    device_name: Option<&str>,
    frames: u32,
    ring: SharedPcmRing,
    ready_tx: Sender<Result<String, AudioError>>,
    commands: Receiver<Command>,
) {
    let (stream, name) = match build_output(device_name, frames, ring) {
        Ok(built) => built,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(name));
    
    while let Ok(command) = commands.recv() {
        match command {
            Command::Play(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| AudioError::StreamError(e.to_string()));
                let _ = reply.send(result);
            }
            Command::Pause => {
                if let Err(e) = stream.pause() {
                    tracing::warn!("Failed to pause output: {}", e);
                }
            }
            Command::Shutdown => break,
        }
    }
    
    // Stream is dropped here, releasing the device
}

fn build_output(
    device_name: Option<&str>,
    frames: u32,
    ring: SharedPcmRing,
) -> Result<(cpal::Stream, String), AudioError> {
    let device = find_output_device(device_name)?;
    let supported = device.default_output_config()?;
    
    let config = cpal::StreamConfig {
        channels: CHANNELS,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: device_buffer_size(supported.buffer_size(), frames),
    };
    tracing::debug!("Output buffer {:?}", config.buffer_size);
    
    let inner = device.inner();
    let stream = match supported.sample_format() {
        SampleFormat::I16 => build_stream::<i16>(inner, &config, ring),
        SampleFormat::U16 => build_stream::<u16>(inner, &config, ring),
        SampleFormat::I32 => build_stream::<i32>(inner, &config, ring),
        SampleFormat::F32 => build_stream::<f32>(inner, &config, ring),
        SampleFormat::F64 => build_stream::<f64>(inner, &config, ring),
        other => Err(AudioError::UnsupportedFormat(format!(
            "device sample format {:?}",
            other
        ))),
    }?;
    
    Ok((stream, device.name))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: SharedPcmRing,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<i16>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| ring.fill(data),
            move |err| {
                tracing::error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))
}
