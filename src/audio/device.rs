//! Audio output device lookup and capability queries

use cpal::traits::{DeviceTrait, HostTrait};
use crate::config::bytes_for_ms;
use crate::constants::{FRAME_BYTES, MIN_BUFFER_MS, SAMPLE_RATE};
use crate::error::AudioError;

/// Description of an output device for listing
#[derive(Debug, Clone)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// Wrapper around a cpal output device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            inner: device,
            name,
        }
    }
    
    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }
    
    /// Get default output config
    pub fn default_output_config(&self) -> Result<cpal::SupportedStreamConfig, AudioError> {
        self.inner
            .default_output_config()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))
    }
    
    /// Minimum buffer the device needs for the stream format, in bytes.
    ///
    /// The reported minimum is floored at `MIN_BUFFER_MS` of audio; devices
    /// that do not report a range get exactly that floor.
    pub fn min_buffer_bytes(&self) -> Result<usize, AudioError> {
        let config = self.default_output_config()?;
        let reported = match config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, .. } => *min as usize * FRAME_BYTES,
            cpal::SupportedBufferSize::Unknown => 0,
        };
        Ok(reported.max(bytes_for_ms(MIN_BUFFER_MS)))
    }
    
    /// Fails with `UnsupportedFormat` unless some output config plays
    /// the stream's rate in stereo
    pub fn check_stream_format(&self) -> Result<(), AudioError> {
        let configs = self
            .inner
            .supported_output_configs()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
        
        if supports_stream_format(configs) {
            Ok(())
        } else {
            Err(AudioError::UnsupportedFormat(format!(
                "{} cannot play {} Hz stereo",
                self.name, SAMPLE_RATE
            )))
        }
    }
}

/// Whether any of `configs` covers the stream's sample rate with two or more channels
pub fn supports_stream_format(
    configs: impl IntoIterator<Item = cpal::SupportedStreamConfigRange>,
) -> bool {
    let rate = cpal::SampleRate(SAMPLE_RATE);
    configs.into_iter().any(|c| {
        c.channels() >= 2 && rate >= c.min_sample_rate() && rate <= c.max_sample_rate()
    })
}

/// Device buffer for a chunk of `frames`: fixed when the device accepts
/// that size, the host default otherwise
pub fn device_buffer_size(supported: &cpal::SupportedBufferSize, frames: u32) -> cpal::BufferSize {
    match supported {
        cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames) => {
            cpal::BufferSize::Fixed(frames)
        }
        _ => cpal::BufferSize::Default,
    }
}

/// List all available output devices
pub fn list_output_devices() -> Vec<OutputDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok());
    
    let mut devices = Vec::new();
    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let Ok(name) = device.name() {
                let is_default = default_name.as_ref() == Some(&name);
                let (sample_rates, channels) = get_device_capabilities(&device);
                
                devices.push(OutputDeviceInfo {
                    name,
                    is_default,
                    sample_rates,
                    channels,
                });
            }
        }
    }
    
    devices
}

/// Get device capabilities
fn get_device_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();
    
    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            // Common sample rates
            for rate_val in [44100u32, 48000, 88200, 96000, 176400, 192000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !sample_rates.contains(&rate_val)
                {
                    sample_rates.push(rate_val);
                }
            }
            
            let ch = config.channels();
            if !channels.contains(&ch) {
                channels.push(ch);
            }
        }
    }
    
    sample_rates.sort();
    channels.sort();
    
    (sample_rates, channels)
}

/// Get an output device by name, or the default one when `name` is None
pub fn find_output_device(name: Option<&str>) -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();
    
    let Some(name) = name else {
        return host
            .default_output_device()
            .map(AudioDevice::from_cpal)
            .ok_or_else(|| AudioError::DeviceUnavailable("No default output device".to_string()));
    };
    
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
    
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(AudioDevice::from_cpal(device));
        }
    }
    
    Err(AudioError::DeviceUnavailable(name.to_string()))
}
