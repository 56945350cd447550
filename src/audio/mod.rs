//! Audio output subsystem

pub mod buffer;
pub mod device;
pub mod sink;

pub use buffer::PcmRing;
pub use device::{find_output_device, list_output_devices, AudioDevice, OutputDeviceInfo};
pub use sink::{CpalBackend, CpalSink, OutputBackend, PcmSink};
