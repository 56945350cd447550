//! Blocking PCM byte ring between the pump and the device callback
//!
//! The writer side blocks while the ring is full, which is what paces the
//! pump to the speed of the audio device. The device callback never blocks
//! on data: when the ring runs dry it plays silence and counts an underrun.

use cpal::{FromSample, Sample};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::BYTES_PER_SAMPLE;
use crate::error::AudioError;

/// Longest the device callback waits on a writer holding the ring
const CALLBACK_LOCK_TIMEOUT: Duration = Duration::from_micros(500);

struct RingState {
    bytes: VecDeque<u8>,
    closed: bool,
}

/// Bounded byte ring of little-endian PCM-16 samples
pub struct PcmRing {
    state: Mutex<RingState>,
    /// Signalled whenever space frees up or the ring closes
    space: Condvar,
    capacity: usize,
    underrun_count: AtomicUsize,
}

impl PcmRing {
    /// Create a ring holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RingState {
                bytes: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            space: Condvar::new(),
            capacity,
            underrun_count: AtomicUsize::new(0),
        }
    }
    
    /// Append `data`, blocking until every byte fits.
    ///
    /// Returns the number of bytes buffered, or `Closed` if the ring is
    /// closed before the whole slice went in.
    pub fn write(&self, data: &[u8]) -> Result<usize, AudioError> {
        let mut state = self.state.lock();
        let mut written = 0;
        
        loop {
            if state.closed {
                return Err(AudioError::Closed);
            }
            if written == data.len() {
                return Ok(written);
            }
            
            let free = self.capacity - state.bytes.len();
            if free == 0 {
                self.space.wait(&mut state);
                continue;
            }
            
            let n = free.min(data.len() - written);
            state.bytes.extend(&data[written..written + n]);
            written += n;
        }
    }
    
    /// Fill a device buffer with decoded samples, padding with silence.
    ///
    /// Waits at most `CALLBACK_LOCK_TIMEOUT` for the writer; past that the
    /// whole buffer is silence and counts as an underrun.
    pub fn fill<T>(&self, out: &mut [T])
    where
        T: Sample + FromSample<i16>,
    {
        let Some(mut state) = self.state.try_lock_for(CALLBACK_LOCK_TIMEOUT) else {
            out.fill(T::EQUILIBRIUM);
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
            return;
        };
        
        let samples = out.len().min(state.bytes.len() / BYTES_PER_SAMPLE);
        let mut bytes = state.bytes.drain(..samples * BYTES_PER_SAMPLE);
        for slot in &mut out[..samples] {
            let lo = bytes.next().unwrap_or(0);
            let hi = bytes.next().unwrap_or(0);
            *slot = T::from_sample(i16::from_le_bytes([lo, hi]));
        }
        drop(bytes);
        drop(state);
        
        out[samples..].fill(T::EQUILIBRIUM);
        if samples > 0 {
            self.space.notify_all();
        }
        if samples < out.len() {
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
        }
    }
    
    /// Close the ring, waking any blocked writer
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.space.notify_all();
    }
    
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
    
    /// Bytes currently buffered
    pub fn len(&self) -> usize {
        self.state.lock().bytes.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    
    /// Device callbacks that ran out of data
    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a ring
pub type SharedPcmRing = Arc<PcmRing>;
