//! The receive → play loop
//!
//! One reusable chunk-sized buffer; each datagram payload is written to the
//! sink verbatim and in arrival order. No format checks happen here: a
//! sender that does not match the stream format is played as-is.

use bytes::BytesMut;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::sink::PcmSink;
use crate::error::{AudioError, Error, NetworkError};
use crate::network::receiver::PacketSource;

/// Why the pump stopped
#[derive(Debug)]
pub enum PumpExit {
    /// The continuation check returned false
    Cancelled,
    /// The receiver or sink was closed underneath the loop
    Closed,
    /// A transport or device error ended the session
    Failed(Error),
}

/// Live counters shared with the controller
#[derive(Debug, Default)]
pub struct PumpCounters {
    datagrams: AtomicU64,
    bytes: AtomicU64,
    empty_datagrams: AtomicU64,
}

impl PumpCounters {
    fn record(&self, len: usize) {
        self.datagrams.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
        if len == 0 {
            self.empty_datagrams.fetch_add(1, Ordering::Relaxed);
        }
    }
    
    pub fn snapshot(&self) -> PumpStats {
        PumpStats {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            empty_datagrams: self.empty_datagrams.load(Ordering::Relaxed),
        }
    }
}

/// Pump statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Datagrams forwarded to the sink
    pub datagrams: u64,
    /// Payload bytes forwarded to the sink
    pub bytes: u64,
    /// Zero-length datagrams forwarded
    pub empty_datagrams: u64,
}

/// Moves datagrams from a `PacketSource` into a `PcmSink`
pub struct StreamPump {
    chunk_size: usize,
    counters: Arc<PumpCounters>,
}

impl StreamPump {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            counters: Arc::new(PumpCounters::default()),
        }
    }
    
    pub fn counters(&self) -> Arc<PumpCounters> {
        self.counters.clone()
    }
    
    /// Run until `should_continue` turns false or a resource fails.
    ///
    /// `should_continue` is checked once per datagram; a pending `receive`
    /// or `write` is only interrupted by closing the resource.
    pub fn run<R, S, F>(&self, receiver: &R, sink: &S, should_continue: F) -> PumpExit
    where
        R: PacketSource + ?Sized,
        S: PcmSink + ?Sized,
        F: Fn() -> bool,
    {
        let mut buffer = BytesMut::zeroed(self.chunk_size);
        
        while should_continue() {
            let len = match receiver.receive(&mut buffer) {
                Ok(len) => len,
                Err(NetworkError::Closed) => {
                    tracing::debug!("Receiver closed, pump exiting");
                    return PumpExit::Closed;
                }
                Err(e) => {
                    tracing::error!("Error receiving audio: {}", e);
                    return PumpExit::Failed(e.into());
                }
            };
            
            match sink.write(&buffer[..len]) {
                Ok(_) => {}
                Err(AudioError::Closed) => {
                    tracing::debug!("Sink closed, pump exiting");
                    return PumpExit::Closed;
                }
                Err(e) => {
                    tracing::error!("Error writing audio: {}", e);
                    return PumpExit::Failed(e.into());
                }
            }
            
            self.counters.record(len);
            tracing::trace!("Forwarded {} bytes", len);
        }
        
        PumpExit::Cancelled
    }
}
