//! Session lifecycle
//!
//! ```text
//! Idle ──start──► Starting ──ok──► Running ──stop / fatal──► Stopping ──► Stopped
//!                    │                                                     ▲
//!                    └──────────────────open failed────────────────────────┘
//! ```
//!
//! Requests that do not fit the current state are ignored, so a shell may
//! send duplicate start or stop requests. `Stopped` is terminal until
//! `reset`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::sink::{OutputBackend, PcmSink};
use crate::config::StreamConfig;
use crate::error::Error;
use crate::network::receiver::{PacketReceiver, PacketSource};
use crate::pump::{PumpCounters, PumpExit, PumpStats, StreamPump};
use crate::status::StatusSink;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Starting,
            2 => SessionState::Running,
            3 => SessionState::Stopping,
            _ => SessionState::Stopped,
        }
    }
}

/// Shared view of the session state
#[derive(Debug, Clone)]
pub struct SessionStateHandle(Arc<AtomicU8>);

impl SessionStateHandle {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(SessionState::Idle as u8)))
    }
    
    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }
    
    fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::Release);
    }
    
    /// Move `from → to`; false if the state was not `from`
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Resources owned by a started session
struct ActiveSession {
    receiver: Arc<PacketReceiver>,
    sink: Arc<dyn PcmSink>,
    worker: JoinHandle<()>,
}

/// Start/stop control surface for one relay session
pub struct SessionController {
    backend: Arc<dyn OutputBackend>,
    listen_port: u16,
    status: Arc<dyn StatusSink>,
    state: SessionStateHandle,
    running: Arc<AtomicBool>,
    counters: Option<Arc<PumpCounters>>,
    active: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(
        backend: Arc<dyn OutputBackend>,
        listen_port: u16,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            backend,
            listen_port,
            status,
            state: SessionStateHandle::new(),
            running: Arc::new(AtomicBool::new(false)),
            counters: None,
            active: None,
        }
    }
    
    pub fn state(&self) -> SessionState {
        self.state.get()
    }
    
    /// State view that other threads can poll
    pub fn state_handle(&self) -> SessionStateHandle {
        self.state.clone()
    }
    
    /// Bound receive address while a session holds the socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active
            .as_ref()
            .filter(|a| !a.receiver.is_closed())
            .map(|a| a.receiver.local_addr())
    }
    
    /// Pump statistics of the current or last session
    pub fn stats(&self) -> PumpStats {
        self.counters
            .as_ref()
            .map(|c| c.snapshot())
            .unwrap_or_default()
    }
    
    /// Open the output and the socket, then launch the pump worker.
    ///
    /// Ignored unless the session is `Idle`. On failure the session ends
    /// in `Stopped` and the error is returned.
    pub fn start(&mut self) -> Result<(), Error> {
        if !self.state.transition(SessionState::Idle, SessionState::Starting) {
            tracing::debug!("Start ignored in state {:?}", self.state.get());
            return Ok(());
        }
        
        let (config, sink, receiver) = match self.open_resources() {
            Ok(opened) => opened,
            Err(e) => {
                self.state.set(SessionState::Stopped);
                report_error(&*self.status, format!("Failed to start streaming: {}", e));
                return Err(e);
            }
        };
        
        let pump = StreamPump::new(config.chunk_size());
        self.counters = Some(pump.counters());
        self.running.store(true, Ordering::Release);
        self.state.set(SessionState::Running);
        
        let worker = {
            let receiver = receiver.clone();
            let sink = sink.clone();
            let running = self.running.clone();
            let state = self.state.clone();
            let status = self.status.clone();
            thread::Builder::new()
                .name("stream-pump".to_string())
                .spawn(move || {
                    let exit = pump.run(&*receiver, &*sink, || running.load(Ordering::Acquire));
                    match exit {
                        PumpExit::Failed(e) => {
                            if state.transition(SessionState::Running, SessionState::Stopping) {
                                report_error(&*status, format!("Streaming stopped: {}", e));
                                running.store(false, Ordering::Release);
                                release(&*receiver, &*sink);
                                state.set(SessionState::Stopped);
                            }
                        }
                        PumpExit::Closed | PumpExit::Cancelled => {
                            tracing::debug!("Pump finished: {:?}", exit);
                        }
                    }
                })
        };
        
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                release(&*receiver, &*sink);
                self.state.set(SessionState::Stopped);
                let e = Error::Io(e);
                report_error(&*self.status, format!("Failed to start streaming: {}", e));
                return Err(e);
            }
        };
        
        report(
            &*self.status,
            format!(
                "Receiving audio on port {} ({} byte chunks)",
                receiver.local_addr().port(),
                config.chunk_size()
            ),
        );
        
        self.active = Some(ActiveSession {
            receiver,
            sink,
            worker,
        });
        Ok(())
    }
    
    fn open_resources(
        &self,
    ) -> Result<(StreamConfig, Arc<dyn PcmSink>, Arc<PacketReceiver>), Error> {
        let min_buffer = self.backend.min_buffer_bytes()?;
        let config = StreamConfig::new(self.listen_port, min_buffer)?;
        let sink = self.backend.open(&config)?;
        
        let receiver = match PacketReceiver::open(config.listen_port()) {
            Ok(receiver) => Arc::new(receiver),
            Err(e) => {
                sink.close();
                return Err(e.into());
            }
        };
        
        if let Err(e) = sink.start() {
            release(&*receiver, &*sink);
            return Err(e.into());
        }
        
        Ok((config, sink, receiver))
    }
    
    /// Stop the pump and release the socket and the output.
    ///
    /// Returns once the worker has exited. Ignored when nothing is running.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            tracing::debug!("Stop ignored in state {:?}", self.state.get());
            return;
        };
        
        let was_running = self.state.transition(SessionState::Running, SessionState::Stopping);
        self.running.store(false, Ordering::Release);
        release(&*active.receiver, &*active.sink);
        
        if active.worker.join().is_err() {
            tracing::error!("Stream pump worker panicked");
        }
        self.state.set(SessionState::Stopped);
        
        if was_running {
            report(&*self.status, "Streaming stopped".to_string());
        }
    }
    
    /// Return a `Stopped` session to `Idle` so it can be started again
    pub fn reset(&mut self) {
        if self.state.get() != SessionState::Stopped {
            tracing::debug!("Reset ignored in state {:?}", self.state.get());
            return;
        }
        self.stop();
        self.counters = None;
        self.state.set(SessionState::Idle);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Close both resources, unblocking a pending `receive` or `write`
fn release(receiver: &dyn PacketSource, sink: &dyn PcmSink) {
    receiver.close();
    sink.stop();
    sink.close();
}

fn report(status: &dyn StatusSink, line: String) {
    tracing::info!("{}", line);
    status.push(line);
}

fn report_error(status: &dyn StatusSink, line: String) {
    tracing::error!("{}", line);
    status.push(line);
}
