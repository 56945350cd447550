//! End-to-end session scenarios over loopback UDP with an in-memory output

use parking_lot::{Condvar, Mutex};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lan_audio_relay::audio::{OutputBackend, PcmSink};
use lan_audio_relay::error::{AudioError, Error, NetworkError};
use lan_audio_relay::status::StatusLog;
use lan_audio_relay::{SessionController, SessionState, StreamConfig};

const CHUNK: usize = 3528;

#[derive(Default)]
struct MemorySink {
    writes: Mutex<Vec<Vec<u8>>>,
    closed: Mutex<bool>,
    woken: Condvar,
    started: AtomicBool,
    stalled: bool,
    fail_writes: bool,
}

impl PcmSink for MemorySink {
    fn start(&self) -> Result<(), AudioError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }
    
    fn write(&self, data: &[u8]) -> Result<usize, AudioError> {
        let mut closed = self.closed.lock();
        if self.stalled {
            while !*closed {
                self.woken.wait(&mut closed);
            }
        }
        if *closed {
            return Err(AudioError::Closed);
        }
        if self.fail_writes {
            return Err(AudioError::StreamError("device disconnected".into()));
        }
        self.writes.lock().push(data.to_vec());
        Ok(data.len())
    }
    
    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }
    
    fn close(&self) {
        *self.closed.lock() = true;
        self.woken.notify_all();
    }
}

impl MemorySink {
    fn sizes(&self) -> Vec<usize> {
        self.writes.lock().iter().map(Vec::len).collect()
    }
    
    fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

#[derive(Default)]
struct MemoryBackend {
    sinks: Mutex<Vec<Arc<MemorySink>>>,
    opens: AtomicUsize,
    stalled: bool,
    fail_writes: bool,
    /// Reported minimum buffer; `CHUNK` when unset
    min_buffer: Option<usize>,
}

impl MemoryBackend {
    fn sink(&self) -> Arc<MemorySink> {
        self.sinks.lock().last().cloned().expect("no sink opened")
    }
}

impl OutputBackend for MemoryBackend {
    fn min_buffer_bytes(&self) -> Result<usize, AudioError> {
        Ok(self.min_buffer.unwrap_or(CHUNK))
    }
    
    fn open(&self, config: &StreamConfig) -> Result<Arc<dyn PcmSink>, AudioError> {
        assert_eq!(config.chunk_size(), CHUNK);
        self.opens.fetch_add(1, Ordering::SeqCst);
        let sink = Arc::new(MemorySink {
            stalled: self.stalled,
            fail_writes: self.fail_writes,
            ..Default::default()
        });
        self.sinks.lock().push(sink.clone());
        Ok(sink)
    }
}

fn new_session(backend: Arc<MemoryBackend>, port: u16) -> (SessionController, Arc<StatusLog>) {
    let status = Arc::new(StatusLog::default());
    (SessionController::new(backend, port, status.clone()), status)
}

fn target(session: &SessionController) -> SocketAddr {
    let port = session.local_addr().expect("session not listening").port();
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_datagrams_reach_sink_in_order() {
    let backend = Arc::new(MemoryBackend::default());
    let (mut session, _) = new_session(backend.clone(), 0);
    session.start().unwrap();
    assert_eq!(session.state(), SessionState::Running);
    
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let to = target(&session);
    sender.send_to(&[1u8; 500], to).unwrap();
    sender.send_to(&[2u8; 700], to).unwrap();
    sender.send_to(&[], to).unwrap();
    
    let sink = backend.sink();
    assert!(wait_until(|| sink.sizes().len() == 3));
    assert_eq!(sink.sizes(), vec![500, 700, 0]);
    
    let writes = sink.writes.lock().clone();
    assert!(writes[0].iter().all(|&b| b == 1));
    assert!(writes[1].iter().all(|&b| b == 2));
    
    let stats = session.stats();
    assert_eq!(stats.datagrams, 3);
    assert_eq!(stats.bytes, 1200);
    assert_eq!(stats.empty_datagrams, 1);
    
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_oversized_datagram_truncated_to_chunk() {
    let backend = Arc::new(MemoryBackend::default());
    let (mut session, _) = new_session(backend.clone(), 0);
    session.start().unwrap();
    
    let payload: Vec<u8> = (0..CHUNK + 1000).map(|i| i as u8).collect();
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(&payload, target(&session)).unwrap();
    
    let sink = backend.sink();
    assert!(wait_until(|| !sink.sizes().is_empty()));
    assert_eq!(sink.writes.lock()[0], payload[..CHUNK].to_vec());
    assert_eq!(session.state(), SessionState::Running);
}

#[test]
fn test_stop_while_receive_blocked() {
    let backend = Arc::new(MemoryBackend::default());
    let (mut session, status) = new_session(backend.clone(), 0);
    session.start().unwrap();
    let port = target(&session).port();
    
    thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    session.stop();
    
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.local_addr().is_none());
    assert!(backend.sink().is_closed());
    assert_eq!(status.last().as_deref(), Some("Streaming stopped"));
    
    // The socket is gone: the port can be bound again
    assert!(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok());
}

#[test]
fn test_stop_while_write_blocked() {
    let backend = Arc::new(MemoryBackend {
        stalled: true,
        ..Default::default()
    });
    let (mut session, _) = new_session(backend.clone(), 0);
    session.start().unwrap();
    
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(&[0u8; 64], target(&session)).unwrap();
    thread::sleep(Duration::from_millis(100));
    
    let started = Instant::now();
    session.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(backend.sink().sizes().is_empty());
}

#[test]
fn test_stop_is_idempotent() {
    let backend = Arc::new(MemoryBackend::default());
    let (mut session, status) = new_session(backend, 0);
    
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    
    session.start().unwrap();
    session.stop();
    let lines = status.len();
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(status.len(), lines);
}

#[test]
fn test_double_start_opens_once() {
    let backend = Arc::new(MemoryBackend::default());
    let (mut session, _) = new_session(backend.clone(), 0);
    
    session.start().unwrap();
    let addr = session.local_addr();
    session.start().unwrap();
    
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
    assert_eq!(session.local_addr(), addr);
}

#[test]
fn test_port_in_use_fails_start() {
    let blocker = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
    let port = blocker.local_addr().unwrap().port();
    
    let backend = Arc::new(MemoryBackend::default());
    let (mut session, status) = new_session(backend.clone(), port);
    
    let result = session.start();
    assert!(matches!(
        result,
        Err(Error::Network(NetworkError::BindFailed { .. }))
    ));
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(backend.sink().is_closed());
    assert!(status.last().unwrap().starts_with("Failed to start streaming"));
}

#[test]
fn test_buffer_below_one_frame_fails_start() {
    let backend = Arc::new(MemoryBackend {
        min_buffer: Some(3),
        ..Default::default()
    });
    let (mut session, status) = new_session(backend.clone(), 0);
    
    let result = session.start();
    assert!(matches!(
        result,
        Err(Error::Audio(AudioError::UnsupportedFormat(_)))
    ));
    assert_eq!(session.state(), SessionState::Stopped);
    assert!(session.local_addr().is_none());
    assert_eq!(backend.opens.load(Ordering::SeqCst), 0);
    assert!(status.last().unwrap().starts_with("Failed to start streaming"));
}

#[test]
fn test_sink_failure_stops_session() {
    let backend = Arc::new(MemoryBackend {
        fail_writes: true,
        ..Default::default()
    });
    let (mut session, status) = new_session(backend.clone(), 0);
    session.start().unwrap();
    
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(&[0u8; 16], target(&session)).unwrap();
    
    let state = session.state_handle();
    assert!(wait_until(|| state.get() == SessionState::Stopped));
    assert!(backend.sink().is_closed());
    assert!(status
        .lines()
        .iter()
        .any(|l| l.text.starts_with("Streaming stopped: Audio error")));
    
    // Only reaps the finished worker
    session.stop();
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_restart_after_reset() {
    let backend = Arc::new(MemoryBackend::default());
    let (mut session, _) = new_session(backend.clone(), 0);
    
    session.start().unwrap();
    session.stop();
    
    // Stopped is terminal until reset
    session.start().unwrap();
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
    
    session.reset();
    assert_eq!(session.state(), SessionState::Idle);
    session.start().unwrap();
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(backend.opens.load(Ordering::SeqCst), 2);
    
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender.send_to(&[9u8; 32], target(&session)).unwrap();
    let sink = backend.sink();
    assert!(wait_until(|| sink.sizes() == vec![32]));
}

#[test]
fn test_drop_releases_resources() {
    let backend = Arc::new(MemoryBackend::default());
    let (mut session, _) = new_session(backend.clone(), 0);
    session.start().unwrap();
    let port = target(&session).port();
    
    drop(session);
    assert!(backend.sink().is_closed());
    assert!(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok());
}
