//! UDP datagram receiver
//!
//! The socket is read with a short timeout so that `close()` from another
//! thread is observed within one poll interval; timeouts never reach the
//! caller.

use parking_lot::RwLock;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::constants::RECEIVE_POLL_INTERVAL;
use crate::error::NetworkError;

/// Blocking source of datagram payloads
pub trait PacketSource: Send + Sync {
    /// Block until a datagram arrives and copy its payload into `buffer`.
    ///
    /// Payloads longer than `buffer` are truncated. Returns `Closed` once
    /// the source has been closed.
    fn receive(&self, buffer: &mut [u8]) -> Result<usize, NetworkError>;
    
    /// Close the source, unblocking a pending `receive`
    fn close(&self);
}

/// UDP receiver bound on all interfaces
pub struct PacketReceiver {
    /// Held for reading by `receive`; `close` takes it for writing to drop the socket
    socket: RwLock<Option<UdpSocket>>,
    closed: AtomicBool,
    local_addr: SocketAddr,
}

impl PacketReceiver {
    /// Bind `0.0.0.0:port`. Port 0 picks an ephemeral port.
    pub fn open(port: u16) -> Result<Self, NetworkError> {
        let socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )
        .map_err(|e| NetworkError::SocketOptions(e.to_string()))?;
        
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        socket
            .bind(&addr.into())
            .map_err(|e| NetworkError::BindFailed {
                port,
                reason: match e.kind() {
                    ErrorKind::AddrInUse => "address already in use".to_string(),
                    ErrorKind::PermissionDenied => "permission denied".to_string(),
                    _ => e.to_string(),
                },
            })?;
        
        socket
            .set_read_timeout(Some(RECEIVE_POLL_INTERVAL))
            .map_err(|e| NetworkError::SocketOptions(e.to_string()))?;
        
        let socket = UdpSocket::from(socket);
        let local_addr = socket
            .local_addr()
            .map_err(|e| NetworkError::SocketOptions(e.to_string()))?;
        
        tracing::debug!("UDP receiver bound to {}", local_addr);
        
        Ok(Self {
            socket: RwLock::new(Some(socket)),
            closed: AtomicBool::new(false),
            local_addr,
        })
    }
    
    /// Address the socket was bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
    
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl PacketSource for PacketReceiver {
    fn receive(&self, buffer: &mut [u8]) -> Result<usize, NetworkError> {
        loop {
            if self.is_closed() {
                return Err(NetworkError::Closed);
            }
            
            let guard = self.socket.read();
            let Some(socket) = guard.as_ref() else {
                return Err(NetworkError::Closed);
            };
            
            match socket.recv(buffer) {
                Ok(n) => return Ok(n),
                Err(e) => match e.kind() {
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
                        continue
                    }
                    _ if is_truncation(&e) => return Ok(buffer.len()),
                    _ if self.is_closed() => return Err(NetworkError::Closed),
                    _ => return Err(NetworkError::ReceiveFailed(e.to_string())),
                },
            }
        }
    }
    
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Waits at most one poll interval for a pending recv to let go
        if self.socket.write().take().is_some() {
            tracing::debug!("UDP receiver on {} closed", self.local_addr);
        }
    }
}

impl Drop for PacketReceiver {
    fn drop(&mut self) {
        self.close();
    }
}

/// Windows reports an oversized datagram as WSAEMSGSIZE after filling the buffer
#[cfg(windows)]
fn is_truncation(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(10040)
}

#[cfg(not(windows))]
fn is_truncation(_: &std::io::Error) -> bool {
    false
}
