//! Local address lookup for display

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Preferred non-loopback IPv4 address of this host.
///
/// Asks the OS which source address it would route a datagram from; no
/// packet is sent.
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// Display form of the local address
pub fn display_local_ipv4() -> String {
    local_ipv4()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "Unavailable".to_string())
}
