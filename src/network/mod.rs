//! Network subsystem for UDP audio transport

pub mod address;
pub mod receiver;

pub use address::{display_local_ipv4, local_ipv4};
pub use receiver::{PacketReceiver, PacketSource};
