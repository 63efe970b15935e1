//! GateTun tunnel session manager
//!
//! Bridges a TUN-style packet interface to a proxy service. Raw IP packets
//! from the OS are handed to a virtual network-stack engine; every TCP and
//! UDP flow it surfaces is relayed through a proxy client.
//!
//! This crate provides:
//! - The proxy client wrapping platform-supplied stream and datagram dialers
//! - A TCP relay that copies each virtual stream to a proxied stream
//! - A UDP session table with a 30 second idle timeout per session
//! - The tunnel controller owning the connect/disconnect lifecycle
//! - Platform error classification for setup failures
//!
//! The engine itself is external; it plugs in through [`EngineFactory`].
//!
//! # Example
//!
//! ```rust,ignore
//! use gatetun_core::{ProxyClient, Tunnel, TunnelController};
//! use std::sync::Arc;
//!
//! let client = Arc::new(ProxyClient::new(Some(stream_dialer), Some(packet_listener)));
//! let controller = TunnelController::new(engine_factory);
//!
//! let tunnel = controller.connect(Some(tun_writer), Some(client), true)?;
//! tunnel.write(&packet)?;
//! tunnel.disconnect();
//! ```

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod platform_error;
pub mod stats;
pub mod tcp;
pub mod tunnel;
pub mod udp;

#[cfg(test)]
mod test_util;

// Re-exports
pub use client::{
    AsyncReadWrite, PacketConn, PacketListener, ProxyClient, StreamConn, StreamDialer, TargetAddr,
};
pub use config::{TcpConfig, TunnelConfig, UdpConfig, UDP_IDLE_TIMEOUT};
pub use engine::{
    EngineFactory, FlowId, NetStackEngine, OutputFn, TcpConnHandler, TunWriter, UdpConnHandler,
    UdpFlow, VirtualStream,
};
pub use error::{Result, TunnelError};
pub use platform_error::{ErrorCode, PlatformError};
pub use stats::TunnelStats;
pub use tcp::{relay_bidirectional, RelayEnd, TcpRelayHandler};
pub use tunnel::{ProxyTunnel, Tunnel, TunnelController};
pub use udp::{IdleDeadline, UdpSessionTable};
