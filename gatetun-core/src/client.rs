//! Proxy client
//!
//! Wraps the stream dialer and packet listener supplied by the platform.
//! The relay handlers reach the proxy service exclusively through it.

use crate::error::{Result, TunnelError};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

/// Destination of a dial or source of a proxied datagram
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetAddr {
    Domain(String, u16),
    Ip(SocketAddr),
}

impl std::fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}

impl TargetAddr {
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Domain(_, port) => *port,
            TargetAddr::Ip(addr) => addr.port(),
        }
    }

    pub fn host(&self) -> String {
        match self {
            TargetAddr::Domain(domain, _) => domain.clone(),
            TargetAddr::Ip(addr) => addr.ip().to_string(),
        }
    }

    /// Resolve into a UDP socket address, using DNS for non-literal hosts
    pub async fn resolve(&self) -> Result<SocketAddr> {
        match self {
            TargetAddr::Ip(addr) => Ok(*addr),
            TargetAddr::Domain(domain, port) => {
                if let Ok(ip) = domain.parse::<IpAddr>() {
                    return Ok(SocketAddr::new(ip, *port));
                }
                tokio::net::lookup_host((domain.as_str(), *port))
                    .await
                    .map_err(|e| TunnelError::Unresolvable(format!("{}: {}", self, e)))?
                    .next()
                    .ok_or_else(|| TunnelError::Unresolvable(self.to_string()))
            }
        }
    }
}

/// A reliable bidirectional byte connection
pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadWrite for T {}

pub type StreamConn = Box<dyn AsyncReadWrite>;

/// Opens reliable stream connections through the proxy
#[async_trait::async_trait]
pub trait StreamDialer: Send + Sync {
    async fn dial_stream(&self, addr: &TargetAddr) -> std::io::Result<StreamConn>;
}

/// A bound datagram socket able to exchange packets with any remote address
#[async_trait::async_trait]
pub trait PacketConn: Send + Sync {
    async fn send_to(&self, data: &[u8], addr: SocketAddr) -> std::io::Result<usize>;

    async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, TargetAddr)>;

    fn close(&self) -> std::io::Result<()>;
}

/// Allocates proxy datagram sockets
#[async_trait::async_trait]
pub trait PacketListener: Send + Sync {
    async fn listen_packet(&self) -> std::io::Result<Arc<dyn PacketConn>>;
}

/// Container for the transport capabilities of one tunnel
pub struct ProxyClient {
    stream_dialer: Option<Arc<dyn StreamDialer>>,
    packet_listener: Option<Arc<dyn PacketListener>>,
    session_active: AtomicBool,
}

impl ProxyClient {
    pub fn new(
        stream_dialer: Option<Arc<dyn StreamDialer>>,
        packet_listener: Option<Arc<dyn PacketListener>>,
    ) -> Self {
        Self {
            stream_dialer,
            packet_listener,
            session_active: AtomicBool::new(false),
        }
    }

    /// Mark the session active. Reserved for handshake work; currently never fails.
    pub fn start_session(&self) -> Result<()> {
        self.session_active.store(true, Ordering::Release);
        info!("Proxy client session started");
        Ok(())
    }

    pub fn end_session(&self) -> Result<()> {
        self.session_active.store(false, Ordering::Release);
        info!("Proxy client session ended");
        Ok(())
    }

    pub fn is_session_active(&self) -> bool {
        self.session_active.load(Ordering::Acquire)
    }

    pub async fn dial_stream(&self, addr: &TargetAddr) -> Result<StreamConn> {
        let dialer = self
            .stream_dialer
            .as_ref()
            .ok_or(TunnelError::DialerNotConfigured("stream"))?;
        debug!("Dialing proxy stream to {}", addr);
        Ok(dialer.dial_stream(addr).await?)
    }

    pub async fn listen_packet(&self) -> Result<Arc<dyn PacketConn>> {
        let listener = self
            .packet_listener
            .as_ref()
            .ok_or(TunnelError::DialerNotConfigured("packet"))?;
        Ok(listener.listen_packet().await?)
    }
}
