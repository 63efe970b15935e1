use std::time::Duration;

/// Idle timeout after which a UDP session without inbound traffic is evicted
pub const UDP_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunnel configuration
#[derive(Debug, Clone, Default)]
pub struct TunnelConfig {
    /// TCP relay configuration
    pub tcp: TcpConfig,
    /// UDP session configuration
    pub udp: UdpConfig,
}

/// TCP relay configuration
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Copy buffer size per direction
    pub buffer_size: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            buffer_size: 32 * 1024,
        }
    }
}

/// UDP session configuration
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Inactivity window before a session is evicted
    pub idle_timeout: Duration,
    /// Receive buffer size for proxy datagrams
    pub buffer_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            idle_timeout: UDP_IDLE_TIMEOUT,
            buffer_size: 4096,
        }
    }
}
