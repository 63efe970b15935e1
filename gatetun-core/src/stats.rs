use std::sync::atomic::{AtomicU64, Ordering};

/// Tunnel traffic and session counters
#[derive(Debug, Default)]
pub struct TunnelStats {
    /// TCP flows relayed
    pub tcp_connections: AtomicU64,
    /// UDP sessions opened
    pub udp_sessions: AtomicU64,
    /// UDP sessions currently in the table
    pub active_udp_sessions: AtomicU64,
    /// Bytes sent toward the proxy
    pub bytes_uploaded: AtomicU64,
    /// Bytes written back into virtual flows
    pub bytes_downloaded: AtomicU64,
    /// Failed stream dials and datagram socket allocations
    pub dial_failures: AtomicU64,
}

impl TunnelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tcp_connections(&self) -> u64 {
        self.tcp_connections.load(Ordering::Relaxed)
    }

    pub fn udp_sessions(&self) -> u64 {
        self.udp_sessions.load(Ordering::Relaxed)
    }

    pub fn active_udp_sessions(&self) -> u64 {
        self.active_udp_sessions.load(Ordering::Relaxed)
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded.load(Ordering::Relaxed)
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded.load(Ordering::Relaxed)
    }

    pub fn dial_failures(&self) -> u64 {
        self.dial_failures.load(Ordering::Relaxed)
    }

    pub(crate) fn add_upload(&self, n: usize) {
        self.bytes_uploaded.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_download(&self, n: usize) {
        self.bytes_downloaded.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dial_failure(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn udp_session_opened(&self) {
        self.udp_sessions.fetch_add(1, Ordering::Relaxed);
        self.active_udp_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn udp_session_closed(&self) {
        self.active_udp_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}
