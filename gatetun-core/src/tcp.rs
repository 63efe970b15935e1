//! Stream relay for virtual TCP flows
//!
//! Every new virtual TCP flow is dialed through the proxy client and then
//! copied in both directions by a background task. The task owns both
//! ends; it stops as soon as either direction finishes and closes the two
//! connections itself, so nothing outlives it.

use crate::client::{ProxyClient, TargetAddr};
use crate::config::TcpConfig;
use crate::engine::{TcpConnHandler, VirtualStream};
use crate::error::{is_connection_closed, Result};
use crate::stats::TunnelStats;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Dials the proxy for each virtual TCP flow and relays its bytes
pub struct TcpRelayHandler {
    client: Arc<ProxyClient>,
    config: TcpConfig,
    stats: Arc<TunnelStats>,
}

impl TcpRelayHandler {
    pub fn new(client: Arc<ProxyClient>, config: TcpConfig, stats: Arc<TunnelStats>) -> Self {
        Self {
            client,
            config,
            stats,
        }
    }
}

#[async_trait::async_trait]
impl TcpConnHandler for TcpRelayHandler {
    async fn handle(&self, conn: VirtualStream, target: SocketAddr) -> Result<()> {
        let proxy_conn = match self.client.dial_stream(&TargetAddr::Ip(target)).await {
            Ok(c) => c,
            Err(e) => {
                self.stats.record_dial_failure();
                debug!("TCP dial to {} failed: {}", target, e);
                return Err(e);
            }
        };

        self.stats.tcp_connections.fetch_add(1, Ordering::Relaxed);
        debug!("TCP relay started: {}", target);

        let buffer_size = self.config.buffer_size;
        let stats = self.stats.clone();
        tokio::spawn(async move {
            match relay_bidirectional(conn, proxy_conn, buffer_size, &stats).await {
                Ok(finished) => debug!("TCP relay to {} finished ({:?})", target, finished),
                Err(e) if is_connection_closed(&e) => debug!("TCP relay to {} closed: {}", target, e),
                Err(e) => debug!("TCP relay to {} failed: {}", target, e),
            }
        });

        Ok(())
    }
}

/// Which copy direction ended the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// Virtual flow to proxy
    Upload,
    /// Proxy to virtual flow
    Download,
}

/// Copy between `local` and `remote` until either direction reaches EOF or fails.
///
/// Both directions run inside the calling task. When the first one ends the
/// other is dropped, then both streams are shut down exactly once.
pub async fn relay_bidirectional<A, B>(
    local: A,
    remote: B,
    buffer_size: usize,
    stats: &TunnelStats,
) -> std::io::Result<RelayEnd>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut local_r, mut local_w) = tokio::io::split(local);
    let (mut remote_r, mut remote_w) = tokio::io::split(remote);

    let (end, result) = {
        let upload = copy_one_way(&mut local_r, &mut remote_w, buffer_size, |n| {
            stats.add_upload(n)
        });
        let download = copy_one_way(&mut remote_r, &mut local_w, buffer_size, |n| {
            stats.add_download(n)
        });
        tokio::pin!(upload, download);

        tokio::select! {
            r = &mut upload => (RelayEnd::Upload, r),
            r = &mut download => (RelayEnd::Download, r),
        }
    };

    let mut local = local_r.unsplit(local_w);
    let mut remote = remote_r.unsplit(remote_w);
    if let Err(e) = remote.shutdown().await {
        trace!("Proxy stream shutdown: {}", e);
    }
    if let Err(e) = local.shutdown().await {
        trace!("Virtual stream shutdown: {}", e);
    }

    result.map(|bytes| {
        trace!("Relay {:?} completed: {} bytes", end, bytes);
        end
    })
}

async fn copy_one_way<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    on_bytes: impl Fn(usize),
) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        on_bytes(n);
        total += n as u64;
    }
}
