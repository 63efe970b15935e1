use crate::error::LibError;
use crate::logging;
use crate::types::*;
use bytes::Bytes;
use gatetun_core::{PlatformError, ProxyClient, TunWriter, Tunnel, TunnelController, TunnelError};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connect a tunnel and fold the outcome into a [`ConnectTunnelResult`]
pub fn connect_tunnel(
    controller: &TunnelController,
    tun_writer: Option<Arc<dyn TunWriter>>,
    client: Option<Arc<ProxyClient>>,
    udp_enabled: bool,
) -> ConnectTunnelResult {
    match controller.connect(tun_writer, client, udp_enabled) {
        Ok(tunnel) => ConnectTunnelResult::connected(tunnel),
        Err(e) => {
            tracing::error!("Failed to connect tunnel: {}", e);
            ConnectTunnelResult::failed(e)
        }
    }
}

/// Parse and validate the provider configuration JSON
pub fn parse_server_config(json: &str) -> Result<ServerConfig, PlatformError> {
    let config: ServerConfig = serde_json::from_str(json).map_err(LibError::from)?;
    config.validate()?;
    tracing::info!(
        "Server config loaded: {} ({})",
        config.server_address(),
        config.method
    );
    Ok(config)
}

/// Counters from one packet pump run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpSummary {
    pub packets: u64,
    pub bytes: u64,
    pub failures: u64,
}

/// Feed packets read from the TUN interface into `tunnel` until the channel
/// closes or the tunnel disconnects. Single-packet write failures are skipped.
pub async fn run_packet_pump(tunnel: Arc<dyn Tunnel>, mut rx: mpsc::Receiver<Bytes>) -> PumpSummary {
    let mut summary = PumpSummary::default();

    while let Some(packet) = rx.recv().await {
        if !tunnel.is_connected() {
            break;
        }
        match tunnel.write(&packet) {
            Ok(n) => {
                summary.packets += 1;
                summary.bytes += n as u64;
            }
            Err(TunnelError::NetworkStackClosed) => break,
            Err(e) => {
                summary.failures += 1;
                tracing::debug!("Failed to write packet to tunnel: {}", e);
            }
        }
    }

    tracing::info!(
        "Packet pump stopped: packets={} bytes={} failures={}",
        summary.packets,
        summary.bytes,
        summary.failures
    );
    summary
}

/// Recent log lines for the host UI. Zero returns everything buffered.
pub fn get_logs(count: usize) -> Vec<String> {
    logging::get_recent_logs(count)
}

pub fn clear_logs() {
    logging::clear_logs()
}
