//! Tunnel controller
//!
//! Wires an OS-facing TUN sink, a proxy client and a virtual network-stack
//! engine into one tunnel. A tunnel goes from connected to disconnected
//! once; reconnecting means building a new one.

use crate::client::ProxyClient;
use crate::config::TunnelConfig;
use crate::engine::{EngineFactory, NetStackEngine, OutputFn, TunWriter};
use crate::error::{Result, TunnelError};
use crate::platform_error::PlatformError;
use crate::stats::TunnelStats;
use crate::tcp::TcpRelayHandler;
use crate::udp::UdpSessionTable;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Platform-facing tunnel surface
pub trait Tunnel: Send + Sync {
    /// True until `disconnect` is called
    fn is_connected(&self) -> bool;

    /// Close the engine, the TUN sink and the proxy session. Idempotent.
    fn disconnect(&self);

    /// Inject one packet read from the TUN interface
    fn write(&self, data: &[u8]) -> Result<usize>;

    /// Re-check UDP reachability after a network change
    fn update_udp_support(&self) -> bool;
}

pub struct ProxyTunnel {
    connected: AtomicBool,
    engine: Option<Arc<dyn NetStackEngine>>,
    tun_writer: Arc<dyn TunWriter>,
    client: Arc<ProxyClient>,
    stats: Arc<TunnelStats>,
    udp_enabled: bool,
}

impl ProxyTunnel {
    pub fn stats(&self) -> Arc<TunnelStats> {
        self.stats.clone()
    }

    /// Whether the platform reported UDP as usable at connect time
    pub fn is_udp_enabled(&self) -> bool {
        self.udp_enabled
    }

    pub fn client(&self) -> &Arc<ProxyClient> {
        &self.client
    }
}

impl Tunnel for ProxyTunnel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(engine) = &self.engine {
            if let Err(e) = engine.close() {
                warn!("Failed to close network stack: {}", e);
            }
        }
        if let Err(e) = self.tun_writer.close() {
            warn!("Failed to close TUN writer: {}", e);
        }
        if let Err(e) = self.client.end_session() {
            warn!("Failed to end client session: {}", e);
        }

        info!(
            "Tunnel disconnected: tcp={} udp={} up={}B down={}B",
            self.stats.tcp_connections(),
            self.stats.udp_sessions(),
            self.stats.bytes_uploaded(),
            self.stats.bytes_downloaded()
        );
    }

    fn write(&self, data: &[u8]) -> Result<usize> {
        if !self.is_connected() {
            return Err(TunnelError::NetworkStackClosed);
        }
        let engine = self.engine.as_ref().ok_or(TunnelError::StackNotInitialized)?;
        Ok(engine.write(data)?)
    }

    fn update_udp_support(&self) -> bool {
        true
    }
}

/// Builds connected tunnels on top of an engine factory
pub struct TunnelController {
    factory: Arc<dyn EngineFactory>,
    config: TunnelConfig,
}

impl TunnelController {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self::with_config(factory, TunnelConfig::default())
    }

    pub fn with_config(factory: Arc<dyn EngineFactory>, config: TunnelConfig) -> Self {
        Self { factory, config }
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Start the proxy session, bring up an engine bound to `tun_writer` and
    /// register the TCP and UDP relays on it.
    pub fn connect(
        &self,
        tun_writer: Option<Arc<dyn TunWriter>>,
        client: Option<Arc<ProxyClient>>,
        udp_enabled: bool,
    ) -> std::result::Result<Arc<ProxyTunnel>, PlatformError> {
        let tun_writer =
            tun_writer.ok_or_else(|| PlatformError::internal_error("must provide a TunWriter"))?;
        let client =
            client.ok_or_else(|| PlatformError::internal_error("must provide a client instance"))?;

        client.start_session().map_err(|e| {
            PlatformError::setup_traffic_handler_failed("failed to start client session", e)
        })?;

        let sink = tun_writer.clone();
        let output: OutputFn = Arc::new(move |packet: &[u8]| sink.write(packet));

        let engine = match self.factory.create(output) {
            Ok(engine) => engine,
            Err(e) => {
                if let Err(end_err) = client.end_session() {
                    warn!("Failed to end client session: {}", end_err);
                }
                return Err(PlatformError::setup_traffic_handler_failed(
                    "failed to create network stack",
                    e,
                ));
            }
        };

        let stats = Arc::new(TunnelStats::new());
        engine.register_tcp_handler(Arc::new(TcpRelayHandler::new(
            client.clone(),
            self.config.tcp.clone(),
            stats.clone(),
        )));
        engine.register_udp_handler(Arc::new(UdpSessionTable::new(
            client.clone(),
            self.config.udp.clone(),
            stats.clone(),
        )));
        debug!("Registered TCP and UDP flow handlers");

        info!("Tunnel connected (udp_enabled={})", udp_enabled);
        Ok(Arc::new(ProxyTunnel {
            connected: AtomicBool::new(true),
            engine: Some(engine),
            tun_writer,
            client,
            stats,
            udp_enabled,
        }))
    }
}
