//! Seam to the virtual network-stack engine
//!
//! The engine parses raw IP packets from the TUN interface and surfaces
//! TCP and UDP flows. It is provided by the platform; this module only
//! defines the capabilities the tunnel needs from it and the callbacks
//! it offers back.

use crate::client::StreamConn;
use crate::error::Result;
use std::net::SocketAddr;
use std::sync::Arc;

/// Opaque identity of one virtual flow, assigned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowId(pub u64);

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A virtual TCP flow. Reads yield bytes the OS sent; writes go back to the OS.
pub type VirtualStream = StreamConn;

/// A virtual UDP flow owned by the engine
#[async_trait::async_trait]
pub trait UdpFlow: Send + Sync {
    fn id(&self) -> FlowId;

    /// Deliver a datagram to the OS side, tagged with its remote source
    async fn write_from(&self, data: &[u8], src: SocketAddr) -> std::io::Result<usize>;

    fn close(&self) -> std::io::Result<()>;
}

/// Callback invoked for every new virtual TCP flow
#[async_trait::async_trait]
pub trait TcpConnHandler: Send + Sync {
    async fn handle(&self, conn: VirtualStream, target: SocketAddr) -> Result<()>;
}

/// Callbacks invoked for virtual UDP flows
#[async_trait::async_trait]
pub trait UdpConnHandler: Send + Sync {
    /// A new UDP flow toward `target` was opened
    async fn connect(&self, conn: Arc<dyn UdpFlow>, target: SocketAddr) -> Result<()>;

    /// The OS sent `data` to `dest` on an existing flow
    async fn receive_to(&self, conn: &dyn UdpFlow, data: &[u8], dest: SocketAddr) -> Result<()>;
}

/// Sink for packets the engine emits toward the OS
pub type OutputFn = Arc<dyn Fn(&[u8]) -> std::io::Result<usize> + Send + Sync>;

/// The OS-facing TUN write path
pub trait TunWriter: Send + Sync {
    fn write(&self, packet: &[u8]) -> std::io::Result<usize>;

    fn close(&self) -> std::io::Result<()>;
}

/// A running virtual network-stack engine instance
pub trait NetStackEngine: Send + Sync {
    /// Inject one inbound packet from the OS
    fn write(&self, packet: &[u8]) -> std::io::Result<usize>;

    fn close(&self) -> std::io::Result<()>;

    fn register_tcp_handler(&self, handler: Arc<dyn TcpConnHandler>);

    fn register_udp_handler(&self, handler: Arc<dyn UdpConnHandler>);
}

/// Builds engine instances bound to a per-tunnel output function
pub trait EngineFactory: Send + Sync {
    fn create(&self, output: OutputFn) -> Result<Arc<dyn NetStackEngine>>;
}
