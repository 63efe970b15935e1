//! In-memory doubles for the engine, TUN sink and proxy transports

use crate::client::{PacketConn, PacketListener, StreamConn, StreamDialer, TargetAddr};
use crate::engine::{
    EngineFactory, FlowId, NetStackEngine, OutputFn, TcpConnHandler, TunWriter, UdpConnHandler,
    UdpFlow,
};
use crate::error::{Result, TunnelError};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Poll `cond` until it holds, yielding to spawned relays in between
pub async fn wait_for(cond: impl Fn() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

pub struct MockStreamDialer {
    fail: bool,
    dialed: Mutex<Vec<TargetAddr>>,
    peers: Mutex<Vec<DuplexStream>>,
}

impl MockStreamDialer {
    pub fn new() -> Self {
        Self {
            fail: false,
            dialed: Mutex::new(Vec::new()),
            peers: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn dialed(&self) -> Vec<TargetAddr> {
        self.dialed.lock().clone()
    }

    /// The proxy-side end of the oldest unclaimed dialed connection
    pub fn take_peer(&self) -> Option<DuplexStream> {
        let mut peers = self.peers.lock();
        if peers.is_empty() {
            None
        } else {
            Some(peers.remove(0))
        }
    }
}

#[async_trait::async_trait]
impl StreamDialer for MockStreamDialer {
    async fn dial_stream(&self, addr: &TargetAddr) -> io::Result<StreamConn> {
        if self.fail {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        self.dialed.lock().push(addr.clone());
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        self.peers.lock().push(theirs);
        Ok(Box::new(ours))
    }
}

type Datagram = (Vec<u8>, TargetAddr);

pub struct MockPacketConn {
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Datagram>>,
    closed: CancellationToken,
}

impl MockPacketConn {
    pub fn new() -> (Arc<Self>, mpsc::Sender<Datagram>) {
        let (tx, rx) = mpsc::channel(64);
        let conn = Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            inbound: tokio::sync::Mutex::new(rx),
            closed: CancellationToken::new(),
        });
        (conn, tx)
    }

    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.sent.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait::async_trait]
impl PacketConn for MockPacketConn {
    async fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        if self.is_closed() {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        self.sent.lock().push((data.to_vec(), addr));
        Ok(data.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, TargetAddr)> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => Err(io::Error::from(io::ErrorKind::NotConnected)),
            datagram = inbound.recv() => match datagram {
                Some((data, from)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok((n, from))
                }
                None => Err(io::Error::from(io::ErrorKind::ConnectionAborted)),
            },
        }
    }

    fn close(&self) -> io::Result<()> {
        self.closed.cancel();
        Ok(())
    }
}

pub struct MockPacketListener {
    fail: bool,
    yield_first: bool,
    conns: Mutex<Vec<(Arc<MockPacketConn>, Option<mpsc::Sender<Datagram>>)>>,
}

impl MockPacketListener {
    pub fn new() -> Self {
        Self {
            fail: false,
            yield_first: false,
            conns: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Yields once before allocating, so concurrent connects interleave
    pub fn yielding() -> Self {
        Self {
            yield_first: true,
            ..Self::new()
        }
    }

    pub fn allocated(&self) -> usize {
        self.conns.lock().len()
    }

    pub fn conn(&self, index: usize) -> Arc<MockPacketConn> {
        self.conns.lock()[index].0.clone()
    }

    /// Sender feeding datagrams "from the proxy" into socket `index`
    pub fn inbound(&self, index: usize) -> mpsc::Sender<Datagram> {
        self.conns.lock()[index]
            .1
            .clone()
            .expect("inbound sender already taken")
    }

    /// Take the only sender for socket `index`; dropping it fails pending reads
    pub fn take_inbound(&self, index: usize) -> Option<mpsc::Sender<Datagram>> {
        self.conns.lock()[index].1.take()
    }
}

#[async_trait::async_trait]
impl PacketListener for MockPacketListener {
    async fn listen_packet(&self) -> io::Result<Arc<dyn PacketConn>> {
        if self.fail {
            return Err(io::Error::from(io::ErrorKind::AddrNotAvailable));
        }
        if self.yield_first {
            tokio::task::yield_now().await;
        }
        let (conn, tx) = MockPacketConn::new();
        self.conns.lock().push((conn.clone(), Some(tx)));
        Ok(conn)
    }
}

pub struct MockUdpFlow {
    id: FlowId,
    fail_writes: bool,
    received: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    close_count: AtomicUsize,
}

impl MockUdpFlow {
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: FlowId(id),
            fail_writes: false,
            received: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
        })
    }

    pub fn failing_writes(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: FlowId(id),
            fail_writes: true,
            received: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
        })
    }

    pub fn received(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.received.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.close_count.load(Ordering::SeqCst) > 0
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl UdpFlow for MockUdpFlow {
    fn id(&self) -> FlowId {
        self.id
    }

    async fn write_from(&self, data: &[u8], src: SocketAddr) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.received.lock().push((data.to_vec(), src));
        Ok(data.len())
    }

    fn close(&self) -> io::Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockTunWriter {
    fail_close: bool,
    packets: Mutex<Vec<Vec<u8>>>,
    close_count: AtomicUsize,
}

impl MockTunWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_close() -> Self {
        Self {
            fail_close: true,
            ..Self::default()
        }
    }

    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.packets.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

impl TunWriter for MockTunWriter {
    fn write(&self, packet: &[u8]) -> io::Result<usize> {
        self.packets.lock().push(packet.to_vec());
        Ok(packet.len())
    }

    fn close(&self) -> io::Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(io::Error::new(io::ErrorKind::Other, "close failed"));
        }
        Ok(())
    }
}

pub struct MockEngine {
    output: OutputFn,
    written: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
    close_count: AtomicUsize,
    tcp_handler: Mutex<Option<Arc<dyn TcpConnHandler>>>,
    udp_handler: Mutex<Option<Arc<dyn UdpConnHandler>>>,
}

impl MockEngine {
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Emit a packet toward the OS through the bound output function
    pub fn emit(&self, packet: &[u8]) -> io::Result<usize> {
        (self.output)(packet)
    }

    pub fn tcp_handler(&self) -> Option<Arc<dyn TcpConnHandler>> {
        self.tcp_handler.lock().clone()
    }

    pub fn udp_handler(&self) -> Option<Arc<dyn UdpConnHandler>> {
        self.udp_handler.lock().clone()
    }
}

impl NetStackEngine for MockEngine {
    fn write(&self, packet: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        self.written.lock().push(packet.to_vec());
        Ok(packet.len())
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn register_tcp_handler(&self, handler: Arc<dyn TcpConnHandler>) {
        *self.tcp_handler.lock() = Some(handler);
    }

    fn register_udp_handler(&self, handler: Arc<dyn UdpConnHandler>) {
        *self.udp_handler.lock() = Some(handler);
    }
}

#[derive(Default)]
pub struct MockEngineFactory {
    fail: bool,
    engines: Mutex<Vec<Arc<MockEngine>>>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn created(&self) -> usize {
        self.engines.lock().len()
    }

    pub fn last(&self) -> Option<Arc<MockEngine>> {
        self.engines.lock().last().cloned()
    }
}

impl EngineFactory for MockEngineFactory {
    fn create(&self, output: OutputFn) -> Result<Arc<dyn NetStackEngine>> {
        if self.fail {
            return Err(TunnelError::Engine("engine unavailable".to_string()));
        }
        let engine = Arc::new(MockEngine {
            output,
            written: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            close_count: AtomicUsize::new(0),
            tcp_handler: Mutex::new(None),
            udp_handler: Mutex::new(None),
        });
        self.engines.lock().push(engine.clone());
        Ok(engine)
    }
}
