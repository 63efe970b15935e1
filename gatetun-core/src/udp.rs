//! UDP session table
//!
//! Maps each virtual UDP flow to one proxy datagram socket. A background
//! task per session copies proxy datagrams back into the flow until the
//! idle deadline passes or I/O fails, then evicts the entry and closes both
//! ends. The table lock is only held for lookup, insert and delete.

use crate::client::{PacketConn, ProxyClient, TargetAddr};
use crate::config::UdpConfig;
use crate::engine::{FlowId, UdpConnHandler, UdpFlow};
use crate::error::{Result, TunnelError};
use crate::stats::TunnelStats;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Read/write deadline shared by a session's relay task and its senders
#[derive(Debug)]
pub struct IdleDeadline {
    at: Mutex<Instant>,
    timeout: Duration,
}

impl IdleDeadline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            at: Mutex::new(Instant::now() + timeout),
            timeout,
        }
    }

    /// Push the deadline to now + timeout
    pub fn refresh(&self) {
        *self.at.lock() = Instant::now() + self.timeout;
    }

    pub fn get(&self) -> Instant {
        *self.at.lock()
    }

    pub fn is_expired(&self) -> bool {
        self.get() <= Instant::now()
    }
}

#[derive(Clone)]
struct SessionEntry {
    generation: u64,
    conn: Arc<dyn PacketConn>,
    deadline: Arc<IdleDeadline>,
}

type SessionMap = Arc<Mutex<HashMap<FlowId, SessionEntry>>>;

/// Tracks live UDP sessions and relays their datagrams through the proxy
pub struct UdpSessionTable {
    client: Arc<ProxyClient>,
    config: UdpConfig,
    stats: Arc<TunnelStats>,
    conns: SessionMap,
    next_generation: AtomicU64,
}

impl UdpSessionTable {
    pub fn new(client: Arc<ProxyClient>, config: UdpConfig, stats: Arc<TunnelStats>) -> Self {
        Self {
            client,
            config,
            stats,
            conns: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.conns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.lock().is_empty()
    }

    pub fn contains(&self, id: FlowId) -> bool {
        self.conns.lock().contains_key(&id)
    }

    pub fn idle_timeout(&self) -> Duration {
        self.config.idle_timeout
    }
}

#[async_trait::async_trait]
impl UdpConnHandler for UdpSessionTable {
    async fn connect(&self, conn: Arc<dyn UdpFlow>, target: SocketAddr) -> Result<()> {
        let id = conn.id();
        if self.contains(id) {
            return Err(TunnelError::SessionExists(id));
        }

        let proxy_conn = match self.client.listen_packet().await {
            Ok(c) => c,
            Err(e) => {
                self.stats.record_dial_failure();
                debug!("UDP socket allocation for {} failed: {}", id, e);
                return Err(e);
            }
        };

        let entry = SessionEntry {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            conn: proxy_conn,
            deadline: Arc::new(IdleDeadline::new(self.config.idle_timeout)),
        };

        let inserted = match self.conns.lock().entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                true
            }
        };
        if !inserted {
            if let Err(e) = entry.conn.close() {
                trace!("Proxy socket close for {}: {}", id, e);
            }
            return Err(TunnelError::SessionExists(id));
        }

        self.stats.udp_session_opened();
        debug!("UDP session created: {} -> {}", id, target);

        tokio::spawn(relay_from_proxy(
            self.conns.clone(),
            conn,
            entry,
            self.config.buffer_size,
            self.stats.clone(),
        ));
        Ok(())
    }

    async fn receive_to(&self, conn: &dyn UdpFlow, data: &[u8], dest: SocketAddr) -> Result<()> {
        let entry = self.conns.lock().get(&conn.id()).cloned();
        let entry = entry.ok_or(TunnelError::ConnectionNotFound)?;

        entry.deadline.refresh();
        let n = tokio::time::timeout_at(entry.deadline.get(), entry.conn.send_to(data, dest))
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "UDP write deadline exceeded")
            })??;

        self.stats.add_upload(n);
        trace!("UDP {} -> {} len={}", conn.id(), dest, n);
        Ok(())
    }
}

/// Copy proxy datagrams into the virtual flow, then tear the session down
async fn relay_from_proxy(
    table: SessionMap,
    flow: Arc<dyn UdpFlow>,
    entry: SessionEntry,
    buffer_size: usize,
    stats: Arc<TunnelStats>,
) {
    let id = flow.id();
    let mut buf = vec![0u8; buffer_size];

    let reason = loop {
        entry.deadline.refresh();
        let recv = recv_until_idle(entry.conn.as_ref(), &mut buf, &entry.deadline);
        let (n, source) = match recv.await {
            Ok(r) => r,
            Err(e) => break e,
        };

        let source = match source.resolve().await {
            Ok(addr) => addr,
            Err(e) => break e,
        };

        if let Err(e) = flow.write_from(&buf[..n], source).await {
            break TunnelError::Io(e);
        }
        stats.add_download(n);
        trace!("UDP {} <- {} len={}", id, source, n);
    };

    debug!("UDP session {} ended: {}", id, reason);

    // A newer session may already own this flow id
    let removed = {
        let mut conns = table.lock();
        let owned = conns
            .get(&id)
            .map_or(false, |current| current.generation == entry.generation);
        owned && conns.remove(&id).is_some()
    };
    if removed {
        stats.udp_session_closed();
    }

    if let Err(e) = entry.conn.close() {
        trace!("Proxy socket close for {}: {}", id, e);
    }
    if let Err(e) = flow.close() {
        trace!("Virtual flow close for {}: {}", id, e);
    }
}

/// Wait for one datagram, honouring deadline extensions made while waiting
async fn recv_until_idle(
    conn: &dyn PacketConn,
    buf: &mut [u8],
    deadline: &IdleDeadline,
) -> Result<(usize, TargetAddr)> {
    let recv = conn.recv_from(buf);
    tokio::pin!(recv);

    loop {
        let at = deadline.get();
        tokio::select! {
            res = &mut recv => return Ok(res?),
            _ = tokio::time::sleep_until(at) => {
                if deadline.is_expired() {
                    return Err(TunnelError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "UDP session idle timeout",
                    )));
                }
            }
        }
    }
}
