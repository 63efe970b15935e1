use crate::engine::FlowId;
use thiserror::Error;

/// Tunnel session errors
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("failed to write, network stack closed")]
    NetworkStackClosed,

    #[error("network stack not initialized")]
    StackNotInitialized,

    #[error("{0} dialer not configured")]
    DialerNotConfigured(&'static str),

    #[error("connection not found")]
    ConnectionNotFound,

    #[error("UDP session already exists for flow {0}")]
    SessionExists(FlowId),

    #[error("Unresolvable address: {0}")]
    Unresolvable(String),

    #[error("Network stack engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    /// Whether this is an ordinary end-of-connection condition rather than a fault
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Io(e) => is_connection_closed(e),
            Self::NetworkStackClosed => true,
            _ => false,
        }
    }
}

pub(crate) fn is_connection_closed(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected
    )
}

pub type Result<T> = std::result::Result<T, TunnelError>;
