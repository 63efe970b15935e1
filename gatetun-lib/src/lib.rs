//! Platform-facing surface of the GateTun tunnel
//!
//! A VPN extension parses its provider configuration, builds dialers for the
//! proxy server, connects a tunnel and pumps TUN packets into it.

pub mod api;
mod error;
pub mod logging;
mod types;

pub use api::*;
pub use error::*;
pub use logging::init_logging;
pub use types::*;

pub use gatetun_core::{ErrorCode, PlatformError, ProxyTunnel, Tunnel, TunnelController};
