//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest read buffer a connection will use.
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// HTTP server configuration.
///
/// Every field has a default, so a partial document deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// The read buffer size. Values below [`MIN_READ_BUFFER_SIZE`] are raised to it.
    pub read_buffer_size: usize,
    /// How long an idle connection may take to send the next request line.
    pub request_line_timeout: Duration,
    /// Value of the `Server` response header; `None` omits the header.
    pub server_header: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            max_connections: 1024,
            read_buffer_size: 8192,
            request_line_timeout: Duration::from_secs(10),
            server_header: Some(concat!("clawhttp/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl ServerConfig {
    /// The capacity used for each connection's read buffer.
    pub fn read_buffer_capacity(&self) -> usize {
        self.read_buffer_size.max(MIN_READ_BUFFER_SIZE)
    }
}
