// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP endpoint configuration.
//!
//! # Example
//!
//! ```
//! use switchlink::TcpConfig;
//! use std::time::Duration;
//!
//! let config = TcpConfig::client("10.0.0.2:5590".parse().unwrap())
//!     .with_connect_retries(10, Duration::from_millis(200));
//! assert!(config.validate().is_ok());
//! ```

use super::frame_codec::DEFAULT_MAX_FRAME_SIZE;
use crate::transport::Role;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Default server address.
pub const DEFAULT_SERVER_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 5590);

/// Default client bind address.
pub const DEFAULT_CLIENT_ADDR: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 5591);

/// TCP endpoint configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpConfig {
    // === Role ===
    /// Server accepts one connection, client connects to the server
    pub role: Role,

    // === Addresses ===
    /// Address the server listens on and the client connects to
    pub server_addr: SocketAddr,

    /// Local address the client binds before connecting (None = OS choice)
    pub client_addr: Option<SocketAddr>,

    /// TCP listen backlog
    pub listen_backlog: i32,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub nodelay: bool,

    // === Framing ===
    /// Size of each blocking read on the socket
    pub read_buffer_size: usize,

    /// Maximum frame size in bytes (anti-OOM protection)
    ///
    /// Frames announcing a larger `total_len` close the connection.
    pub max_frame_size: usize,

    // === Connection ===
    /// Number of connect attempts made by a client (>= 1)
    pub connect_attempts: u32,

    /// Delay between client connect attempts
    pub connect_retry_delay: Duration,

    /// Upper bound on a single client connect attempt
    pub connect_timeout: Duration,

    /// Upper bound on construction time (None = wait forever)
    pub ready_timeout: Option<Duration>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            role: Role::Server,

            server_addr: SocketAddr::V4(DEFAULT_SERVER_ADDR),
            client_addr: None,
            listen_backlog: 16,
            nodelay: true,

            read_buffer_size: 256 * 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,

            connect_attempts: 1,
            connect_retry_delay: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(5),
            ready_timeout: None,
        }
    }
}

impl TcpConfig {
    /// Server listening on `addr`.
    pub fn server(addr: SocketAddr) -> Self {
        Self {
            role: Role::Server,
            server_addr: addr,
            ..Default::default()
        }
    }

    /// Client connecting to the server at `server_addr`.
    pub fn client(server_addr: SocketAddr) -> Self {
        Self {
            role: Role::Client,
            server_addr,
            ..Default::default()
        }
    }

    /// Builder: set client bind address
    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    /// Builder: set TCP_NODELAY
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Builder: set max frame size
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Builder: set read buffer size
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Builder: set client connect attempts and delay between them
    pub fn with_connect_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.connect_attempts = attempts;
        self.connect_retry_delay = delay;
        self
    }

    /// Builder: set timeout of each client connect attempt
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder: bound the time construction may block
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    /// Validate configuration, returning error message if invalid.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_frame_size < super::frame_codec::FRAME_HEADER_SIZE {
            return Err("max_frame_size must hold a frame header");
        }
        if self.max_frame_size > u32::MAX as usize {
            return Err("max_frame_size must fit in a u32 length field");
        }
        if self.read_buffer_size == 0 {
            return Err("read_buffer_size must be > 0");
        }
        if self.listen_backlog <= 0 {
            return Err("listen_backlog must be > 0");
        }
        if self.connect_attempts == 0 {
            return Err("connect_attempts must be >= 1");
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0");
        }
        if self.role == Role::Client && self.server_addr.port() == 0 {
            return Err("client role requires a server port");
        }
        if matches!(self.ready_timeout, Some(t) if t.is_zero()) {
            return Err("ready_timeout must be > 0");
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TcpConfig::default();
        assert_eq!(config.role, Role::Server);
        assert_eq!(config.server_addr, "127.0.0.1:5590".parse().unwrap());
        assert_eq!(config.listen_backlog, 16);
        assert_eq!(config.read_buffer_size, 256 * 1024);
        assert_eq!(config.max_frame_size, 16 * 1024 * 1024);
        assert!(config.nodelay);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_constructor() {
        let config = TcpConfig::client("10.1.2.3:7000".parse().unwrap())
            .with_client_addr(SocketAddr::V4(DEFAULT_CLIENT_ADDR));
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.client_addr, Some("127.0.0.1:5591".parse().unwrap()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let config = TcpConfig::default().with_max_frame_size(4);
        assert!(config.validate().is_err());

        let config = TcpConfig::default().with_read_buffer_size(0);
        assert!(config.validate().is_err());

        let config = TcpConfig::default().with_connect_retries(0, Duration::ZERO);
        assert!(config.validate().is_err());

        let config = TcpConfig::client("127.0.0.1:0".parse().unwrap());
        assert!(config.validate().is_err());

        let config = TcpConfig::default().with_ready_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = TcpConfig::default().with_connect_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_server_port_zero_allowed() {
        // Ephemeral port for a listener is fine
        let config = TcpConfig::server("127.0.0.1:0".parse().unwrap());
        assert!(config.validate().is_ok());
    }
}
