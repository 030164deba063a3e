// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::transport::shm::ShmError;

/// Errors returned by switchlink operations.
///
/// Only backend construction surfaces errors to callers. Per-message
/// failures on a running link are logged and absorbed by the backend.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use switchlink::{create_backend, BackendConfig, Error, MemoryBus, TcpConfig};
///
/// let config = BackendConfig::Tcp(TcpConfig::server("0.0.0.0:5590".parse().unwrap()));
/// match create_backend(config, Arc::new(MemoryBus::new())) {
///     Err(Error::Setup(msg)) => println!("link setup failed: {}", msg),
///     Err(e) => println!("other error: {}", e),
///     Ok(_) => println!("connected"),
/// }
/// ```
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration is invalid (zero sizes, missing peer address, ...).
    InvalidConfig(String),
    /// An environment variable holds a value that cannot be parsed.
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Raw value found in the environment
        value: String,
    },

    // ========================================================================
    // Link Errors
    // ========================================================================
    /// Connection setup (bind/listen/accept/connect/attach) failed.
    Setup(String),
    /// I/O error with underlying cause.
    IoError(std::io::Error),
    /// Peer sent bytes that violate the wire format.
    Protocol(String),
    /// Message does not fit the transport's size limit.
    PayloadTooLarge {
        /// Encoded size in bytes
        size: usize,
        /// Transport limit in bytes
        limit: usize,
    },
    /// Link is stopped; nothing more can be sent.
    Stopped,

    // ========================================================================
    // Shared Memory Errors
    // ========================================================================
    /// Shared-memory queue failure.
    Shm(ShmError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::InvalidEnv { var, value } => {
                write!(f, "Invalid value for {}: {:?}", var, value)
            }
            Error::Setup(msg) => write!(f, "Link setup failed: {}", msg),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Error::PayloadTooLarge { size, limit } => {
                write!(f, "Payload too large: {} bytes (limit {})", size, limit)
            }
            Error::Stopped => write!(f, "Link stopped"),
            Error::Shm(e) => write!(f, "Shared memory error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::Shm(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

impl From<ShmError> for Error {
    fn from(e: ShmError) -> Self {
        Error::Shm(e)
    }
}

/// Convenient alias for results using the crate `Error` type.
pub type Result<T> = core::result::Result<T, Error>;
