// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared-memory endpoint configuration.

use crate::transport::Role;
use std::time::Duration;

/// Default queue name prefix.
pub const DEFAULT_QUEUE_PREFIX: &str = "/switchlink";

/// Shared-memory endpoint configuration.
///
/// The server creates `{prefix}_s2c` (server to client) and `{prefix}_c2s`
/// (client to server); the client attaches to the same pair with the
/// directions swapped. Both sides must use identical limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShmConfig {
    /// Server creates the queues, client attaches
    pub mode: Role,

    /// Queue name prefix (POSIX name, leading '/')
    pub queue_prefix: String,

    /// Largest encoded envelope, in bytes
    pub max_msg_size: usize,

    /// Queue depth
    pub max_msg_count: usize,

    /// Client grace period before attaching
    pub attach_delay: Duration,

    /// Receive wait granularity; bounds how long `stop()` takes to be seen
    pub poll_interval: Duration,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            mode: Role::Server,
            queue_prefix: DEFAULT_QUEUE_PREFIX.to_string(),
            max_msg_size: 256 * 1024,
            max_msg_count: 64,
            attach_delay: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl ShmConfig {
    /// Server-side config.
    pub fn server() -> Self {
        Self::default()
    }

    /// Client-side config.
    pub fn client() -> Self {
        Self {
            mode: Role::Client,
            ..Default::default()
        }
    }

    /// Builder: set queue name prefix
    pub fn with_queue_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.queue_prefix = prefix.into();
        self
    }

    /// Builder: set queue limits
    pub fn with_limits(mut self, max_msg_count: usize, max_msg_size: usize) -> Self {
        self.max_msg_count = max_msg_count;
        self.max_msg_size = max_msg_size;
        self
    }

    /// Builder: set client attach delay
    pub fn with_attach_delay(mut self, delay: Duration) -> Self {
        self.attach_delay = delay;
        self
    }

    /// Builder: set receive poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Queue carrying server to client traffic.
    pub fn server_to_client_name(&self) -> String {
        format!("{}_s2c", self.queue_prefix)
    }

    /// Queue carrying client to server traffic.
    pub fn client_to_server_name(&self) -> String {
        format!("{}_c2s", self.queue_prefix)
    }

    /// `(send queue, receive queue)` names for this endpoint.
    pub fn queue_names(&self) -> (String, String) {
        match self.mode {
            Role::Server => (self.server_to_client_name(), self.client_to_server_name()),
            Role::Client => (self.client_to_server_name(), self.server_to_client_name()),
        }
    }

    /// Validate configuration, returning error message if invalid.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.queue_prefix.starts_with('/') {
            return Err("queue_prefix must start with '/'");
        }
        if self.queue_prefix.len() < 2 || self.queue_prefix[1..].contains('/') {
            return Err("queue_prefix must be a single POSIX name component");
        }
        if self.queue_prefix.len() > 200 {
            return Err("queue_prefix too long");
        }
        if self.max_msg_size < super::envelope::ENVELOPE_HEADER_SIZE {
            return Err("max_msg_size must hold an envelope header");
        }
        if self.max_msg_size > u32::MAX as usize {
            return Err("max_msg_size must fit in u32");
        }
        if self.max_msg_count == 0 {
            return Err("max_msg_count must be > 0");
        }
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be > 0");
        }
        Ok(())
    }
}
