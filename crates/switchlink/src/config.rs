// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Backend selection.
//!
//! # Environment Variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `SWITCHLINK_BACKEND` | `tcp` | `tcp` or `shm` |
//! | `SWITCHLINK_IS_CLIENT` | `0` | non-zero selects the client role |
//! | `SWITCHLINK_SERVER_IP` | `127.0.0.1` | server address |
//! | `SWITCHLINK_SERVER_PORT` | `5590` | server port |
//! | `SWITCHLINK_CLIENT_IP` | unset | client bind address |
//! | `SWITCHLINK_CLIENT_PORT` | `0` | client bind port; non-zero selects the client role |
//! | `SWITCHLINK_SHM_MODE` | role above | `server` or `client` |
//! | `SWITCHLINK_SHM_QUEUE_PREFIX` | `/switchlink` | queue name prefix |
//! | `SWITCHLINK_SHM_MAX_MSG_SIZE` | `262144` | queue slot size |
//! | `SWITCHLINK_SHM_MAX_MSG_COUNT` | `64` | queue depth |

use crate::error::{Error, Result};
use crate::transport::shm::ShmConfig;
use crate::transport::tcp::TcpConfig;
use crate::transport::Role;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

/// Which transport a backend uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BackendKind {
    #[default]
    Tcp,
    Shm,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Tcp => f.write_str("tcp"),
            BackendKind::Shm => f.write_str("shm"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(BackendKind::Tcp),
            "shm" | "shared_memory" => Ok(BackendKind::Shm),
            _ => Err(format!("unknown backend: {}", s)),
        }
    }
}

/// Transport-specific configuration of a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendConfig {
    Tcp(TcpConfig),
    Shm(ShmConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Tcp(TcpConfig::default())
    }
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Tcp(_) => BackendKind::Tcp,
            BackendConfig::Shm(_) => BackendKind::Shm,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            BackendConfig::Tcp(c) => c.role,
            BackendConfig::Shm(c) => c.mode,
        }
    }

    /// Validate the selected transport's configuration.
    pub fn validate(&self) -> Result<()> {
        let checked = match self {
            BackendConfig::Tcp(c) => c.validate(),
            BackendConfig::Shm(c) => c.validate(),
        };
        checked.map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// Read the configuration from `SWITCHLINK_*` environment variables.
    ///
    /// Unset or empty variables take their defaults; unparseable values are
    /// reported as [`Error::InvalidEnv`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let kind = env.parse::<BackendKind>("SWITCHLINK_BACKEND")?.unwrap_or_default();
        let is_client = env.parse::<u32>("SWITCHLINK_IS_CLIENT")?.unwrap_or(0) != 0;
        let client_port = env.parse::<u16>("SWITCHLINK_CLIENT_PORT")?.unwrap_or(0);
        let role = if is_client || client_port != 0 {
            Role::Client
        } else {
            Role::Server
        };

        let config = match kind {
            BackendKind::Tcp => {
                let server_ip = env
                    .parse::<IpAddr>("SWITCHLINK_SERVER_IP")?
                    .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
                let server_port = env.parse::<u16>("SWITCHLINK_SERVER_PORT")?.unwrap_or(5590);
                let server_addr = SocketAddr::new(server_ip, server_port);

                let mut tcp = match role {
                    Role::Server => TcpConfig::server(server_addr),
                    Role::Client => TcpConfig::client(server_addr),
                };
                if role == Role::Client {
                    let client_ip = env.parse::<IpAddr>("SWITCHLINK_CLIENT_IP")?;
                    if client_ip.is_some() || client_port != 0 {
                        let ip = client_ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
                        tcp = tcp.with_client_addr(SocketAddr::new(ip, client_port));
                    }
                }
                BackendConfig::Tcp(tcp)
            }
            BackendKind::Shm => {
                let mode = env.parse::<ShmModeName>("SWITCHLINK_SHM_MODE")?.map_or(role, |m| m.0);
                let mut shm = ShmConfig {
                    mode,
                    ..ShmConfig::default()
                };
                if let Some(prefix) = env.get("SWITCHLINK_SHM_QUEUE_PREFIX") {
                    shm.queue_prefix = prefix;
                }
                if let Some(size) = env.parse::<usize>("SWITCHLINK_SHM_MAX_MSG_SIZE")? {
                    shm.max_msg_size = size;
                }
                if let Some(count) = env.parse::<usize>("SWITCHLINK_SHM_MAX_MSG_COUNT")? {
                    shm.max_msg_count = count;
                }
                BackendConfig::Shm(shm)
            }
        };

        log::debug!("[BACKEND] configuration from environment: {:?}", config);
        Ok(config)
    }
}

/// `server` / `client` as written in `SWITCHLINK_SHM_MODE`.
struct ShmModeName(Role);

impl FromStr for ShmModeName {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" => Ok(ShmModeName(Role::Server)),
            "client" => Ok(ShmModeName(Role::Client)),
            _ => Err(()),
        }
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn get(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, var: &'static str) -> Result<Option<T>> {
        match self.get(var) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| Error::InvalidEnv { var, value }),
        }
    }
}
